/// Recording engine: bounded motion capture driven by peer commands.
///
/// State machine:
///
/// | Event | Idle | Armed |
/// |---|---|---|
/// | `START` | clear, arm, reply `RECORDING_STARTED` | ignored |
/// | `STOP` | ignored | disarm, transmit buffer |
/// | `DATA` | transmit buffer | transmit buffer |
/// | `connected` | clear buffer | clear buffer |
/// | `disconnected` | ignored | disarm (buffer kept) |
/// | `sensor/data` | dropped | append; disarm when full |
///
/// Session state is only touched inside short critical sections; the lock is
/// never held across a publish or the CSV pacing delay.
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::bus::{MessageBus, Subscriber};
use crate::defaults::{
    LINE_PACING_MS, MAX_COMMAND_LEN, MAX_SAMPLES, PROGRESS_LOG_EVERY, RECORDER_PERIOD_MS,
    STATUS_LOG_INTERVAL_MS,
};
use crate::module::{self, Module, Services};
use crate::protocol::{self, topics, Command};
use crate::sensor::{Sample, FRAME_LEN};

/// Samples held by one capture session
pub type RecordBuffer = Vec<Sample, MAX_SAMPLES>;

/// Recording state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Armed,
}

impl RecordingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingState::Idle => "idle",
            RecordingState::Armed => "armed",
        }
    }
}

/// Runtime recorder configuration.
#[derive(Clone, Copy, Debug)]
pub struct RecorderConfig {
    /// Delay after each CSV line during transmission
    pub line_pacing_ms: u32,
    /// Interval between progress log lines while armed
    pub status_interval_ms: u32,
}

impl RecorderConfig {
    pub const fn new() -> Self {
        Self {
            line_pacing_ms: LINE_PACING_MS,
            status_interval_ms: STATUS_LOG_INTERVAL_MS,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of feeding one sensor frame to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Not armed; frame dropped without inspection
    Ignored,
    /// Frame shorter than [`FRAME_LEN`]
    TooShort(usize),
    /// Sample stored; total count
    Stored(usize),
    /// Buffer was already full; sample refused, session disarmed
    Refused,
}

/// Outcome of a `START` or `STOP` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// State changed
    Changed,
    /// Already in the requested state
    Unchanged,
}

/// Capture session: the state machine and its buffer, without any locking.
pub struct Session {
    state: RecordingState,
    samples: RecordBuffer,
    started_at_ms: u32,
    last_status_ms: u32,
}

impl Session {
    pub const fn new() -> Self {
        Self {
            state: RecordingState::Idle,
            samples: Vec::new(),
            started_at_ms: 0,
            last_status_ms: 0,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Arm a fresh session. Does nothing (and keeps the buffer) when armed.
    pub fn start(&mut self, now_ms: u32) -> Transition {
        if self.state == RecordingState::Armed {
            return Transition::Unchanged;
        }
        self.samples.clear();
        self.state = RecordingState::Armed;
        self.started_at_ms = now_ms;
        self.last_status_ms = now_ms;
        Transition::Changed
    }

    /// Disarm, keeping the buffer.
    pub fn stop(&mut self) -> Transition {
        if self.state == RecordingState::Idle {
            return Transition::Unchanged;
        }
        self.state = RecordingState::Idle;
        Transition::Changed
    }

    /// Milliseconds since the session was armed
    pub fn elapsed_ms(&self, now_ms: u32) -> u32 {
        now_ms.wrapping_sub(self.started_at_ms)
    }

    /// Append the sample carried by `frame` if armed.
    pub fn ingest(&mut self, frame: &[u8]) -> Ingest {
        if self.state != RecordingState::Armed {
            return Ingest::Ignored;
        }
        if self.samples.is_full() {
            self.state = RecordingState::Idle;
            return Ingest::Refused;
        }
        let Some(sample) = Sample::from_frame(frame) else {
            return Ingest::TooShort(frame.len());
        };
        // Capacity was checked above.
        let _ = self.samples.push(sample);
        Ingest::Stored(self.samples.len())
    }

    /// Whether a periodic status line is due; marks it as emitted.
    fn status_due(&mut self, now_ms: u32, interval_ms: u32) -> bool {
        if self.state != RecordingState::Armed
            || now_ms.wrapping_sub(self.last_status_ms) < interval_ms
        {
            return false;
        }
        self.last_status_ms = now_ms;
        true
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Measurement module: records sensor frames between `START` and `STOP`
/// and streams them to the peer as CSV.
pub struct Recorder {
    session: Mutex<CriticalSectionRawMutex, RefCell<Session>>,
    config: RecorderConfig,
    bus: Option<&'static MessageBus>,
    services: Option<&'static dyn Services>,
    initialized: AtomicBool,
}

const SUBSCRIPTIONS: &[&str] = &[
    topics::CONNECTED,
    topics::DISCONNECTED,
    topics::COMMAND,
    topics::SENSOR_DATA,
];

impl Recorder {
    pub const NAME: &'static str = "MeasurementApp";

    pub const fn new(config: RecorderConfig) -> Self {
        Self {
            session: Mutex::new(RefCell::new(Session::new())),
            config,
            bus: None,
            services: None,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> RecordingState {
        self.with_session(|s| s.state())
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecordingState::Armed
    }

    pub fn sample_count(&self) -> usize {
        self.with_session(|s| s.len())
    }

    fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        self.session.lock(|cell| f(&mut cell.borrow_mut()))
    }

    fn now_ms(&self) -> u32 {
        self.services.map_or(0, |s| s.uptime_ms())
    }

    fn reply(&self, line: &str) {
        if let Some(bus) = self.bus {
            if !bus.publish(topics::TRANSMIT, line.as_bytes()) {
                log::debug!("[{}] No transport listening for '{}'", Self::NAME, line);
            }
        }
    }

    // ── Bus handlers ───────────────────────────────────────────────────

    fn on_connected(&self) {
        log::info!("[{}] Peer connected - ready for commands", Self::NAME);
        self.with_session(|s| s.clear());
        log::info!("[{}] Cleared recorded data", Self::NAME);
    }

    fn on_disconnected(&self) {
        log::info!("[{}] Peer disconnected", Self::NAME);
        if self.with_session(|s| s.stop()) == Transition::Changed {
            log::info!("[{}] Disabling recording due to disconnection", Self::NAME);
        }
    }

    fn on_command(&self, payload: &[u8]) {
        if payload.is_empty() || payload.len() > MAX_COMMAND_LEN {
            log::warn!("[{}] Invalid command length: {}", Self::NAME, payload.len());
            return;
        }

        match protocol::parse_command(payload) {
            Some(Command::Start) => self.handle_start(),
            Some(Command::Stop) => self.handle_stop(),
            Some(Command::Data) => {
                log::info!("[{}] DATA command received", Self::NAME);
                self.transmit_recorded_data();
            }
            None => log::info!(
                "[{}] Unknown command: '{}'",
                Self::NAME,
                protocol::normalize_command(payload)
                    .as_deref()
                    .unwrap_or_default()
            ),
        }
    }

    fn on_sensor_data(&self, frame: &[u8]) {
        match self.with_session(|s| s.ingest(frame)) {
            Ingest::Ignored => {}
            Ingest::Stored(count) => {
                if count == MAX_SAMPLES {
                    log::info!(
                        "[{}] Buffer full ({} samples), next frame stops recording",
                        Self::NAME,
                        MAX_SAMPLES
                    );
                } else if count % PROGRESS_LOG_EVERY == 0 {
                    log::debug!("[{}] Recorded {} samples so far", Self::NAME, count);
                }
            }
            Ingest::TooShort(len) => log::warn!(
                "[{}] Invalid sensor frame size: {} bytes (need {})",
                Self::NAME,
                len,
                FRAME_LEN
            ),
            Ingest::Refused => {
                log::info!(
                    "[{}] Buffer full ({} samples), stopping recording",
                    Self::NAME,
                    MAX_SAMPLES
                );
            }
        }
    }

    // ── Command handlers ───────────────────────────────────────────────

    fn handle_start(&self) {
        let now = self.now_ms();
        if self.with_session(|s| s.start(now)) == Transition::Unchanged {
            log::info!("[{}] Already recording, ignoring START", Self::NAME);
            return;
        }
        log::info!("[{}] Starting recording", Self::NAME);
        self.reply(protocol::RECORDING_STARTED);
    }

    fn handle_stop(&self) {
        let now = self.now_ms();
        let stopped = self.with_session(|s| match s.stop() {
            Transition::Changed => Some((s.elapsed_ms(now), s.len())),
            Transition::Unchanged => None,
        });
        let Some((duration_ms, count)) = stopped else {
            log::info!("[{}] Not recording, ignoring STOP", Self::NAME);
            return;
        };

        log::info!(
            "[{}] Recording stopped. Duration: {} ms, Samples: {}",
            Self::NAME,
            duration_ms,
            count
        );
        self.transmit_recorded_data();
    }

    /// Stream the buffer as `DATA_START:<n>`, format line, `n` CSV lines,
    /// `DATA_END`, or a single `NO_DATA` when empty.
    fn transmit_recorded_data(&self) {
        let count = self.sample_count();
        if count == 0 {
            log::info!("[{}] No data to transmit", Self::NAME);
            self.reply(protocol::NO_DATA);
            return;
        }

        log::info!("[{}] Transmitting {} samples as CSV", Self::NAME, count);
        self.reply(&protocol::format_header(count));
        self.reply(protocol::FORMAT_LINE);

        let mut sent = 0;
        for index in 0..count {
            // One short lock per line so handlers on other contexts are
            // never held off for the whole burst.
            let Some(sample) = self.with_session(|s| s.samples().get(index).copied()) else {
                log::warn!(
                    "[{}] Buffer cleared during transmission after {} lines",
                    Self::NAME,
                    sent
                );
                break;
            };
            self.reply(&protocol::format_sample(&sample));
            sent += 1;
            if let Some(services) = self.services {
                services.delay_ms(self.config.line_pacing_ms);
            }
        }

        self.reply(protocol::DATA_END);
        log::info!(
            "[{}] CSV data transmission complete ({} samples sent)",
            Self::NAME,
            sent
        );
    }
}

impl Subscriber for Recorder {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        match topic {
            topics::SENSOR_DATA => self.on_sensor_data(payload),
            topics::COMMAND => self.on_command(payload),
            topics::CONNECTED => self.on_connected(),
            topics::DISCONNECTED => self.on_disconnected(),
            _ => {}
        }
    }
}

impl Module for Recorder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn period_ms(&self) -> u32 {
        RECORDER_PERIOD_MS
    }

    fn bind(&mut self, bus: &'static MessageBus, services: &'static dyn Services) {
        self.bus = Some(bus);
        self.services = Some(services);
    }

    fn setup(&'static self) -> bool {
        let (Some(bus), Some(_)) = (self.bus, self.services) else {
            log::error!("[{}] ERROR: Missing layer dependencies", Self::NAME);
            return false;
        };
        if self.initialized.load(Ordering::Acquire) {
            log::error!("[{}] Setup called twice", Self::NAME);
            return false;
        }
        if !module::subscribe_all(bus, Self::NAME, SUBSCRIPTIONS, self) {
            return false;
        }

        self.initialized.store(true, Ordering::Release);
        log::info!(
            "[{}] Setup complete - ready to record on peer commands",
            Self::NAME
        );
        true
    }

    fn update(&self) {
        if !self.initialized.load(Ordering::Acquire) {
            return;
        }
        let now = self.now_ms();
        let interval = self.config.status_interval_ms;
        let status = self.with_session(|s| {
            s.status_due(now, interval)
                .then(|| (s.elapsed_ms(now), s.len()))
        });
        if let Some((duration_ms, count)) = status {
            log::info!(
                "[{}] Recording... Duration: {} ms, Samples: {}",
                Self::NAME,
                duration_ms,
                count
            );
        }
    }

    fn teardown(&self) {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus {
            module::unsubscribe_all(bus, Self::NAME, SUBSCRIPTIONS);
        }
        log::info!("[{}] Cleaned up", Self::NAME);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::testing::{Capture, FakeServices};
    use crate::sensor::encode_frame;

    fn frame(n: usize) -> [u8; FRAME_LEN] {
        let v = n as f32;
        encode_frame(n as u32, &Sample::new(v, v + 0.5, -1.0 - v, 0.25, 0.0, 1.0))
    }

    // ── Session ─────────────────────────────────────────────────────

    #[test]
    fn session_starts_idle_and_empty() {
        let session = Session::new();
        assert_eq!(session.state(), RecordingState::Idle);
        assert!(session.is_empty());
    }

    #[test]
    fn frames_ignored_while_idle() {
        let mut session = Session::new();
        assert_eq!(session.ingest(&frame(1)), Ingest::Ignored);
        assert!(session.is_empty());
    }

    #[test]
    fn start_clears_and_arms() {
        let mut session = Session::new();
        session.start(0);
        session.ingest(&frame(1));
        session.stop();
        assert_eq!(session.len(), 1);

        assert_eq!(session.start(10), Transition::Changed);
        assert_eq!(session.state(), RecordingState::Armed);
        assert!(session.is_empty());
    }

    #[test]
    fn start_while_armed_keeps_buffer() {
        let mut session = Session::new();
        session.start(0);
        session.ingest(&frame(1));
        assert_eq!(session.start(5), Transition::Unchanged);
        assert_eq!(session.len(), 1);
        assert_eq!(session.elapsed_ms(5), 5);
    }

    #[test]
    fn stop_while_idle_is_unchanged() {
        let mut session = Session::new();
        assert_eq!(session.stop(), Transition::Unchanged);
    }

    #[test]
    fn short_frame_dropped_without_counting() {
        let mut session = Session::new();
        session.start(0);
        assert_eq!(session.ingest(&frame(1)[..27]), Ingest::TooShort(27));
        assert_eq!(session.len(), 0);
        assert_eq!(session.state(), RecordingState::Armed);
    }

    #[test]
    fn last_slot_stays_armed_until_next_frame() {
        let mut session = Session::new();
        session.start(0);
        for n in 0..MAX_SAMPLES {
            assert_eq!(session.ingest(&frame(n)), Ingest::Stored(n + 1));
        }
        assert_eq!(session.len(), MAX_SAMPLES);
        assert_eq!(session.state(), RecordingState::Armed);

        assert_eq!(session.ingest(&frame(MAX_SAMPLES)), Ingest::Refused);
        assert_eq!(session.len(), MAX_SAMPLES);
        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(session.ingest(&frame(0)), Ingest::Ignored);
    }

    #[test]
    fn samples_keep_frame_order() {
        let mut session = Session::new();
        session.start(0);
        session.ingest(&frame(3));
        session.ingest(&frame(7));
        let ax: std::vec::Vec<f32> = session.samples().iter().map(|s| s.ax).collect();
        assert_eq!(ax, [3.0, 7.0]);
    }

    #[test]
    fn status_due_only_while_armed_and_after_interval() {
        let mut session = Session::new();
        assert!(!session.status_due(5000, 2000));
        session.start(1000);
        assert!(!session.status_due(2500, 2000));
        assert!(session.status_due(3000, 2000));
        assert!(!session.status_due(3500, 2000));
        assert!(session.status_due(5000, 2000));
    }

    // ── Recorder module ─────────────────────────────────────────────

    struct Fixture {
        recorder: &'static Recorder,
        bus: &'static MessageBus,
        capture: &'static Capture,
        services: &'static FakeServices,
    }

    impl Fixture {
        fn command(&self, text: &str) {
            self.bus.publish(topics::COMMAND, text.as_bytes());
        }

        fn frames(&self, count: usize) {
            for n in 0..count {
                self.bus.publish(topics::SENSOR_DATA, &frame(n));
            }
        }

        fn sent(&self) -> std::vec::Vec<std::string::String> {
            self.capture.lines(topics::TRANSMIT)
        }
    }

    fn fixture() -> Fixture {
        let bus: &'static MessageBus = Box::leak(Box::new(MessageBus::new()));
        let services = FakeServices::leak();
        let capture = Capture::leak();
        bus.subscribe(topics::TRANSMIT, "capture", capture);

        let mut recorder = Recorder::new(RecorderConfig::default());
        recorder.bind(bus, services);
        let recorder: &'static Recorder = Box::leak(Box::new(recorder));
        assert!(recorder.setup());
        Fixture {
            recorder,
            bus,
            capture,
            services,
        }
    }

    #[test]
    fn setup_fails_when_unbound() {
        let recorder: &'static Recorder =
            Box::leak(Box::new(Recorder::new(RecorderConfig::default())));
        assert!(!recorder.setup());
    }

    #[test]
    fn setup_rolls_back_on_conflict() {
        let bus: &'static MessageBus = Box::leak(Box::new(MessageBus::new()));
        let capture = Capture::leak();
        // Someone already registered under the recorder's name.
        bus.subscribe(topics::COMMAND, Recorder::NAME, capture);

        let mut recorder = Recorder::new(RecorderConfig::default());
        recorder.bind(bus, FakeServices::leak());
        let recorder: &'static Recorder = Box::leak(Box::new(recorder));

        assert!(!recorder.setup());
        assert!(!bus.is_subscribed(topics::CONNECTED, Recorder::NAME));
        assert!(!bus.is_subscribed(topics::DISCONNECTED, Recorder::NAME));
        assert!(!bus.is_subscribed(topics::SENSOR_DATA, Recorder::NAME));
    }

    #[test]
    fn start_arms_and_replies() {
        let f = fixture();
        f.command("START");
        assert!(f.recorder.is_recording());
        assert_eq!(f.sent(), ["RECORDING_STARTED"]);
    }

    #[test]
    fn padded_lower_case_start_is_start() {
        let f = fixture();
        f.command(" start ");
        assert_eq!(f.recorder.state(), RecordingState::Armed);
    }

    #[test]
    fn second_start_is_ignored() {
        let f = fixture();
        f.command("START");
        f.frames(3);
        f.command("START");
        assert_eq!(f.recorder.sample_count(), 3);
        assert_eq!(f.sent(), ["RECORDING_STARTED"]);
    }

    #[test]
    fn stop_transmits_block() {
        let f = fixture();
        f.command("START");
        f.frames(3);
        f.capture.clear();
        f.command("STOP");

        assert_eq!(f.recorder.state(), RecordingState::Idle);
        let sent = f.sent();
        assert_eq!(sent.len(), 3 + 3);
        assert_eq!(sent[0], "DATA_START:3");
        assert_eq!(sent[1], "Format: ax,ay,az,gx,gy,gz");
        assert_eq!(sent[2], "0.000000,0.500000,-1.000000,0.250000,0.000000,1.000000");
        assert_eq!(sent[4], "2.000000,2.500000,-3.000000,0.250000,0.000000,1.000000");
        assert_eq!(sent[5], "DATA_END");
        // Pacing after each CSV line
        assert_eq!(f.services.delay_calls(), 3);
    }

    #[test]
    fn stop_while_idle_sends_nothing() {
        let f = fixture();
        f.command("STOP");
        assert!(f.sent().is_empty());
    }

    #[test]
    fn data_on_empty_buffer_is_no_data() {
        let f = fixture();
        f.command("DATA");
        assert_eq!(f.sent(), ["NO_DATA"]);
        assert_eq!(f.recorder.state(), RecordingState::Idle);
    }

    #[test]
    fn data_peeks_without_disarming() {
        let f = fixture();
        f.command("START");
        f.frames(2);
        f.capture.clear();
        f.command("data");

        assert!(f.recorder.is_recording());
        assert_eq!(f.recorder.sample_count(), 2);
        let sent = f.sent();
        assert_eq!(sent.first().map(String::as_str), Some("DATA_START:2"));
        assert_eq!(sent.last().map(String::as_str), Some("DATA_END"));
    }

    #[test]
    fn unknown_and_oversized_commands_ignored() {
        let f = fixture();
        f.command("RESET");
        f.command(&"START".repeat(11));
        assert!(!f.recorder.is_recording());
        assert!(f.sent().is_empty());
    }

    #[test]
    fn frames_ignored_until_armed() {
        let f = fixture();
        f.frames(5);
        assert_eq!(f.recorder.sample_count(), 0);
    }

    #[test]
    fn short_frame_while_armed_dropped() {
        let f = fixture();
        f.command("START");
        f.bus.publish(topics::SENSOR_DATA, &frame(0)[..27]);
        assert_eq!(f.recorder.sample_count(), 0);
        assert!(f.recorder.is_recording());
    }

    #[test]
    fn capacity_stops_recording_without_stop() {
        let f = fixture();
        f.command("START");
        f.frames(MAX_SAMPLES);
        assert_eq!(f.recorder.sample_count(), MAX_SAMPLES);
        assert!(f.recorder.is_recording());

        f.frames(1);
        assert_eq!(f.recorder.sample_count(), MAX_SAMPLES);
        assert_eq!(f.recorder.state(), RecordingState::Idle);
        f.capture.clear();
        f.command("STOP");
        assert!(f.sent().is_empty());
    }

    #[test]
    fn stop_at_capacity_transmits_full_buffer() {
        let f = fixture();
        f.command("START");
        f.frames(MAX_SAMPLES);
        f.capture.clear();
        f.command("STOP");

        let sent = f.sent();
        assert_eq!(sent.len(), MAX_SAMPLES + 3);
        assert_eq!(sent[0], "DATA_START:1000");
        assert_eq!(sent[sent.len() - 1], "DATA_END");
        assert_eq!(f.recorder.state(), RecordingState::Idle);
    }

    #[test]
    fn extreme_sample_still_streamed() {
        let f = fixture();
        f.command("START");
        let max = f32::MAX;
        let wide = encode_frame(0, &Sample::new(max, max, max, max, max, max));
        f.bus.publish(topics::SENSOR_DATA, &wide);
        f.bus.publish(
            topics::SENSOR_DATA,
            &encode_frame(1, &Sample::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0)),
        );
        f.capture.clear();
        f.command("STOP");

        let sent = f.sent();
        assert_eq!(sent.len(), 2 + 3);
        assert_eq!(sent[0], "DATA_START:2");
        assert_eq!(sent[2].split(',').count(), 6);
        assert!(sent[2].starts_with("340282346638528859811704183484516925440.000000,"));
        assert_eq!(sent[3], "1.000000,2.000000,3.000000,4.000000,5.000000,6.000000");
        assert_eq!(sent[4], "DATA_END");
    }

    #[test]
    fn disconnect_disarms_and_connect_clears() {
        let f = fixture();
        f.command("START");
        f.frames(4);

        f.bus.publish(topics::DISCONNECTED, &[0]);
        assert_eq!(f.recorder.state(), RecordingState::Idle);
        assert_eq!(f.recorder.sample_count(), 4);

        f.bus.publish(topics::CONNECTED, &[1]);
        assert_eq!(f.recorder.sample_count(), 0);
        assert_eq!(f.recorder.state(), RecordingState::Idle);
    }

    #[test]
    fn connect_while_armed_clears_but_stays_armed() {
        let f = fixture();
        f.command("START");
        f.frames(2);
        f.bus.publish(topics::CONNECTED, &[1]);
        assert!(f.recorder.is_recording());
        assert_eq!(f.recorder.sample_count(), 0);
    }

    /// Reconnects the peer during the first pacing delay.
    struct ReconnectMidBurst {
        bus: &'static MessageBus,
        fired: AtomicBool,
    }

    impl Services for ReconnectMidBurst {
        fn uptime_ms(&self) -> u32 {
            0
        }

        fn delay_ms(&self, _ms: u32) {
            if !self.fired.swap(true, Ordering::SeqCst) {
                self.bus.publish(topics::CONNECTED, &[1]);
            }
        }
    }

    #[test]
    fn clear_during_transmission_ends_burst_early() {
        let bus: &'static MessageBus = Box::leak(Box::new(MessageBus::new()));
        let capture = Capture::leak();
        bus.subscribe(topics::TRANSMIT, "capture", capture);
        let services: &'static ReconnectMidBurst = Box::leak(Box::new(ReconnectMidBurst {
            bus,
            fired: AtomicBool::new(false),
        }));

        let mut recorder = Recorder::new(RecorderConfig::default());
        recorder.bind(bus, services);
        let recorder: &'static Recorder = Box::leak(Box::new(recorder));
        assert!(recorder.setup());

        bus.publish(topics::COMMAND, b"START");
        for n in 0..5 {
            bus.publish(topics::SENSOR_DATA, &frame(n));
        }
        capture.clear();
        bus.publish(topics::COMMAND, b"STOP");

        let sent = capture.lines(topics::TRANSMIT);
        assert_eq!(sent[0], "DATA_START:5");
        // Header, format line, one CSV line, then the terminator.
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[3], "DATA_END");
    }

    #[test]
    fn update_is_quiet_when_idle() {
        let f = fixture();
        f.services.advance(10_000);
        f.recorder.update();
        assert!(f.sent().is_empty());
    }

    #[test]
    fn teardown_unsubscribes_everything() {
        let f = fixture();
        f.recorder.teardown();
        for topic in SUBSCRIPTIONS {
            assert!(!f.bus.is_subscribed(topic, Recorder::NAME));
        }
        f.command("START");
        assert!(!f.recorder.is_recording());
        f.recorder.teardown();
    }
}
