/// Compile-time defaults shared by every module.
///
/// Rates are expressed as update periods in milliseconds. Caps size the
/// `heapless` buffers, so changing them changes static memory use.

// ── Scheduling ─────────────────────────────────────────────────────────

/// Transport adapter poll period (~20 Hz, responsive to commands)
pub const TRANSPORT_PERIOD_MS: u32 = 50;

/// Sensor feed period (~50 Hz)
pub const SENSOR_PERIOD_MS: u32 = 20;

/// Indicator LED period (~10 Hz)
pub const INDICATOR_PERIOD_MS: u32 = 100;

/// Recorder housekeeping period (~10 Hz)
pub const RECORDER_PERIOD_MS: u32 = 100;

// ── Message bus ────────────────────────────────────────────────────────

/// Size of the bus subscription table across all topics
pub const MAX_SUBSCRIPTIONS: usize = 16;

// ── Transport ──────────────────────────────────────────────────────────

/// Bytes read from the link per update cycle
pub const MAX_READ_LEN: usize = 100;

// ── Recorder ───────────────────────────────────────────────────────────

/// Hard ceiling on samples held in the record buffer
pub const MAX_SAMPLES: usize = 1000;

/// Longest command payload the recorder will parse
pub const MAX_COMMAND_LEN: usize = 50;

/// Delay after each transmitted CSV line so the BLE TX queue can drain
pub const LINE_PACING_MS: u32 = 5;

/// Interval between "still recording" log lines
pub const STATUS_LOG_INTERVAL_MS: u32 = 2000;

/// Log a progress line every this many stored samples
pub const PROGRESS_LOG_EVERY: usize = 50;

// ── Indicator ──────────────────────────────────────────────────────────

/// Updates between LED toggles while waiting for a peer
pub const BLINK_TICKS: u32 = 5;
