/// Bus topics and the text protocol spoken with the remote peer.
///
/// Commands arrive as short ASCII lines (`START`, `STOP`, `DATA`).
/// Responses are newline-terminated text lines; a recording is sent as a
/// `DATA_START:<n>` header, a format line, `n` CSV lines and `DATA_END`.
/// Uses `heapless` types for no_std/no-alloc operation.
use core::fmt::Write;

use heapless::String;

use crate::defaults::MAX_COMMAND_LEN;
use crate::sensor::Sample;

/// Bus topic names
pub mod topics {
    /// One decoded command per message (ASCII, at most 50 bytes)
    pub const COMMAND: &str = "command";
    /// Peer connected, payload `[1]`
    pub const CONNECTED: &str = "connected";
    /// Peer disconnected, payload `[0]`
    pub const DISCONNECTED: &str = "disconnected";
    /// Raw sensor frames (see [`crate::sensor::FRAME_LEN`])
    pub const SENSOR_DATA: &str = "sensor/data";
    /// Anything published here is forwarded to the peer
    pub const TRANSMIT: &str = "transmit";
}

/// Response sent when a capture session begins
pub const RECORDING_STARTED: &str = "RECORDING_STARTED";

/// Response sent when a transmission is requested with an empty buffer
pub const NO_DATA: &str = "NO_DATA";

/// Prefix of the transmission header line, followed by the sample count
pub const DATA_START: &str = "DATA_START:";

/// Column description sent right after the header
pub const FORMAT_LINE: &str = "Format: ax,ay,az,gx,gy,gz";

/// Trailer closing a transmission block
pub const DATA_END: &str = "DATA_END";

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Widest `{:.6}` rendering of a finite `f32`: sign, 39 integer digits,
/// point and six decimals (`-f32::MAX`).
const MAX_FIELD_LEN: usize = 1 + 39 + 1 + 6;

/// Longest CSV line: six fields plus five separators.
pub const MAX_LINE_LEN: usize = 6 * MAX_FIELD_LEN + 5;

/// Buffer type for one outbound text line
pub type LineBuffer = String<MAX_LINE_LEN>;

/// Commands understood by the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Clear the buffer and arm recording
    Start,
    /// Disarm and transmit the buffer
    Stop,
    /// Transmit the buffer without changing state
    Data,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Start => "START",
            Command::Stop => "STOP",
            Command::Data => "DATA",
        }
    }
}

/// Normalize a command payload into an upper-case token.
///
/// Keeps printable ASCII, stops at the first NUL and trims surrounding
/// whitespace. Returns `None` for empty or oversized payloads.
pub fn normalize_command(data: &[u8]) -> Option<String<MAX_COMMAND_LEN>> {
    if data.is_empty() || data.len() > MAX_COMMAND_LEN {
        return None;
    }

    let mut token = String::<MAX_COMMAND_LEN>::new();
    for &byte in data {
        if byte == 0 {
            break;
        }
        if is_printable(byte) {
            // Cannot overflow: at most `MAX_COMMAND_LEN` bytes are pushed.
            let _ = token.push(byte.to_ascii_uppercase() as char);
        }
    }

    let trimmed = token.trim();
    if trimmed.len() == token.len() {
        return Some(token);
    }
    String::try_from(trimmed).ok()
}

/// Decode a command payload.
///
/// Returns `None` for anything that is not a known command; the caller
/// decides whether that is worth logging.
pub fn parse_command(data: &[u8]) -> Option<Command> {
    let token = normalize_command(data)?;
    match token.as_str() {
        "START" => Some(Command::Start),
        "STOP" => Some(Command::Stop),
        "DATA" => Some(Command::Data),
        _ => None,
    }
}

/// Printable ASCII (space through tilde)
pub fn is_printable(byte: u8) -> bool {
    (0x20..=0x7E).contains(&byte)
}

/// Format the `DATA_START:<count>` header.
pub fn format_header(count: usize) -> LineBuffer {
    let mut line = LineBuffer::new();
    let _ = write!(line, "{}{}", DATA_START, count);
    line
}

/// Format one sample as `ax,ay,az,gx,gy,gz` with six fractional digits.
///
/// [`MAX_LINE_LEN`] covers every `f32` value, including `NaN` and the
/// infinities, so a line is always produced.
pub fn format_sample(sample: &Sample) -> LineBuffer {
    let [ax, ay, az, gx, gy, gz] = sample.channels();
    let mut line = LineBuffer::new();
    let _ = write!(
        line,
        "{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
        ax, ay, az, gx, gy, gz
    );
    line
}
