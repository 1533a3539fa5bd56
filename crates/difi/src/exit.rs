use std::fmt;
use std::io;

use difi_frame::FrameError;
use difi_stream::StreamError;
use difi_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrInUse => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::Disconnected => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        FrameError::UnsupportedBitDepth(_) | FrameError::UnsupportedContextSize(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn stream_error(context: &str, err: StreamError) -> CliError {
    match err {
        StreamError::Config(_) => CliError::new(USAGE, format!("{context}: {err}")),
        StreamError::ProtocolMismatch(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        StreamError::Transport(err) => transport_error(context, err),
        StreamError::Frame(err) => frame_error(context, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_usage() {
        let err = stream_error("sink", StreamError::Config("bad".into()));
        assert_eq!(err.code, USAGE);
        assert_eq!(err.to_string(), "sink: invalid configuration: bad");
    }

    #[test]
    fn nested_io_errors_keep_their_kind() {
        let io = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let err = stream_error("bind", StreamError::Transport(TransportError::Io(io)));
        assert_eq!(err.code, PERMISSION_DENIED);
    }

    #[test]
    fn mismatches_are_data_invalid() {
        let err = stream_error("listen", StreamError::ProtocolMismatch("depth".into()));
        assert_eq!(err.code, DATA_INVALID);
        let err = stream_error("listen", StreamError::Frame(FrameError::ZeroWordCount));
        assert_eq!(err.code, DATA_INVALID);
    }
}
