use thiserror::Error;

use crate::logutil::byte_repr;

/// Raised when the serial device cannot be brought up. Recoverable: the
/// supervisor tries again on its next tick.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Missing device, permission problem or driver failure.
    #[error("failed to open serial port {port}: {reason}")]
    Open { port: String, reason: String },

    /// The dongle answered the identity handshake with something unexpected.
    #[error("handshake rejected: expected [{}], got [{}]", byte_repr(.expected), byte_repr(.got))]
    Handshake { expected: Vec<u8>, got: Vec<u8> },

    /// The identity handshake could not be exchanged at all.
    #[error("dongle on {port} did not answer the handshake: {reason}")]
    Unresponsive { port: String, reason: String },
}

/// A single raw write could not be completed.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("serial handle is not open")]
    NotOpen,

    #[error("serial write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A raw read could not be completed.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("serial handle is not open")]
    NotOpen,

    #[error("serial read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure classification used inside a write transaction.
#[derive(Debug, Error)]
pub enum NordicProblem {
    /// Write error, missing handle, or no response within the poll budget.
    #[error("connection problem: {0}")]
    Connection(String),

    /// A response arrived but did not match what the caller expected.
    #[error("unexpected response: expected [{}], got [{}]", byte_repr(.expected), byte_repr(.got))]
    Read { expected: Vec<u8>, got: Vec<u8> },
}

impl From<WriteError> for NordicProblem {
    fn from(err: WriteError) -> Self {
        NordicProblem::Connection(err.to_string())
    }
}

/// Terminal outcome of a command once its retries are spent.
#[derive(Debug, Error)]
#[error("command {command} failed after {attempts} attempt(s): {last}")]
pub struct CommandFailure {
    pub command: String,
    pub attempts: u32,
    #[source]
    pub last: NordicProblem,
}

/// Catalogue lookup miss. Indicates a caller bug, not a link problem.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown command: {0}")]
pub struct UnknownCommand(pub String);

/// Errors surfaced by the [`Dongle`](super::Dongle) handle.
#[derive(Debug, Error)]
pub enum DongleError {
    #[error(transparent)]
    UnknownCommand(#[from] UnknownCommand),

    #[error(transparent)]
    CommandFailure(#[from] CommandFailure),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The link task has stopped; no further commands can be issued.
    #[error("dongle link task is not running")]
    LinkClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_problem_renders_bytes() {
        let p = NordicProblem::Read {
            expected: b"\x03iDp".to_vec(),
            got: vec![0x00],
        };
        assert_eq!(
            p.to_string(),
            "unexpected response: expected [0x3iDp], got [0x0]"
        );
    }

    #[test]
    fn command_failure_message_names_command() {
        let f = CommandFailure {
            command: "open".into(),
            attempts: 2,
            last: NordicProblem::Connection("no response".into()),
        };
        assert_eq!(
            f.to_string(),
            "command open failed after 2 attempt(s): connection problem: no response"
        );
    }
}
