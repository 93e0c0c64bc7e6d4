//! Error types for tarantool-deque.

use std::time::Duration;

use thiserror::Error;

use crate::codec::Procedure;
use crate::model::{TaskId, TaskState};

#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure reported by the connection (unreachable host,
    /// broken socket, rejected credentials).
    #[error("connection error: {0}")]
    Connection(String),

    /// No reply arrived within the allotted wait.
    #[error("{procedure} timed out after {waited:?}")]
    Timeout {
        procedure: Procedure,
        waited: Duration,
    },

    /// The server ran the procedure and returned an application error.
    #[error("remote queue error {code}: {message}")]
    Remote { code: u32, message: String },

    #[error("cannot {operation} a task in state {state}")]
    InvalidState {
        operation: &'static str,
        state: TaskState,
    },

    #[error("task {0} was deleted")]
    StaleTask(TaskId),

    /// The reply did not have the documented shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{procedure} takes {expected} argument(s), got {got}")]
    Arity {
        procedure: Procedure,
        expected: &'static str,
        got: usize,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("deque handle was dropped")]
    DequeClosed,

    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors raised before any network round trip.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Error::InvalidState { .. } | Error::StaleTask(_) | Error::Arity { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
