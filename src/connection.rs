//! Connection seam.
//!
//! The transport (socket, handshake, framing, reconnects) lives outside this
//! crate. A [`Connector`] opens a [`Connection`] from the deque config; the
//! connection executes one encoded [`Call`] at a time and hands back the
//! decoded reply tuples.

use std::future::Future;

use serde_json::Value;

use crate::codec::Call;
use crate::config::DequeConfig;
use crate::error::Result;

/// One reply tuple.
pub type Tuple = Vec<Value>;

/// Decoded reply of a remote call: zero or more tuples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    tuples: Vec<Tuple>,
}

impl Response {
    pub fn new(tuples: Vec<Tuple>) -> Self {
        Self { tuples }
    }

    /// A reply with no tuples ("nothing happened").
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(tuple: Tuple) -> Self {
        Self {
            tuples: vec![tuple],
        }
    }

    pub fn tuples(&self) -> &[Tuple] {
        &self.tuples
    }

    pub fn first(&self) -> Option<&[Value]> {
        self.tuples.first().map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }
}

impl From<Vec<Tuple>> for Response {
    fn from(tuples: Vec<Tuple>) -> Self {
        Self::new(tuples)
    }
}

/// An open connection to the queue server.
///
/// Transport failures must come back as [`Error::Connection`], server-side
/// application errors as [`Error::Remote`].
///
/// [`Error::Connection`]: crate::error::Error::Connection
/// [`Error::Remote`]: crate::error::Error::Remote
pub trait Connection: Send + 'static {
    fn call(&mut self, call: &Call) -> impl Future<Output = Result<Response>> + Send;
}

/// Opens connections. Called lazily by the deque, and again after a reset.
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    fn connect(&self, config: &DequeConfig)
    -> impl Future<Output = Result<Self::Connection>> + Send;
}
