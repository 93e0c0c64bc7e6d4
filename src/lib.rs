//! # tarantool-deque
//!
//! Async client for the Tarantool delayed queue ("deque") script.
//!
//! Encodes queue operations (put, take, ack, release, bury, kick, touch,
//! peek, delete, statistics) as remote procedure calls, decodes the reply
//! tuples into [`Task`] handles and enforces the task state machine locally.
//! The transport itself is supplied through the [`connection`] traits.

pub mod codec;
pub mod config;
pub mod connection;
pub mod deque;
pub mod error;
pub mod model;
pub mod task;
pub mod telemetry;
pub mod tube;

pub use config::DequeConfig;
pub use deque::Deque;
pub use error::{Error, Result};
pub use model::{PutOptions, ReleaseOptions, Statistics, TaskId, TaskState, TubeOptions};
pub use task::Task;
pub use tube::Tube;
