//! Core data model.
//!
//! Identifiers, the task state table, per-operation options and decoded
//! statistics. Nothing here talks to the network.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Task Id
// ---------------------------------------------------------------------------

/// Server-assigned task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Queue state of a task, as last reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for its delay to elapse.
    Delayed,
    /// Available to `take`.
    Ready,
    /// Claimed by a consumer.
    Taken,
    /// Acknowledged. Terminal.
    Done,
    /// Excluded from delivery until kicked.
    Buried,
}

impl TaskState {
    /// Decode a wire state tag. The table is fixed by the server script.
    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            0 => Some(TaskState::Delayed),
            1 => Some(TaskState::Ready),
            2 => Some(TaskState::Taken),
            3 => Some(TaskState::Done),
            4 => Some(TaskState::Buried),
            _ => None,
        }
    }

    pub fn tag(self) -> u64 {
        match self {
            TaskState::Delayed => 0,
            TaskState::Ready => 1,
            TaskState::Taken => 2,
            TaskState::Done => 3,
            TaskState::Buried => 4,
        }
    }

    /// Full state name.
    pub fn name(self) -> &'static str {
        match self {
            TaskState::Delayed => "delayed",
            TaskState::Ready => "ready",
            TaskState::Taken => "taken",
            TaskState::Done => "done",
            TaskState::Buried => "buried",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done)
    }

    pub fn can_ack(self) -> bool {
        self == TaskState::Taken
    }

    pub fn can_release(self) -> bool {
        self == TaskState::Taken
    }

    pub fn can_bury(self) -> bool {
        matches!(self, TaskState::Taken | TaskState::Ready)
    }

    pub fn can_touch(self) -> bool {
        self == TaskState::Taken
    }

    pub fn can_delete(self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Priority used when neither the call nor the tube sets one.
pub const NORMAL_PRIORITY: i64 = 0;

/// Per-tube defaults, substituted into calls that leave a field unset.
///
/// `ttl`/`ttr` of `None` mean "no limit".
#[derive(Debug, Clone, PartialEq)]
pub struct TubeOptions {
    pub ttl: Option<Duration>,
    pub ttr: Option<Duration>,
    pub delay: Duration,
    pub priority: i64,
    /// Release a still-taken task when its handle is dropped.
    pub release_on_drop: bool,
}

impl Default for TubeOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            ttr: None,
            delay: Duration::ZERO,
            priority: NORMAL_PRIORITY,
            release_on_drop: true,
        }
    }
}

impl TubeOptions {
    pub fn release_on_drop(mut self, release: bool) -> Self {
        self.release_on_drop = release;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn ttr(mut self, ttr: Duration) -> Self {
        self.ttr = Some(ttr);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

/// Options for a single `put`. Unset fields fall back to the tube defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutOptions {
    pub ttl: Option<Duration>,
    pub ttr: Option<Duration>,
    pub delay: Option<Duration>,
    pub priority: Option<i64>,
}

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn ttr(mut self, ttr: Duration) -> Self {
        self.ttr = Some(ttr);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Fill unset fields from the tube defaults.
    pub(crate) fn resolve(&self, defaults: &TubeOptions) -> ResolvedPut {
        ResolvedPut {
            ttl: self.ttl.or(defaults.ttl),
            ttr: self.ttr.or(defaults.ttr),
            delay: self.delay.unwrap_or(defaults.delay),
            priority: self.priority.unwrap_or(defaults.priority),
        }
    }
}

/// Put options after default substitution. Every slot is concrete.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPut {
    pub ttl: Option<Duration>,
    pub ttr: Option<Duration>,
    pub delay: Duration,
    pub priority: i64,
}

/// Options for `Task::release`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseOptions {
    pub delay: Option<Duration>,
    pub priority: Option<i64>,
}

impl ReleaseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Named counters reported by the server, keyed by dotted path
/// (e.g. `tasks.ready`). Key order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics(pub BTreeMap<String, u64>);

impl Statistics {
    pub fn get(&self, key: &str) -> Option<u64> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
