//! Call marshaling: procedures, argument encoding and reply decoding.
//!
//! Every queue primitive maps to one [`Procedure`] with a declared arity.
//! [`ArgumentCodec`] turns already-resolved options into the positional
//! tuple the server script expects; the `decode_*` functions turn reply
//! tuples back into typed values.

use std::ops::RangeInclusive;
use std::time::Duration;

use serde_json::Value;

use crate::connection::Response;
use crate::error::{Error, Result};
use crate::model::{ResolvedPut, Statistics, TaskId, TaskState};

/// "No limit" for ttl/ttr: 1000 years, in seconds.
pub const DEFAULT_NO_LIMIT: f64 = 365.0 * 86400.0 * 1000.0;

// ---------------------------------------------------------------------------
// Procedures
// ---------------------------------------------------------------------------

/// Remote procedures exposed by the deque script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Procedure {
    Put = 1,
    Take = 2,
    Ack = 3,
    Release = 4,
    Peek = 5,
    Delete = 6,
    Bury = 7,
    Kick = 8,
    Touch = 9,
    Statistics = 10,
    Drop = 11,
}

impl Procedure {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Operation name as used in the remote function name.
    pub fn name(self) -> &'static str {
        match self {
            Procedure::Put => "put",
            Procedure::Take => "take",
            Procedure::Ack => "ack",
            Procedure::Release => "release",
            Procedure::Peek => "peek",
            Procedure::Delete => "delete",
            Procedure::Bury => "bury",
            Procedure::Kick => "kick",
            Procedure::Touch => "touch",
            Procedure::Statistics => "statistics",
            Procedure::Drop => "drop",
        }
    }

    /// Number of positional arguments the server accepts.
    pub fn arity(self) -> RangeInclusive<usize> {
        match self {
            Procedure::Put => 5..=5,
            Procedure::Take
            | Procedure::Ack
            | Procedure::Peek
            | Procedure::Delete
            | Procedure::Bury
            | Procedure::Kick => 1..=1,
            Procedure::Touch => 2..=2,
            Procedure::Release => 3..=3,
            Procedure::Statistics => 0..=1,
            Procedure::Drop => 0..=0,
        }
    }

    fn arity_label(self) -> &'static str {
        match self {
            Procedure::Put => "5",
            Procedure::Touch => "2",
            Procedure::Release => "3",
            Procedure::Statistics => "0 or 1",
            Procedure::Drop => "0",
            _ => "1",
        }
    }
}

impl std::fmt::Display for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// Call
// ---------------------------------------------------------------------------

/// One encoded remote call: function name plus positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    procedure: Procedure,
    function: String,
    args: Vec<Value>,
}

impl Call {
    /// Build a call, rejecting argument lists that do not match the
    /// procedure's arity.
    pub fn new(procedure: Procedure, function: String, args: Vec<Value>) -> Result<Self> {
        if !procedure.arity().contains(&args.len()) {
            return Err(Error::Arity {
                procedure,
                expected: procedure.arity_label(),
                got: args.len(),
            });
        }
        Ok(Self {
            procedure,
            function,
            args,
        })
    }

    pub fn procedure(&self) -> Procedure {
        self.procedure
    }

    /// Remote function name, e.g. `deque.tube.mail:put`.
    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

/// Function name for a tube-scoped procedure.
pub fn tube_function(tube: &str, procedure: Procedure) -> String {
    format!("deque.tube.{tube}:{}", procedure.name())
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encodes queue operations into calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArgumentCodec {
    no_limit: f64,
}

impl Default for ArgumentCodec {
    fn default() -> Self {
        Self {
            no_limit: DEFAULT_NO_LIMIT,
        }
    }
}

impl ArgumentCodec {
    /// Codec using `no_limit` seconds as the unlimited ttl/ttr sentinel.
    pub fn new(no_limit: f64) -> Self {
        Self { no_limit }
    }

    pub fn no_limit(&self) -> f64 {
        self.no_limit
    }

    fn limit(&self, limit: Option<Duration>) -> Value {
        match limit {
            Some(d) => seconds(d),
            None => Value::from(self.no_limit),
        }
    }

    /// `(data, ttl, ttr, delay, priority)`
    pub fn put(&self, tube: &str, data: Value, opts: &ResolvedPut) -> Result<Call> {
        Call::new(
            Procedure::Put,
            tube_function(tube, Procedure::Put),
            vec![
                data,
                self.limit(opts.ttl),
                self.limit(opts.ttr),
                seconds(opts.delay),
                Value::from(opts.priority),
            ],
        )
    }

    /// `(timeout,)`; zero returns immediately when the tube is empty.
    pub fn take(&self, tube: &str, timeout: Duration) -> Result<Call> {
        Call::new(
            Procedure::Take,
            tube_function(tube, Procedure::Take),
            vec![seconds(timeout)],
        )
    }

    pub fn ack(&self, tube: &str, id: TaskId) -> Result<Call> {
        self.by_id(tube, Procedure::Ack, id)
    }

    pub fn peek(&self, tube: &str, id: TaskId) -> Result<Call> {
        self.by_id(tube, Procedure::Peek, id)
    }

    pub fn delete(&self, tube: &str, id: TaskId) -> Result<Call> {
        self.by_id(tube, Procedure::Delete, id)
    }

    pub fn bury(&self, tube: &str, id: TaskId) -> Result<Call> {
        self.by_id(tube, Procedure::Bury, id)
    }

    /// `(task_id, delay, priority)`
    pub fn release(&self, tube: &str, id: TaskId, delay: Duration, priority: i64) -> Result<Call> {
        Call::new(
            Procedure::Release,
            tube_function(tube, Procedure::Release),
            vec![Value::from(id.0), seconds(delay), Value::from(priority)],
        )
    }

    /// `(task_id, increment)`
    pub fn touch(&self, tube: &str, id: TaskId, increment: Duration) -> Result<Call> {
        Call::new(
            Procedure::Touch,
            tube_function(tube, Procedure::Touch),
            vec![Value::from(id.0), seconds(increment)],
        )
    }

    pub fn kick(&self, tube: &str, count: u64) -> Result<Call> {
        Call::new(
            Procedure::Kick,
            tube_function(tube, Procedure::Kick),
            vec![Value::from(count)],
        )
    }

    /// `(tube,)` for one tube, `()` for every tube.
    pub fn statistics(&self, tube: Option<&str>) -> Result<Call> {
        let args = tube.map(|t| vec![Value::from(t)]).unwrap_or_default();
        Call::new(Procedure::Statistics, "deque.statistics".to_string(), args)
    }

    pub fn drop_tube(&self, tube: &str) -> Result<Call> {
        Call::new(Procedure::Drop, tube_function(tube, Procedure::Drop), vec![])
    }

    fn by_id(&self, tube: &str, procedure: Procedure, id: TaskId) -> Result<Call> {
        Call::new(
            procedure,
            tube_function(tube, procedure),
            vec![Value::from(id.0)],
        )
    }
}

fn seconds(d: Duration) -> Value {
    Value::from(d.as_secs_f64())
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// A task tuple: `(task_id, state_tag, data...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
    pub id: TaskId,
    pub state: TaskState,
    /// `None` when the server sent only id and state.
    pub data: Option<Value>,
}

impl TaskRow {
    pub fn from_tuple(tuple: &[Value]) -> Result<Self> {
        let (id, tag) = match tuple {
            [id, tag, ..] => (id, tag),
            _ => {
                return Err(Error::Protocol(format!(
                    "task tuple needs at least 2 fields, got {}",
                    tuple.len()
                )));
            }
        };

        let id = id
            .as_u64()
            .map(TaskId)
            .ok_or_else(|| Error::Protocol(format!("bad task id: {id}")))?;
        let state = tag
            .as_u64()
            .and_then(TaskState::from_tag)
            .ok_or_else(|| Error::Protocol(format!("unknown state tag: {tag}")))?;
        let data = match &tuple[2..] {
            [] => None,
            [single] => Some(single.clone()),
            rest => Some(Value::Array(rest.to_vec())),
        };

        Ok(Self { id, state, data })
    }
}

/// Decode the first task tuple of a reply, `None` when the reply is empty.
pub fn decode_task(response: &Response) -> Result<Option<TaskRow>> {
    response.first().map(TaskRow::from_tuple).transpose()
}

/// Decode a reply that must contain a task.
pub fn expect_task(response: &Response) -> Result<TaskRow> {
    decode_task(response)?.ok_or_else(|| Error::Protocol("reply contained no tuples".into()))
}

/// Decode a single unsigned counter (kick).
pub fn decode_count(response: &Response) -> Result<u64> {
    let value = response
        .first()
        .and_then(|t| t.first())
        .ok_or_else(|| Error::Protocol("reply contained no count".into()))?;
    value
        .as_u64()
        .ok_or_else(|| Error::Protocol(format!("bad count: {value}")))
}

/// Decode drop's result: no tuples or a truthy first value means success.
pub fn decode_ack(response: &Response) -> bool {
    match response.first().and_then(|t| t.first()) {
        None => true,
        Some(Value::Bool(b)) => *b,
        Some(Value::Null) => false,
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(_) => true,
    }
}

/// Decode statistics.
///
/// Accepts nested maps (flattened into dotted keys) and the older flat
/// layout of alternating key/value fields. Non-numeric leaves are skipped.
pub fn decode_statistics(response: &Response) -> Result<Statistics> {
    let mut stats = Statistics::default();
    for tuple in response.tuples() {
        match tuple.as_slice() {
            [Value::Object(_)] => flatten("", &tuple[0], &mut stats),
            fields if fields.len() % 2 == 0 => {
                for pair in fields.chunks(2) {
                    let key = pair[0].as_str().ok_or_else(|| {
                        Error::Protocol(format!("statistics key is not a string: {}", pair[0]))
                    })?;
                    flatten(key, &pair[1], &mut stats);
                }
            }
            fields => {
                return Err(Error::Protocol(format!(
                    "statistics tuple has odd field count {}",
                    fields.len()
                )));
            }
        }
    }
    Ok(stats)
}

fn flatten(prefix: &str, value: &Value, out: &mut Statistics) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, inner, out);
            }
        }
        Value::Number(n) => {
            if let Some(n) = n.as_u64() {
                out.0.insert(prefix.to_string(), n);
            }
        }
        Value::String(s) => {
            if let Ok(n) = s.parse::<u64>() {
                out.0.insert(prefix.to_string(), n);
            }
        }
        _ => {}
    }
}
