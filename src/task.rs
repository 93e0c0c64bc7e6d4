//! Task handle and its local state machine.
//!
//! A task mirrors the server's view of one queued item. Every operation first
//! checks the cached state, so obvious misuse fails without a round trip, and
//! only overwrites the cache once the server has answered for the same id.
//! Network failures leave the cached state exactly as it was.
//!
//! Dropping a handle that still holds a taken task releases it in the
//! background, unless the tube was created with `release_on_drop(false)`.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::codec::{TaskRow, decode_task, expect_task};
use crate::connection::Connector;
use crate::error::{Error, Result};
use crate::model::{ReleaseOptions, TaskId, TaskState};
use crate::telemetry::{call::record_state_transition, metrics};
use crate::tube::Tube;

pub struct Task<K: Connector> {
    tube: Arc<Tube<K>>,
    id: TaskId,
    state: TaskState,
    data: Value,
    /// Bumped on every server response applied to this task.
    version: u64,
    deleted: bool,
}

impl<K: Connector> Task<K> {
    pub(crate) fn from_row(tube: Arc<Tube<K>>, row: TaskRow) -> Self {
        Self {
            tube,
            id: row.id,
            state: row.state,
            data: row.data.unwrap_or(Value::Null),
            version: 1,
            deleted: false,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Last state confirmed by the server.
    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Deserialize the payload into `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn tube(&self) -> &Arc<Tube<K>> {
        &self.tube
    }

    fn check(&self, operation: &'static str, allowed: fn(TaskState) -> bool) -> Result<()> {
        if self.deleted {
            return Err(Error::StaleTask(self.id));
        }
        if !allowed(self.state) {
            return Err(Error::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Overwrite the cached copy with a server row for this task.
    fn apply(&mut self, row: TaskRow) -> Result<()> {
        if row.id != self.id {
            return Err(Error::Protocol(format!(
                "reply is for task {}, expected {}",
                row.id, self.id
            )));
        }
        let from = self.state;
        self.state = row.state;
        if let Some(data) = row.data {
            self.data = data;
        }
        self.version += 1;

        if from != row.state {
            record_state_transition(&tracing::Span::current(), self.id, from, row.state);
            metrics::task_transitions().add(
                1,
                &[
                    KeyValue::new("tube", self.tube.name().to_string()),
                    KeyValue::new("from", from.name()),
                    KeyValue::new("to", row.state.name()),
                ],
            );
        }
        Ok(())
    }

    /// Report successful execution. Returns whether the task is now done.
    pub async fn ack(&mut self) -> Result<bool> {
        self.check("ack", TaskState::can_ack)?;
        let id = self.id;
        let response = self.tube.run(|codec, tube| codec.ack(tube, id)).await?;
        self.apply(expect_task(&response)?)?;
        Ok(self.state == TaskState::Done)
    }

    /// Put a taken task back. With a delay it comes back as delayed,
    /// otherwise as ready; returns whether the server agreed.
    pub async fn release(&mut self, options: ReleaseOptions) -> Result<bool> {
        self.check("release", TaskState::can_release)?;
        let id = self.id;
        let delay = options.delay.unwrap_or(Duration::ZERO);
        let priority = options.priority.unwrap_or(self.tube.options().priority);
        let response = self
            .tube
            .run(|codec, tube| codec.release(tube, id, delay, priority))
            .await?;
        self.apply(expect_task(&response)?)?;

        let expected = if delay.is_zero() {
            TaskState::Ready
        } else {
            TaskState::Delayed
        };
        Ok(self.state == expected)
    }

    /// Exclude the task from delivery until kicked.
    pub async fn bury(&mut self) -> Result<bool> {
        self.check("bury", TaskState::can_bury)?;
        let id = self.id;
        let response = self.tube.run(|codec, tube| codec.bury(tube, id)).await?;
        self.apply(expect_task(&response)?)?;
        Ok(self.state == TaskState::Buried)
    }

    /// Extend the time-to-run of a taken task.
    pub async fn touch(&mut self, increment: Duration) -> Result<()> {
        self.check("touch", TaskState::can_touch)?;
        let id = self.id;
        let response = self
            .tube
            .run(|codec, tube| codec.touch(tube, id, increment))
            .await?;
        if let Some(row) = decode_task(&response)? {
            self.apply(row)?;
        }
        Ok(())
    }

    /// Delete the task permanently. Afterwards every operation on this
    /// handle fails with [`Error::StaleTask`].
    pub async fn delete(&mut self) -> Result<()> {
        self.check("delete", TaskState::can_delete)?;
        let id = self.id;
        let response = self.tube.run(|codec, tube| codec.delete(tube, id)).await?;
        if let Some(row) = decode_task(&response)? {
            self.apply(row)?;
        }
        self.deleted = true;
        Ok(())
    }

    /// Re-read the task from the server without changing it.
    pub async fn refresh(&mut self) -> Result<TaskState> {
        self.check("refresh", |_| true)?;
        let id = self.id;
        let response = self.tube.run(|codec, tube| codec.peek(tube, id)).await?;
        self.apply(expect_task(&response)?)?;
        Ok(self.state)
    }
}

impl<K: Connector> Drop for Task<K> {
    fn drop(&mut self) {
        if self.deleted || self.state != TaskState::Taken || !self.tube.options().release_on_drop
        {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(task.id = %self.id, "no runtime, dropped task stays taken until ttr");
            return;
        };

        let tube = Arc::clone(&self.tube);
        let id = self.id;
        let priority = tube.options().priority;
        runtime.spawn(async move {
            let released = tube
                .run(|codec, name| codec.release(name, id, Duration::ZERO, priority))
                .await;
            match released {
                Ok(_) => debug!(task.id = %id, tube = tube.name(), "released dropped task"),
                Err(err) => debug!(task.id = %id, error = %err, "release of dropped task failed"),
            }
        });
    }
}

impl<K: Connector> std::fmt::Debug for Task<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("tube", &self.tube.name())
            .field("id", &self.id)
            .field("state", &self.state)
            .field("version", &self.version)
            .field("deleted", &self.deleted)
            .field("data", &self.data)
            .finish()
    }
}

impl<K: Connector> std::fmt::Display for Task<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task <{}>: {}", self.id, self.state)
    }
}
