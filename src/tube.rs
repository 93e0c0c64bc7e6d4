//! Named queue handle.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;

use crate::codec::{
    ArgumentCodec, Call, decode_ack, decode_count, decode_statistics, decode_task, expect_task,
};
use crate::connection::{Connector, Response};
use crate::deque::Shared;
use crate::error::{Error, Result};
use crate::model::{PutOptions, Statistics, TaskId, TubeOptions};
use crate::task::Task;

/// One named queue on the server. Obtained from [`Deque::tube`].
///
/// [`Deque::tube`]: crate::Deque::tube
pub struct Tube<K: Connector> {
    name: String,
    options: TubeOptions,
    deque: Weak<Shared<K>>,
}

impl<K: Connector> std::fmt::Debug for Tube<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tube")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<K: Connector> Tube<K> {
    pub(crate) fn new(name: String, options: TubeOptions, deque: Weak<Shared<K>>) -> Self {
        Self {
            name,
            options,
            deque,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Defaults this tube was created with.
    pub fn options(&self) -> &TubeOptions {
        &self.options
    }

    fn shared(&self) -> Result<Arc<Shared<K>>> {
        self.deque.upgrade().ok_or(Error::DequeClosed)
    }

    /// Build a call for this tube and run it with the regular call timeout.
    pub(crate) async fn run<F>(&self, build: F) -> Result<Response>
    where
        F: FnOnce(&ArgumentCodec, &str) -> Result<Call> + Send,
    {
        let shared = self.shared()?;
        let call = build(&shared.codec, &self.name)?;
        let limit = shared.config.call_timeout;
        shared.call(&self.name, call, limit).await
    }

    /// Enqueue `data` with the tube defaults.
    pub async fn put<T>(self: &Arc<Self>, data: &T) -> Result<Task<K>>
    where
        T: Serialize + ?Sized + Sync,
    {
        self.put_with(data, PutOptions::default()).await
    }

    /// Enqueue `data`. Options left unset fall back to the tube defaults.
    pub async fn put_with<T>(self: &Arc<Self>, data: &T, options: PutOptions) -> Result<Task<K>>
    where
        T: Serialize + ?Sized + Sync,
    {
        let data = serde_json::to_value(data)?;
        let resolved = options.resolve(&self.options);
        let response = self
            .run(|codec, tube| codec.put(tube, data, &resolved))
            .await?;
        let row = expect_task(&response)?;
        Ok(Task::from_row(Arc::clone(self), row))
    }

    /// Take a ready task, waiting up to `timeout` for one to appear.
    ///
    /// Returns `Ok(None)` when the server reports nothing available. If the
    /// server does not answer within `timeout` plus the configured slack the
    /// call fails with [`Error::Timeout`].
    pub async fn take(self: &Arc<Self>, timeout: Duration) -> Result<Option<Task<K>>> {
        let shared = self.shared()?;
        let call = shared.codec.take(&self.name, timeout)?;
        let limit = timeout.saturating_add(shared.config.take_slack);
        let response = shared.call(&self.name, call, Some(limit)).await?;
        let task = decode_task(&response)?.map(|row| Task::from_row(Arc::clone(self), row));
        Ok(task)
    }

    /// Take without waiting.
    pub async fn try_take(self: &Arc<Self>) -> Result<Option<Task<K>>> {
        self.take(Duration::ZERO).await
    }

    /// Snapshot of a task. Does not claim it, and may be stale as soon as
    /// it is returned.
    pub async fn peek(self: &Arc<Self>, id: TaskId) -> Result<Task<K>> {
        let response = self.run(|codec, tube| codec.peek(tube, id)).await?;
        let row = expect_task(&response)?;
        Ok(Task::from_row(Arc::clone(self), row))
    }

    /// Move up to `count` buried tasks back to ready. Returns how many moved.
    pub async fn kick(&self, count: u64) -> Result<u64> {
        let response = self.run(|codec, tube| codec.kick(tube, count)).await?;
        decode_count(&response)
    }

    pub async fn statistics(&self) -> Result<Statistics> {
        let response = self
            .run(|codec, tube| codec.statistics(Some(tube)))
            .await?;
        decode_statistics(&response)
    }

    /// Drop the whole tube server-side. The server refuses while tasks are
    /// in progress.
    pub async fn drop_tube(&self) -> Result<bool> {
        let response = self.run(|codec, tube| codec.drop_tube(tube)).await?;
        Ok(decode_ack(&response))
    }
}
