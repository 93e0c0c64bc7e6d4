//! Top-level client handle.
//!
//! A [`Deque`] owns the one connection all of its tubes share and the cache
//! of tube handles. Tubes and tasks only hold weak references back to it, so
//! dropping the deque closes the connection and invalidates them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{Instrument, debug, warn};

use crate::codec::{ArgumentCodec, Call, decode_statistics};
use crate::config::DequeConfig;
use crate::connection::{Connection, Connector, Response};
use crate::error::{Error, Result};
use crate::model::{Statistics, TubeOptions};
use crate::telemetry::call::{record_result, start_call_span};
use crate::telemetry::metrics;
use crate::tube::Tube;

/// State shared between a deque and the tubes created from it.
pub(crate) struct Shared<K: Connector> {
    pub(crate) config: DequeConfig,
    pub(crate) codec: ArgumentCodec,
    connector: K,
    /// `None` until first use, and again after a reset.
    connection: AsyncMutex<Option<K::Connection>>,
}

impl<K: Connector> Shared<K> {
    async fn open(&self) -> Result<K::Connection> {
        debug!(address = %self.config.address(), "opening queue connection");
        let connection = self.connector.connect(&self.config).await?;
        metrics::connects().add(1, &[]);
        Ok(connection)
    }

    /// Issue one call on the shared connection, waiting at most `limit`.
    ///
    /// The connection is out of its slot while the call is in flight and is
    /// only put back after a clean reply. A timed-out, broken or cancelled
    /// call leaves the deque disconnected, since a late reply would
    /// otherwise be read as the answer to the next call.
    pub(crate) async fn call(
        &self,
        tube: &str,
        call: Call,
        limit: Option<Duration>,
    ) -> Result<Response> {
        let procedure = call.procedure();
        let span = start_call_span(tube, procedure);

        async {
            let mut guard = self.connection.lock().await;
            let mut conn = match guard.take() {
                Some(conn) => conn,
                None => self.open().await?,
            };

            let started = Instant::now();
            let outcome = match limit {
                Some(limit) => {
                    let waited = tokio::time::timeout(limit, conn.call(&call)).await;
                    waited.unwrap_or(Err(Error::Timeout {
                        procedure,
                        waited: limit,
                    }))
                }
                None => conn.call(&call).await,
            };

            let result = match &outcome {
                Ok(response) if response.is_empty() => "empty",
                Ok(_) => "ok",
                Err(Error::Timeout { .. }) => "timeout",
                Err(_) => "error",
            };
            if matches!(outcome, Err(Error::Timeout { .. } | Error::Connection(_))) {
                warn!(function = call.function(), "dropping queue connection after {result}");
            } else {
                *guard = Some(conn);
            }

            record_result(&tracing::Span::current(), result);
            metrics::calls().add(
                1,
                &[
                    KeyValue::new("tube", tube.to_string()),
                    KeyValue::new("procedure", procedure.name()),
                    KeyValue::new("result", result),
                ],
            );
            metrics::call_duration_ms().record(
                started.elapsed().as_secs_f64() * 1000.0,
                &[KeyValue::new("procedure", procedure.name())],
            );

            outcome
        }
        .instrument(span)
        .await
    }
}

/// Client for one deque server.
///
/// ```no_run
/// # use tarantool_deque::{Deque, DequeConfig, connection::Connector};
/// # async fn demo<K: Connector>(connector: K) -> tarantool_deque::Result<()> {
/// let deque = Deque::new(DequeConfig::new("127.0.0.1", 33013), connector)?;
/// let tube = deque.tube("delayed_queue");
/// tube.put(&[1, 2, 3]).await?;
/// if let Some(mut task) = tube.try_take().await? {
///     task.ack().await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct Deque<K: Connector> {
    shared: Arc<Shared<K>>,
    tubes: Mutex<HashMap<String, Arc<Tube<K>>>>,
}

impl<K: Connector> Deque<K> {
    /// Validate the config and build a client. No connection is opened
    /// until the first call (or [`connect`](Self::connect)).
    pub fn new(config: DequeConfig, connector: K) -> Result<Self> {
        config.validate()?;
        let codec = ArgumentCodec::new(config.no_limit);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                codec,
                connector,
                connection: AsyncMutex::new(None),
            }),
            tubes: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &DequeConfig {
        &self.shared.config
    }

    pub fn codec(&self) -> ArgumentCodec {
        self.shared.codec
    }

    /// Open the connection now instead of on first use.
    pub async fn connect(&self) -> Result<()> {
        let mut guard = self.shared.connection.lock().await;
        if guard.is_none() {
            *guard = Some(self.shared.open().await?);
        }
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.shared.connection.lock().await.is_some()
    }

    /// Drop the current connection; the next call opens a new one.
    pub async fn reset_connection(&self) {
        if self.shared.connection.lock().await.take().is_some() {
            debug!(address = %self.shared.config.address(), "queue connection reset");
        }
    }

    /// Tube handle with default options. See [`tube_with`](Self::tube_with).
    pub fn tube(&self, name: &str) -> Arc<Tube<K>> {
        self.tube_with(name, TubeOptions::default())
    }

    /// Tube handle for `name`, created on first request and cached.
    ///
    /// Options only take effect on the call that creates the handle; later
    /// calls return the cached tube unchanged.
    pub fn tube_with(&self, name: &str, options: TubeOptions) -> Arc<Tube<K>> {
        let mut tubes = self.tubes.lock().unwrap_or_else(PoisonError::into_inner);
        let tube = tubes.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Tube::new(
                name.to_string(),
                options,
                Arc::downgrade(&self.shared),
            ))
        });
        Arc::clone(tube)
    }

    /// Names of tubes resolved so far, sorted.
    pub fn tubes(&self) -> Vec<String> {
        let tubes = self.tubes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = tubes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Statistics for every tube on the server.
    pub async fn statistics(&self) -> Result<Statistics> {
        let call = self.shared.codec.statistics(None)?;
        let response = self
            .shared
            .call("", call, self.shared.config.call_timeout)
            .await?;
        decode_statistics(&response)
    }
}
