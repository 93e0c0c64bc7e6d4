//! Connection configuration.
//!
//! Built in code or loaded from environment variables. The password is held
//! in a `SecretString` so it never shows up in logs or `Debug` output.

use std::str::FromStr;
use std::time::Duration;

pub use secrecy::{ExposeSecret, SecretString};

use crate::codec::DEFAULT_NO_LIMIT;
use crate::error::{Error, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 33013;

/// Extra time allowed on top of a blocking `take` timeout before the call
/// is considered lost.
pub const DEFAULT_TAKE_SLACK: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct DequeConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<SecretString>,
    /// Upper bound for non-blocking calls. `None` waits for the connection.
    pub call_timeout: Option<Duration>,
    pub take_slack: Duration,
    /// Seconds sent for an unlimited ttl/ttr.
    pub no_limit: f64,
}

impl Default for DequeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl DequeConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            user: None,
            password: None,
            call_timeout: None,
            take_slack: DEFAULT_TAKE_SLACK,
            no_limit: DEFAULT_NO_LIMIT,
        }
    }

    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn take_slack(mut self, slack: Duration) -> Self {
        self.take_slack = slack;
        self
    }

    pub fn no_limit(mut self, seconds: f64) -> Self {
        self.no_limit = seconds;
        self
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must not be zero".into()));
        }
        if !self.no_limit.is_finite() {
            return Err(Error::Config("no-limit sentinel must be finite".into()));
        }
        if self.password.is_some() && self.user.is_none() {
            return Err(Error::Config("password given without user".into()));
        }
        Ok(())
    }

    /// Load configuration from environment variables.
    ///
    /// `DEQUE_HOST`, `DEQUE_PORT`, `DEQUE_USER`, `DEQUE_PASSWORD`,
    /// `DEQUE_CALL_TIMEOUT_MS`, `DEQUE_TAKE_SLACK_MS`. Unset variables keep
    /// their defaults; unparsable ones are an error.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(
            std::env::var("DEQUE_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            parse_var("DEQUE_PORT")?.unwrap_or(DEFAULT_PORT),
        );
        config.user = std::env::var("DEQUE_USER").ok();
        config.password = std::env::var("DEQUE_PASSWORD").ok().map(SecretString::from);
        config.call_timeout = parse_var::<u64>("DEQUE_CALL_TIMEOUT_MS")?.map(Duration::from_millis);
        if let Some(ms) = parse_var::<u64>("DEQUE_TAKE_SLACK_MS")? {
            config.take_slack = Duration::from_millis(ms);
        }
        config.validate()?;
        Ok(config)
    }

    /// Like [`from_env`](Self::from_env), reading a `.env` file first if
    /// one exists.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} has an invalid value: {raw:?}"))),
        Err(_) => Ok(None),
    }
}
