//! # Store Connection
//!
//! Lifecycle of the single shared store connection.
//!
//! ```text
//!               obtain()                 connect ok
//! Disconnected ─────────▶ Connecting ───────────────▶ Ready
//!      ▲                      │                         │
//!      │ backoff exhausted    │ connect failed          │ close()
//!      │                      ▼                         ▼
//!      └─────────────────── Error ◀── retry ──┐    Disconnected
//!                             └───────────────┘
//! ```
//!
//! The handle is cheap to clone; every clone drives the same state machine.
//! Store-touching code goes through [`StoreConnection::guarded`], which is the
//! one place that turns failures into a typed [`Degraded`] outcome.

pub mod backoff;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::RwLock;

pub use backoff::Backoff;

use crate::error::{Degraded, Result, StoreError};
use crate::store::{Connector, DefaultConnector, SharedStore};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Error,
}

/// Store connection configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store address. `None` runs the layer permanently degraded.
    pub url: Option<String>,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub backoff: Backoff,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(5),
            backoff: Backoff::default(),
        }
    }
}

impl StoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Configuration with no store address
    pub fn unconfigured() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

struct Slot {
    state: ConnectionState,
    handle: Option<SharedStore>,
}

struct Shared {
    config: StoreConfig,
    connector: Arc<dyn Connector>,
    slot: Mutex<Slot>,
    /// Guarded commands hold a read permit; `close()` takes the write side.
    drain: RwLock<()>,
    unconfigured_logged: AtomicBool,
}

/// Shared, lazily connected store handle
#[derive(Clone)]
pub struct StoreConnection {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for StoreConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConnection")
            .field("configured", &self.shared.config.url.is_some())
            .field("state", &self.state())
            .finish()
    }
}

impl StoreConnection {
    /// Connection that dials Redis (or `memory://`) on first use
    pub fn new(config: StoreConfig) -> Self {
        Self::with_connector(config, Arc::new(DefaultConnector))
    }

    /// Connection with a custom connector
    pub fn with_connector(config: StoreConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                slot: Mutex::new(Slot {
                    state: ConnectionState::Disconnected,
                    handle: None,
                }),
                drain: RwLock::new(()),
                unconfigured_logged: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.slot.lock().state
    }

    pub fn is_configured(&self) -> bool {
        self.shared.config.url.is_some()
    }

    /// Return a ready store handle, connecting lazily.
    ///
    /// # Errors
    ///
    /// [`StoreError::Configuration`] when no address is set. Every other
    /// failure is reported as [`StoreError::Unavailable`].
    pub async fn obtain(&self) -> Result<SharedStore> {
        let url = self
            .shared
            .config
            .url
            .as_deref()
            .ok_or(StoreError::Configuration)?;

        {
            let mut slot = self.shared.slot.lock();
            match slot.state {
                ConnectionState::Ready => {
                    if let Some(handle) = &slot.handle {
                        return Ok(handle.clone());
                    }
                }
                ConnectionState::Connecting | ConnectionState::Error => {
                    return Err(StoreError::Unavailable(
                        "store connection is being re-established".to_string(),
                    ));
                }
                ConnectionState::Disconnected => {}
            }
            slot.state = ConnectionState::Connecting;
        }

        tracing::debug!(url = %redact(url), "Connecting to store");

        match self.connect_once(url).await {
            Ok(handle) => {
                let installed = {
                    let mut slot = self.shared.slot.lock();
                    if slot.state == ConnectionState::Connecting {
                        slot.state = ConnectionState::Ready;
                        slot.handle = Some(handle.clone());
                        true
                    } else {
                        false
                    }
                };

                if installed {
                    tracing::info!(backend = handle.name(), "Store connected");
                    return Ok(handle);
                }

                // close() ran while the connect was in flight
                if let Err(e) = handle.close().await {
                    tracing::warn!(error = %e, "Error while closing abandoned store connection");
                }
                Err(StoreError::Unavailable(
                    "store connection closed during connect".to_string(),
                ))
            }
            Err(e) => {
                let retry = {
                    let mut slot = self.shared.slot.lock();
                    let retry = slot.state == ConnectionState::Connecting;
                    if retry {
                        slot.state = ConnectionState::Error;
                    }
                    retry
                };
                if retry {
                    tracing::warn!(error = %e, "Store connection failed, scheduling reconnect");
                    self.spawn_reconnect(url.to_string());
                }
                Err(StoreError::Unavailable(e.to_string()))
            }
        }
    }

    /// Liveness probe. Never errors.
    pub async fn is_available(&self) -> bool {
        self.guarded("ping", |store| async move { store.ping().await })
            .await
            .is_ok()
    }

    /// Release the connection once in-flight commands have completed.
    ///
    /// Safe to call repeatedly.
    pub async fn close(&self) {
        let _drained = self.shared.drain.write().await;

        let handle = {
            let mut slot = self.shared.slot.lock();
            slot.state = ConnectionState::Disconnected;
            slot.handle.take()
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.close().await {
                tracing::warn!(error = %e, "Error while closing store connection");
            }
            tracing::info!(backend = handle.name(), "Store connection closed");
        }
    }

    /// Run a store operation under the fail-open policy.
    ///
    /// Obtains the store, applies the command timeout and logs any failure.
    /// The closure's error never escapes; callers pick their own fallback
    /// from the returned [`Degraded`] reason.
    pub async fn guarded<T, F, Fut>(
        &self,
        operation: &'static str,
        f: F,
    ) -> std::result::Result<T, Degraded>
    where
        F: FnOnce(SharedStore) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let store = match self.obtain().await {
            Ok(store) => store,
            Err(e) => {
                self.log_degraded(operation, &e);
                return Err(Degraded::from(&e));
            }
        };

        let _permit = self.shared.drain.read().await;
        let timeout = self.shared.config.command_timeout;

        let result = match tokio::time::timeout(timeout, f(store)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        result.map_err(|e| {
            self.log_degraded(operation, &e);
            Degraded::from(&e)
        })
    }

    async fn connect_once(&self, url: &str) -> Result<SharedStore> {
        let timeout = self.shared.config.connect_timeout;
        match tokio::time::timeout(timeout, self.shared.connector.connect(url)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn spawn_reconnect(&self, url: String) {
        let conn = self.clone();
        tokio::spawn(async move { conn.reconnect_loop(&url).await });
    }

    async fn reconnect_loop(&self, url: &str) {
        let backoff = self.shared.config.backoff;

        for (attempt, delay) in (1..).zip(backoff.schedule()) {
            tokio::time::sleep(delay).await;

            // close() during the wait abandons the loop
            if self.state() != ConnectionState::Error {
                return;
            }

            match self.connect_once(url).await {
                Ok(handle) => {
                    let mut slot = self.shared.slot.lock();
                    if slot.state == ConnectionState::Error {
                        slot.state = ConnectionState::Ready;
                        slot.handle = Some(handle);
                        tracing::info!(attempt, "Store reconnected");
                    }
                    return;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Store reconnect attempt failed");
                }
            }
        }

        let mut slot = self.shared.slot.lock();
        if slot.state == ConnectionState::Error {
            slot.state = ConnectionState::Disconnected;
        }
        tracing::error!(
            attempts = backoff.max_attempts,
            "Giving up on store reconnect; next request retries"
        );
    }

    fn log_degraded(&self, operation: &'static str, err: &StoreError) {
        match err {
            StoreError::Configuration => {
                if !self.shared.unconfigured_logged.swap(true, Ordering::Relaxed) {
                    tracing::error!(
                        operation,
                        "Store address not configured; cache and rate limiting run fail-open"
                    );
                }
            }
            StoreError::Serialization(_) | StoreError::Pipeline(_) => {
                tracing::warn!(operation, error = %err, "Store reply unusable, failing open");
            }
            _ => {
                tracing::warn!(operation, error = %err, "Store unavailable, failing open");
            }
        }
    }
}

/// Strip credentials from a store URL before logging it.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
