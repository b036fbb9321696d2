//! In-process [`Store`] used by tests and `memory://` deployments.
//!
//! Expiry is evaluated lazily against `tokio::time::Instant`, so tests running
//! on a paused clock can advance past TTLs deterministically.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{Connector, SharedStore, Store, WindowReply};
use crate::error::{Result, StoreError};

/// Injected failure mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every command fails as if the socket were refused
    Unavailable,
    /// The counting pipeline answers with fewer replies than commands sent
    ShortPipeline,
    /// Every command stalls forever (exercises command timeouts)
    Hang,
}

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Counter(i64),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn approx_size(&self, key: &str) -> usize {
        let value = match &self.value {
            Value::Text(s) => s.len(),
            Value::Counter(_) => 8,
        };
        key.len() + value
    }
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    fault: Option<Fault>,
}

impl State {
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn purge_expired(&mut self, now: Instant) {
        self.entries.retain(|_, e| e.is_live(now));
    }
}

/// Shared in-memory store. Clones observe the same keyspace.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or clear an injected fault
    pub fn set_fault(&self, fault: Option<Fault>) {
        self.state.lock().fault = fault;
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining TTL of `key`, if it is live and has one
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let mut state = self.state.lock();
        state
            .live(key, now)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    async fn check_fault(&self) -> Result<()> {
        let fault = self.state.lock().fault;
        match fault {
            Some(Fault::Unavailable) => {
                Err(StoreError::Unavailable("connection refused".to_string()))
            }
            Some(Fault::Hang) => {
                std::future::pending::<()>().await;
                Ok(())
            }
            Some(Fault::ShortPipeline) | None => Ok(()),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_fault().await?;
        let mut state = self.state.lock();
        match state.live(key, Instant::now()).map(|e| &e.value) {
            Some(Value::Text(s)) => Ok(Some(s.clone())),
            Some(Value::Counter(n)) => Ok(Some(n.to_string())),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.check_fault().await?;
        let entry = Entry {
            value: Value::Text(value.to_string()),
            expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
        };
        self.state.lock().entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn incr_window(&self, key: &str, window_secs: u64) -> Result<WindowReply> {
        self.check_fault().await?;
        let now = Instant::now();
        let mut state = self.state.lock();
        let short = state.fault == Some(Fault::ShortPipeline);

        let count = match state.live(key, now) {
            Some(entry) => {
                let next = match &entry.value {
                    Value::Counter(n) => n + 1,
                    Value::Text(s) => s.parse::<i64>().map_err(|_| {
                        StoreError::Redis("value is not an integer or out of range".to_string())
                    })? + 1,
                };
                entry.value = Value::Counter(next);
                next
            }
            None => {
                state.entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Counter(1),
                        expires_at: None,
                    },
                );
                1
            }
        };

        if short {
            return Ok(WindowReply(vec![count]));
        }

        if let Some(entry) = state.entries.get_mut(key) {
            entry.expires_at = Some(now + Duration::from_secs(window_secs));
        }
        let ttl = i64::try_from(window_secs).unwrap_or(i64::MAX);

        Ok(WindowReply(vec![count, 1, ttl]))
    }

    async fn scan_page(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>)> {
        self.check_fault().await?;
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());

        // Cursor is an offset into the sorted keyspace.
        let mut all: Vec<&String> = state.entries.keys().collect();
        all.sort_unstable();

        let start = usize::try_from(cursor).unwrap_or(usize::MAX).min(all.len());
        let end = start.saturating_add(count.max(1)).min(all.len());
        let page = all[start..end]
            .iter()
            .filter(|k| glob_match(pattern, k))
            .map(|k| (*k).clone())
            .collect();
        let next = if end >= all.len() { 0 } else { end as u64 };

        Ok((next, page))
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        self.check_fault().await?;
        let now = Instant::now();
        let mut state = self.state.lock();
        let mut deleted = 0;
        for key in keys {
            if state.live(key, now).is_some() {
                state.entries.remove(key);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn ping(&self) -> Result<()> {
        self.check_fault().await
    }

    async fn memory_info(&self) -> Result<String> {
        self.check_fault().await?;
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        let used: usize = state.entries.iter().map(|(k, e)| e.approx_size(k)).sum();

        Ok(format!(
            "# Memory\r\nused_memory:{used}\r\nused_memory_human:{}\r\n",
            human_bytes(used)
        ))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl Connector for MemoryStore {
    async fn connect(&self, _url: &str) -> Result<SharedStore> {
        if self.state.lock().fault == Some(Fault::Unavailable) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(Arc::new(self.clone()))
    }
}

/// Redis-style glob match supporting `*`, `?` and `\` escapes.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();
    let (mut pi, mut ki) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ki < k.len() {
        match p.get(pi) {
            Some('*') => {
                star = Some((pi, ki));
                pi += 1;
            }
            Some('?') => {
                pi += 1;
                ki += 1;
            }
            Some('\\') if p.get(pi + 1) == Some(&k[ki]) => {
                pi += 2;
                ki += 1;
            }
            Some(c) if *c != '\\' && *c == k[ki] => {
                pi += 1;
                ki += 1;
            }
            _ => match star {
                Some((sp, sk)) => {
                    pi = sp + 1;
                    ki = sk + 1;
                    star = Some((sp, sk + 1));
                }
                None => return false,
            },
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

fn human_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "K", "M", "G"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.2}{}", UNITS[unit])
    }
}
