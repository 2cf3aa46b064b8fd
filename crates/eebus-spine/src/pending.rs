//! Pending-request table: correlates outgoing requests with their replies.
//!
//! Entries are keyed by `(remote SKI, msgCounter)`. A reply (or result)
//! whose `msgCounterReference` matches removes the entry exactly once and
//! completes its waiter. Waiters enforce their own deadline precisely via
//! `timeout_at`; a background sweeper additionally reaps entries whose
//! waiter was dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::SpineError;
use crate::model::{Cmd, Header, MsgCounter};

/// A correlated reply as delivered to a request's waiter.
#[derive(Debug, Clone)]
pub struct ReplyMessage {
    pub header: Header,
    pub cmd: Cmd,
}

struct PendingEntry {
    tx: oneshot::Sender<Result<ReplyMessage, SpineError>>,
    deadline: Instant,
}

/// Interval at which abandoned entries are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Default)]
pub struct PendingRequests {
    entries: Mutex<HashMap<(String, u64), PendingEntry>>,
}

impl PendingRequests {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Enroll a request before its datagram is written, so a fast reply
    /// cannot race the table.
    pub fn add(
        &self,
        ski: &str,
        counter: MsgCounter,
        max_response_delay: Duration,
    ) -> oneshot::Receiver<Result<ReplyMessage, SpineError>> {
        let (tx, rx) = oneshot::channel();
        let entry = PendingEntry {
            tx,
            deadline: Instant::now() + max_response_delay,
        };
        self.entries
            .lock()
            .insert((ski.to_string(), counter.raw()), entry);
        rx
    }

    /// Complete the entry matching `counter`, if any. Returns whether an
    /// entry existed; an unmatched reply is the caller's to log, not fatal.
    pub fn complete(&self, ski: &str, counter: MsgCounter, reply: ReplyMessage) -> bool {
        let entry = self.entries.lock().remove(&(ski.to_string(), counter.raw()));
        match entry {
            Some(entry) => {
                let _ = entry.tx.send(Ok(reply));
                true
            }
            None => false,
        }
    }

    /// Complete the entry matching `counter` with an error, e.g. a
    /// `resultData` carrying a non-zero error number.
    pub fn fail(&self, ski: &str, counter: MsgCounter, error: SpineError) -> bool {
        let entry = self.entries.lock().remove(&(ski.to_string(), counter.raw()));
        match entry {
            Some(entry) => {
                let _ = entry.tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Drop the entry without completing it (waiter-side timeout cleanup).
    pub fn remove(&self, ski: &str, counter: MsgCounter) {
        self.entries.lock().remove(&(ski.to_string(), counter.raw()));
    }

    /// Complete every entry for a peer with `ConnectionClosed`.
    pub fn drain_device(&self, ski: &str) {
        let drained: Vec<PendingEntry> = {
            let mut entries = self.entries.lock();
            let keys: Vec<_> = entries
                .keys()
                .filter(|(s, _)| s == ski)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| entries.remove(&key))
                .collect()
        };
        for entry in drained {
            let _ = entry.tx.send(Err(SpineError::ConnectionClosed));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Any entries outstanding for this peer?
    pub fn has_for_device(&self, ski: &str) -> bool {
        self.entries.lock().keys().any(|(s, _)| s == ski)
    }

    pub fn contains(&self, ski: &str, counter: MsgCounter) -> bool {
        self.entries
            .lock()
            .contains_key(&(ski.to_string(), counter.raw()))
    }

    /// Await a reply with the request's deadline. On expiry the entry is
    /// removed and the caller sees `ResponseTimeout`.
    pub async fn wait(
        self: Arc<Self>,
        ski: String,
        counter: MsgCounter,
        deadline: Instant,
        rx: oneshot::Receiver<Result<ReplyMessage, SpineError>>,
    ) -> Result<ReplyMessage, SpineError> {
        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SpineError::ConnectionClosed),
            Err(_) => {
                self.remove(&ski, counter);
                Err(SpineError::ResponseTimeout { counter })
            }
        }
    }

    /// Reap entries past their deadline whose waiter went away, completing
    /// any live waiter with `ResponseTimeout`.
    pub fn sweep(&self, now: Instant) {
        let expired: Vec<((String, u64), PendingEntry)> = {
            let mut entries = self.entries.lock();
            let keys: Vec<_> = entries
                .iter()
                .filter(|(_, e)| e.deadline <= now)
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| entries.remove(&key).map(|e| (key, e)))
                .collect()
        };
        for ((ski, counter), entry) in expired {
            debug!(ski = %ski, counter, "pending request expired");
            let _ = entry.tx.send(Err(SpineError::ResponseTimeout {
                counter: MsgCounter::new(counter),
            }));
        }
    }

    /// Run the periodic sweep until the table is dropped by all owners.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let Some(table) = weak.upgrade() else {
                    return;
                };
                table.sweep(Instant::now());
            }
        })
    }
}
