//! Heartbeat push to a subscribed peer.
//!
//! Started when the peer subscribes to the local DeviceDiagnosis server,
//! stopped on unsubscribe or connection close. Each beat is a notify with a
//! strictly increasing `heartbeatCounter`; the SPINE message counters of
//! sent beats are remembered so acks referencing them are recognized and
//! swallowed instead of reaching other handlers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::model::devicediagnosis::DeviceDiagnosisHeartbeatData;
use crate::model::{CmdData, FeatureAddress, MsgCounter};
use crate::sender::Sender;

/// Beat cadence fixed by the SPINE DeviceDiagnosis definition.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(4);

#[derive(Default)]
pub struct HeartbeatSender {
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    sent_counters: Arc<Mutex<HashSet<u64>>>,
    heartbeat_counter: Arc<AtomicU64>,
}

impl HeartbeatSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start beating from `source` (the local DeviceDiagnosis server) to
    /// `destination` (the subscriber's client feature). A running task is
    /// replaced.
    pub fn start(&self, sender: Sender, source: FeatureAddress, destination: FeatureAddress) {
        let sent_counters = self.sent_counters.clone();
        let heartbeat_counter = self.heartbeat_counter.clone();

        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(HEARTBEAT_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let beat = DeviceDiagnosisHeartbeatData {
                    timestamp: Some(chrono::Utc::now().to_rfc3339()),
                    heartbeat_counter: Some(heartbeat_counter.fetch_add(1, Ordering::Relaxed)),
                    heartbeat_timeout: Some("PT4S".to_string()),
                };
                match sender.notify(
                    source.clone(),
                    destination.clone(),
                    CmdData::DeviceDiagnosisHeartbeatData(beat),
                ) {
                    Ok(counter) => {
                        trace!(%counter, "heartbeat sent");
                        sent_counters.lock().insert(counter.raw());
                    }
                    Err(e) => {
                        debug!(error = %e, "failed to send heartbeat");
                    }
                }
            }
        });

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Stop beating. Idempotent.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Was this message counter one of our heartbeats? Used to swallow
    /// acks instead of routing them as unsolicited results.
    pub fn is_heartbeat_counter(&self, counter: MsgCounter) -> bool {
        self.sent_counters.lock().contains(&counter.raw())
    }
}

impl Drop for HeartbeatSender {
    fn drop(&mut self) {
        self.stop();
    }
}
