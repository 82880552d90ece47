use std::sync::{Arc, RwLock};

use anyhow::{bail, Result};
use tokio::sync::Notify;

/// What the scheduler is doing, as reported over the admin socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
    Paused,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Syncing => "syncing",
            SyncState::Paused => "paused",
        }
    }
}

#[derive(Debug, Default)]
struct Flags {
    paused: bool,
    syncing: bool,
}

/// Control surface shared by the admin socket and the scheduling loop.
///
/// Pausing blocks new passes only; a pass already running finishes.
#[derive(Clone, Default)]
pub struct SyncGate {
    flags: Arc<RwLock<Flags>>,
    requested: Arc<Notify>,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        if let Ok(mut flags) = self.flags.write() {
            flags.paused = true;
        }
    }

    pub fn resume(&self) {
        if let Ok(mut flags) = self.flags.write() {
            flags.paused = false;
        }
    }

    /// A poisoned lock reads as paused.
    pub fn status(&self) -> SyncState {
        match self.flags.read() {
            Ok(flags) if flags.paused => SyncState::Paused,
            Ok(flags) if flags.syncing => SyncState::Syncing,
            Ok(_) => SyncState::Idle,
            Err(_) => SyncState::Paused,
        }
    }

    /// Asks the scheduler for an immediate pass. Refused while paused.
    pub fn request_sync(&self) -> Result<()> {
        if self.status() == SyncState::Paused {
            bail!("sync is paused, resume first");
        }
        self.requested.notify_one();
        Ok(())
    }

    /// Resolves once `request_sync` has been called. A request made while
    /// nobody waits is kept for the next call.
    pub async fn sync_requested(&self) {
        self.requested.notified().await;
    }

    /// Marks a pass as running until the guard drops. `None` while paused.
    pub fn try_begin_pass(&self) -> Option<PassGuard> {
        let mut flags = self.flags.write().ok()?;
        if flags.paused {
            return None;
        }
        flags.syncing = true;
        Some(PassGuard { gate: self.clone() })
    }
}

pub struct PassGuard {
    gate: SyncGate,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        if let Ok(mut flags) = self.gate.flags.write() {
            flags.syncing = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn pass_guard_reports_syncing_until_dropped() {
        let gate = SyncGate::new();
        let handle = gate.clone();
        assert_eq!(gate.status(), SyncState::Idle);

        let pass = gate.try_begin_pass().expect("idle gate should start a pass");
        assert_eq!(handle.status().as_str(), "syncing");

        handle.pause();
        assert_eq!(gate.status(), SyncState::Paused);
        drop(pass);
        assert_eq!(gate.status(), SyncState::Paused);

        gate.resume();
        assert_eq!(handle.status(), SyncState::Idle);
    }

    #[test]
    fn paused_gate_refuses_passes_and_requests() {
        let gate = SyncGate::new();
        gate.pause();

        assert!(gate.try_begin_pass().is_none());
        let err = gate.request_sync().expect_err("paused gate should refuse");
        assert!(err.to_string().contains("paused"));
    }

    #[tokio::test]
    async fn request_made_before_waiting_is_not_lost() {
        let gate = SyncGate::new();
        gate.request_sync().unwrap();

        tokio::time::timeout(Duration::from_millis(100), gate.sync_requested())
            .await
            .expect("pending request should wake the scheduler");
    }
}
