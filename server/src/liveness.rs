//! Heartbeat bookkeeping for one connection.
//!
//! The outer probe runs on the scheduler's liveness cadence. A connection
//! that has not answered the previous probe is closed; otherwise it is marked
//! suspect, pinged, and a watchdog is armed that closes it unless a pong
//! arrives first.

use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// The previous probe went unanswered.
    Close,
    /// Send a ping and arm a watchdog tagged with `seq`.
    Ping { seq: u64 },
}

#[derive(Debug)]
pub struct Liveness {
    is_alive: bool,
    probe_seq: u64,
    watchdog: Option<JoinHandle<()>>,
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            is_alive: true,
            probe_seq: 0,
            watchdog: None,
        }
    }

    pub fn probe(&mut self) -> Probe {
        if !self.is_alive {
            return Probe::Close;
        }
        self.is_alive = false;
        self.probe_seq += 1;
        Probe::Ping {
            seq: self.probe_seq,
        }
    }

    /// Retains the watchdog timer for the current probe, replacing any older one.
    pub fn arm(&mut self, watchdog: JoinHandle<()>) {
        self.cancel();
        self.watchdog = Some(watchdog);
    }

    pub fn on_pong(&mut self) {
        self.is_alive = true;
        self.cancel();
    }

    /// Called when a watchdog fires. Returns true when the connection should
    /// be closed: the probe is current and still unanswered.
    pub fn on_watchdog(&mut self, seq: u64) -> bool {
        if seq != self.probe_seq {
            return false;
        }
        self.watchdog = None;
        !self.is_alive
    }

    pub fn cancel(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
    }
}

#[cfg(test)]
impl Liveness {
    fn is_alive(&self) -> bool {
        self.is_alive
    }

    fn has_watchdog(&self) -> bool {
        self.watchdog.is_some()
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Liveness {
    fn drop(&mut self) {
        self.cancel();
    }
}
