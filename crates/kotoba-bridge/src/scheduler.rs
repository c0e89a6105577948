//! Guest lifecycle state and host timers.
//!
//! The guest runs cooperatively: the host enters it through `run` or
//! `resume`, and the guest hands control back by returning. Timers the guest
//! requests are tokio tasks that only *report* expiry through a channel; the
//! module bridge decides when to resume the guest for them, so no guest code
//! ever runs on a timer task.

use std::collections::HashMap;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{BridgeError, BridgeResult};

/// Default number of extra resumes a fired timer may trigger before the
/// scheduler gives up on it.
pub const DEFAULT_MAX_TIMER_REFIRES: u32 = 16;

/// Where the guest is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestState {
    /// Instantiated, `run` not yet called.
    NotStarted,
    /// A guest frame is active.
    Running,
    /// The guest returned control and waits for a resume.
    Suspended,
    /// The guest called `wasmExit`. Terminal.
    Exited(i32),
}

/// What happened when a fired timer was serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// The guest handled the timer, after `refires` extra resumes.
    Fired {
        /// Timer id.
        id: i32,
        /// Extra resumes needed before the guest cleared the timer.
        refires: u32,
    },
    /// The timer was cleared before it could be serviced.
    Canceled {
        /// Timer id.
        id: i32,
    },
    /// The guest never cleared the timer; it was dropped after `refires`
    /// extra resumes.
    Exhausted {
        /// Timer id.
        id: i32,
        /// Extra resumes attempted.
        refires: u32,
    },
}

/// Resolves once the guest exits.
#[derive(Debug, Clone)]
pub struct ExitSignal {
    rx: watch::Receiver<Option<i32>>,
}

impl ExitSignal {
    /// The exit code, if the guest has already exited.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        *self.rx.borrow()
    }

    /// Wait for the guest to exit and return its code.
    ///
    /// Returns `None` if the bridge was dropped without the guest exiting.
    pub async fn wait(&mut self) -> Option<i32> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(code) => *code,
            Err(_) => None,
        }
    }
}

/// Guest state machine plus the table of armed timers.
#[derive(Debug)]
pub struct Scheduler {
    state: GuestState,
    depth: u32,
    timers: HashMap<i32, JoinHandle<()>>,
    next_timer_id: i32,
    fired_tx: mpsc::UnboundedSender<i32>,
    fired_rx: mpsc::UnboundedReceiver<i32>,
    runtime: Handle,
    exit_tx: watch::Sender<Option<i32>>,
    max_refires: u32,
}

impl Scheduler {
    /// A scheduler that arms timers on `runtime`.
    #[must_use]
    pub fn new(runtime: Handle, max_refires: u32) -> Self {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let (exit_tx, _) = watch::channel(None);
        Self {
            state: GuestState::NotStarted,
            depth: 0,
            timers: HashMap::new(),
            next_timer_id: 1,
            fired_tx,
            fired_rx,
            runtime,
            exit_tx,
            max_refires,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> GuestState {
        self.state
    }

    /// Exit code once the guest has exited.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self.state {
            GuestState::Exited(code) => Some(code),
            _ => None,
        }
    }

    /// How many extra resumes a fired timer may trigger.
    #[must_use]
    pub fn max_refires(&self) -> u32 {
        self.max_refires
    }

    /// Fail unless the guest is in a state where `run` may be called.
    pub fn check_startable(&self) -> BridgeResult<()> {
        match self.state {
            GuestState::NotStarted => Ok(()),
            GuestState::Exited(code) => Err(BridgeError::AlreadyExited(code)),
            GuestState::Running | GuestState::Suspended => Err(BridgeError::AlreadyStarted),
        }
    }

    /// Record entry into a guest frame.
    pub fn enter(&mut self) -> BridgeResult<()> {
        if let GuestState::Exited(code) = self.state {
            return Err(BridgeError::AlreadyExited(code));
        }
        self.depth += 1;
        self.state = GuestState::Running;
        Ok(())
    }

    /// Record return from a guest frame.
    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 && self.state == GuestState::Running {
            self.state = GuestState::Suspended;
        }
    }

    /// Arm a timer that reports its id after `delay_ms` milliseconds.
    pub fn schedule_timeout(&mut self, delay_ms: i64) -> i32 {
        let id = self.next_timer_id;
        self.next_timer_id = self.next_timer_id.wrapping_add(1);

        let delay = Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0));
        let tx = self.fired_tx.clone();
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(id);
        });
        self.timers.insert(id, handle);
        trace!(timer_id = id, delay_ms, "armed timer");
        id
    }

    /// Cancel a timer. Unknown ids are ignored.
    pub fn clear_timeout(&mut self, id: i32) -> bool {
        match self.timers.remove(&id) {
            Some(handle) => {
                handle.abort();
                trace!(timer_id = id, "cleared timer");
                true
            },
            None => false,
        }
    }

    /// Whether the guest still holds interest in timer `id`.
    #[must_use]
    pub fn is_pending(&self, id: i32) -> bool {
        self.timers.contains_key(&id)
    }

    /// Number of timers the guest has not cleared.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Take an already-fired timer id without waiting.
    pub fn try_next_fired(&mut self) -> Option<i32> {
        self.fired_rx.try_recv().ok()
    }

    /// Wait for the next timer to fire.
    ///
    /// Returns `None` straight away when nothing is armed, since nothing
    /// could ever arrive.
    pub async fn next_fired(&mut self) -> Option<i32> {
        if let Some(id) = self.try_next_fired() {
            return Some(id);
        }
        if self.timers.is_empty() {
            return None;
        }
        self.fired_rx.recv().await
    }

    /// Mark the guest exited, cancel every timer and wake exit waiters.
    pub fn exit(&mut self, code: i32) {
        self.state = GuestState::Exited(code);
        for (id, handle) in self.timers.drain() {
            handle.abort();
            trace!(timer_id = id, "dropped timer on exit");
        }
        while self.fired_rx.try_recv().is_ok() {}
        self.exit_tx.send_replace(Some(code));
        debug!(code, "guest exited");
    }

    /// A future-like handle that resolves on exit.
    #[must_use]
    pub fn exit_signal(&self) -> ExitSignal {
        ExitSignal {
            rx: self.exit_tx.subscribe(),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for handle in self.timers.values() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> Scheduler {
        Scheduler::new(Handle::current(), DEFAULT_MAX_TIMER_REFIRES)
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let mut s = scheduler();
        assert_eq!(s.state(), GuestState::NotStarted);
        s.check_startable().unwrap();

        s.enter().unwrap();
        s.enter().unwrap();
        assert_eq!(s.state(), GuestState::Running);
        s.leave();
        assert_eq!(s.state(), GuestState::Running);
        s.leave();
        assert_eq!(s.state(), GuestState::Suspended);
        assert!(matches!(s.check_startable(), Err(BridgeError::AlreadyStarted)));

        s.exit(3);
        assert_eq!(s.state(), GuestState::Exited(3));
        assert!(matches!(s.enter(), Err(BridgeError::AlreadyExited(3))));
        assert!(matches!(s.check_startable(), Err(BridgeError::AlreadyExited(3))));
    }

    #[tokio::test]
    async fn timer_ids_increase_from_one() {
        let mut s = scheduler();
        assert_eq!(s.schedule_timeout(10), 1);
        assert_eq!(s.schedule_timeout(10), 2);
        assert_eq!(s.pending_timers(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fired_timer_is_reported() {
        let mut s = scheduler();
        let id = s.schedule_timeout(250);
        assert_eq!(s.try_next_fired(), None);
        assert_eq!(s.next_fired().await, Some(id));
        assert!(s.is_pending(id));
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_timer_never_fires() {
        let mut s = scheduler();
        let id = s.schedule_timeout(100);
        assert!(s.clear_timeout(id));
        assert!(!s.clear_timeout(id));
        assert!(!s.clear_timeout(999));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(s.try_next_fired(), None);
        assert_eq!(s.next_fired().await, None);
    }

    #[tokio::test]
    async fn exit_resolves_signal_and_drops_timers() {
        let mut s = scheduler();
        let mut signal = s.exit_signal();
        assert_eq!(signal.code(), None);
        s.schedule_timeout(1_000);
        s.exit(0);
        assert_eq!(s.pending_timers(), 0);
        assert_eq!(signal.wait().await, Some(0));
    }

    #[tokio::test]
    async fn negative_delay_fires_immediately() {
        let mut s = scheduler();
        let id = s.schedule_timeout(-5);
        assert_eq!(s.next_fired().await, Some(id));
    }
}
