use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Health state of the remote endpoint as seen by the gate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GateState {
    /// Calls flow normally.
    Accepting,
    /// Too many consecutive transport failures; calls are refused until the
    /// cooldown elapses.
    Paused,
    /// Cooldown elapsed; exactly one probe call is in flight.
    Probing,
}

#[derive(Debug, Copy, Clone)]
pub struct GateSnapshot {
    pub state: GateState,
    pub consecutive_failures: usize,
}

#[derive(Debug)]
struct GateInner {
    state: GateState,
    consecutive_failures: usize,
    paused_at: Option<Instant>,
}

/// Pauses outbound RPC traffic after a run of transport-level failures.
///
/// Only timeouts and connection errors count against the gate; a node that
/// answers with an error object is still a healthy node. While the gate is
/// paused, callers fail fast and their retry schedules keep the items alive
/// until the endpoint recovers.
#[derive(Debug)]
pub struct RpcHealthGate {
    inner: Mutex<GateInner>,
    failure_threshold: usize,
    cooldown: Duration,
}

impl Default for RpcHealthGate {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(15))
    }
}

impl RpcHealthGate {
    pub fn new(failure_threshold: usize, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(GateInner {
                state: GateState::Accepting,
                consecutive_failures: 0,
                paused_at: None,
            }),
            failure_threshold: failure_threshold.max(1),
            cooldown: cooldown.max(Duration::from_millis(1)),
        }
    }

    pub fn snapshot(&self) -> GateSnapshot {
        let inner = self.inner.lock().expect("health gate mutex poisoned");
        GateSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
        }
    }

    /// Returns true when a call may go out. While paused, admits a single
    /// probe once the cooldown has elapsed.
    pub fn permit(&self) -> bool {
        let mut inner = self.inner.lock().expect("health gate mutex poisoned");
        match inner.state {
            GateState::Accepting => true,
            GateState::Probing => false,
            GateState::Paused => {
                let elapsed = inner
                    .paused_at
                    .map(|at| at.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if elapsed {
                    self.transition(&mut inner, GateState::Probing);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("health gate mutex poisoned");
        inner.consecutive_failures = 0;
        inner.paused_at = None;
        if inner.state != GateState::Accepting {
            self.transition(&mut inner, GateState::Accepting);
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("health gate mutex poisoned");
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        match inner.state {
            GateState::Probing => {
                inner.paused_at = Some(Instant::now());
                self.transition(&mut inner, GateState::Paused);
            }
            GateState::Accepting if inner.consecutive_failures >= self.failure_threshold => {
                inner.paused_at = Some(Instant::now());
                self.transition(&mut inner, GateState::Paused);
            }
            _ => {}
        }
    }

    fn transition(&self, inner: &mut GateInner, next: GateState) {
        tracing::warn!(
            previous = ?inner.state,
            next = ?next,
            consecutive_failures = inner.consecutive_failures,
            "rpc health gate state changed"
        );
        inner.state = next;
    }
}
