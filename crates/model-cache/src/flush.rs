//! Save scheduling between callers and the background writer thread.
//!
//! Callers mark a save as pending on the [`FlushSignal`]; the writer thread
//! waits on it and runs the save once the burst of requests has gone quiet.
//! There is only ever one pending slot, so rapid requests coalesce.

use parking_lot::{Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// What the writer thread should do next.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlushDecision {
    Flush,
    /// Stop the thread. `pending` tells whether a save was still waiting.
    Shutdown { pending: bool },
}

/// Outcome of a save request.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlushRequest {
    /// A new pending save was created.
    Scheduled,
    /// Merged into a save that was already pending.
    Coalesced,
    /// The writer has shut down; nothing will run.
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct PendingFlush {
    first_requested_at: Instant,
    last_requested_at: Instant,
}

#[derive(Debug, Default)]
struct FlushState {
    pending: Option<PendingFlush>,
    in_flight: bool,
    shutdown: bool,
}

/// Single-slot save signal with debounce.
#[derive(Debug)]
pub struct FlushSignal {
    state: Mutex<FlushState>,
    wakeup: Condvar,
    idle: Condvar,
    delay: Duration,
    max_delay: Duration,
}

impl Default for FlushSignal {
    fn default() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }
}

impl FlushSignal {
    pub fn new(delay: Duration, max_delay: Duration) -> Self {
        Self {
            state: Mutex::new(FlushState::default()),
            wakeup: Condvar::new(),
            idle: Condvar::new(),
            delay,
            max_delay: max_delay.max(delay),
        }
    }

    /// Marks a save as pending. Never blocks beyond the state lock.
    pub fn request(&self) -> FlushRequest {
        let now = Instant::now();
        let mut state = self.state.lock();
        if state.shutdown {
            return FlushRequest::Closed;
        }
        let outcome = match state.pending.as_mut() {
            Some(pending) => {
                pending.last_requested_at = now;
                FlushRequest::Coalesced
            }
            None => {
                state.pending = Some(PendingFlush {
                    first_requested_at: now,
                    last_requested_at: now,
                });
                FlushRequest::Scheduled
            }
        };
        self.wakeup.notify_one();
        outcome
    }

    /// Drops a pending save that has not started yet.
    ///
    /// Returns whether one was pending.
    pub fn cancel_pending(&self) -> bool {
        let mut state = self.state.lock();
        let cancelled = state.pending.take().is_some();
        if cancelled && !state.in_flight {
            self.idle.notify_all();
        }
        cancelled
    }

    /// Asks the writer thread to stop.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        self.wakeup.notify_all();
    }

    /// Blocks the writer thread until a save is due or shutdown is requested.
    ///
    /// Both `Flush` and `Shutdown { pending: true }` mark a save as in flight;
    /// the writer must call [`FlushSignal::finish_flush`] afterwards.
    pub fn wait_for_flush(&self) -> FlushDecision {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                let pending = state.pending.take().is_some();
                state.in_flight = pending;
                return FlushDecision::Shutdown { pending };
            }

            let pending = state.pending;
            match pending {
                Some(pending) => {
                    let quiet_at = pending.last_requested_at + self.delay;
                    let cap_at = pending.first_requested_at + self.max_delay;
                    let due_at = quiet_at.min(cap_at);
                    let now = Instant::now();
                    if now >= due_at {
                        state.pending = None;
                        state.in_flight = true;
                        return FlushDecision::Flush;
                    }
                    self.wakeup.wait_for(&mut state, due_at - now);
                }
                None => self.wakeup.wait(&mut state),
            }
        }
    }

    /// Marks the in-flight save as done and wakes idle waiters.
    pub fn finish_flush(&self) {
        let mut state = self.state.lock();
        state.in_flight = false;
        self.idle.notify_all();
    }

    /// Waits until nothing is pending or in flight.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            let pending = state.pending.is_some() && !state.shutdown;
            if !pending && !state.in_flight {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.idle.wait_for(&mut state, deadline - now);
        }
    }
}

/// Owns the writer thread. Dropping it shuts the thread down and joins it.
#[derive(Debug)]
pub struct FlushWorkerHandle {
    signal: std::sync::Arc<FlushSignal>,
    join_handle: Option<JoinHandle<()>>,
}

impl FlushWorkerHandle {
    pub fn new(signal: std::sync::Arc<FlushSignal>, join_handle: JoinHandle<()>) -> Self {
        Self {
            signal,
            join_handle: Some(join_handle),
        }
    }
}

impl Drop for FlushWorkerHandle {
    fn drop(&mut self) {
        self.signal.shutdown();
        if let Some(join_handle) = self.join_handle.take() {
            if join_handle.join().is_err() {
                tracing::warn!("model cache writer thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn second_request_coalesces() {
        let signal = FlushSignal::default();
        assert_eq!(signal.request(), FlushRequest::Scheduled);
        assert_eq!(signal.request(), FlushRequest::Coalesced);
        assert_eq!(signal.wait_for_flush(), FlushDecision::Flush);
        signal.finish_flush();
        assert_eq!(signal.request(), FlushRequest::Scheduled);
    }

    #[test]
    fn request_during_flight_stays_pending() {
        let signal = FlushSignal::default();
        signal.request();
        assert_eq!(signal.wait_for_flush(), FlushDecision::Flush);

        // The running save is not affected; a new one queues behind it.
        assert_eq!(signal.request(), FlushRequest::Scheduled);
        signal.finish_flush();
        assert_eq!(signal.wait_for_flush(), FlushDecision::Flush);
        signal.finish_flush();
        assert!(signal.wait_idle(Duration::from_millis(10)));
    }

    #[test]
    fn debounce_waits_for_quiet_period() {
        let signal = FlushSignal::new(Duration::from_millis(80), Duration::from_secs(5));
        let started = Instant::now();
        signal.request();
        assert_eq!(signal.wait_for_flush(), FlushDecision::Flush);
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn max_delay_caps_a_busy_burst() {
        let signal = Arc::new(FlushSignal::new(
            Duration::from_millis(50),
            Duration::from_millis(150),
        ));
        let requester = {
            let signal = signal.clone();
            thread::spawn(move || {
                for _ in 0..40 {
                    signal.request();
                    thread::sleep(Duration::from_millis(20));
                }
            })
        };

        let started = Instant::now();
        assert_eq!(signal.wait_for_flush(), FlushDecision::Flush);
        // Requests keep arriving every 20ms; only the cap can end the wait.
        assert!(started.elapsed() < Duration::from_millis(600));
        signal.finish_flush();
        requester.join().expect("requester");
    }

    #[test]
    fn shutdown_reports_pending_save() {
        let signal = FlushSignal::new(Duration::from_secs(60), Duration::from_secs(60));
        signal.request();
        signal.shutdown();
        assert_eq!(
            signal.wait_for_flush(),
            FlushDecision::Shutdown { pending: true }
        );
        signal.finish_flush();
        assert_eq!(signal.request(), FlushRequest::Closed);
    }

    #[test]
    fn cancel_pending_makes_signal_idle() {
        let signal = FlushSignal::new(Duration::from_secs(60), Duration::from_secs(60));
        signal.request();
        assert!(!signal.wait_idle(Duration::from_millis(10)));
        assert!(signal.cancel_pending());
        assert!(signal.wait_idle(Duration::from_millis(10)));
    }

    #[test]
    fn handle_drop_stops_worker() {
        let signal = Arc::new(FlushSignal::default());
        let worker_signal = signal.clone();
        let join_handle = thread::spawn(move || loop {
            match worker_signal.wait_for_flush() {
                FlushDecision::Flush => worker_signal.finish_flush(),
                FlushDecision::Shutdown { .. } => {
                    worker_signal.finish_flush();
                    break;
                }
            }
        });

        drop(FlushWorkerHandle::new(signal.clone(), join_handle));
        assert_eq!(signal.request(), FlushRequest::Closed);
    }
}
