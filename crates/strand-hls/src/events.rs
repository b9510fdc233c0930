//! Download state notifications.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::debug;

/// Lifecycle of one download run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadState {
    Started,
    Paused,
    Resumed,
    Cancelled,
    Completed,
    Error,
    Stopped,
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Started => "STARTED",
            Self::Paused => "PAUSED",
            Self::Resumed => "RESUMED",
            Self::Cancelled => "CANCELLED",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// `(done, total)` progress notification. `total` is constant across a run,
/// `done` is monotonic non-decreasing. Invoked from worker tasks; must not
/// block.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// `(state, message)` notification. The message is a short human-readable
/// reason, empty when there is nothing to say. Must not block; may reenter
/// the processor's control surface.
pub type StateCallback = Arc<dyn Fn(DownloadState, &str) + Send + Sync>;

/// Deduplicating state notifier: a transition is reported only when the new
/// state differs from the last observed one. Starts with no observed state,
/// so the first transition always notifies.
pub(crate) struct StateTracker {
    last: Mutex<Option<DownloadState>>,
    callback: StateCallback,
}

impl StateTracker {
    pub(crate) fn new(callback: StateCallback) -> Self {
        Self {
            last: Mutex::new(None),
            callback,
        }
    }

    /// Record a transition, notifying when the state changed. The callback
    /// runs with no lock held.
    pub(crate) fn update(&self, state: DownloadState, message: &str) {
        let changed = {
            let mut last = self.last.lock();
            let changed = *last != Some(state);
            *last = Some(state);
            changed
        };

        if changed {
            debug!(state = %state, message, "download state transition");
            (self.callback)(state, message);
        }
    }

    /// Reset for a fresh run so `Started` notifies again.
    pub(crate) fn reset(&self) {
        *self.last.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_tracker() -> (StateTracker, Arc<Mutex<Vec<(DownloadState, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let tracker = {
            let seen = seen.clone();
            StateTracker::new(Arc::new(move |state, message: &str| {
                seen.lock().push((state, message.to_string()));
            }))
        };
        (tracker, seen)
    }

    #[test]
    fn first_transition_notifies() {
        let (tracker, seen) = recording_tracker();
        tracker.update(DownloadState::Started, "");
        assert_eq!(seen.lock().as_slice(), &[(DownloadState::Started, String::new())]);
    }

    #[test]
    fn repeated_state_is_suppressed() {
        let (tracker, seen) = recording_tracker();
        tracker.update(DownloadState::Cancelled, "Cancelled by user");
        tracker.update(DownloadState::Cancelled, "Cancelled by user");
        tracker.update(DownloadState::Stopped, "done");

        let events = seen.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, DownloadState::Cancelled);
        assert_eq!(events[1].0, DownloadState::Stopped);
    }

    #[test]
    fn distinct_states_all_notify() {
        let (tracker, seen) = recording_tracker();
        tracker.update(DownloadState::Started, "");
        tracker.update(DownloadState::Paused, "");
        tracker.update(DownloadState::Resumed, "");
        tracker.update(DownloadState::Completed, "");
        assert_eq!(seen.lock().len(), 4);
    }

    #[test]
    fn reset_allows_started_again() {
        let (tracker, seen) = recording_tracker();
        tracker.update(DownloadState::Started, "");
        tracker.reset();
        tracker.update(DownloadState::Started, "");
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn callback_may_reenter_the_tracker() {
        // A state callback may call cancel(), which records another
        // transition on the same tracker. The tracker must not hold its
        // lock across the callback.
        use std::sync::OnceLock;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let slot: Arc<OnceLock<Arc<StateTracker>>> = Arc::new(OnceLock::new());

        let tracker = Arc::new(StateTracker::new(Arc::new({
            let seen = seen.clone();
            let slot = slot.clone();
            move |state, _: &str| {
                seen.lock().push(state);
                if state == DownloadState::Started {
                    if let Some(t) = slot.get() {
                        t.update(DownloadState::Cancelled, "from callback");
                    }
                }
            }
        })));
        let _ = slot.set(tracker.clone());

        tracker.update(DownloadState::Started, "");
        assert_eq!(
            seen.lock().as_slice(),
            &[DownloadState::Started, DownloadState::Cancelled]
        );
    }
}
