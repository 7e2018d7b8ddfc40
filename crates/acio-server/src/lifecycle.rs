//! Process lifecycle
//!
//! ```text
//! Starting -> Listening -> ShuttingDown -> Stopped
//! ```
//!
//! Transitions are compare-and-swap, so concurrent shutdown triggers race
//! for exactly one edge into `ShuttingDown` and the losers are ignored.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Starting = 0,
    Listening = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Listening,
            2 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What set shutdown in motion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Sigterm,
    Sigint,
    /// A panic escaped a task
    UncaughtPanic(String),
    /// A supervised background task returned an error
    UnhandledTaskFailure(String),
}

impl ShutdownReason {
    /// Failure-class triggers are logged at error level before teardown
    pub fn is_failure(&self) -> bool {
        self.detail().is_some()
    }

    /// What went wrong, for failure-class triggers
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::UncaughtPanic(detail) | Self::UnhandledTaskFailure(detail) => Some(detail),
            Self::Sigterm | Self::Sigint => None,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sigterm => f.write_str("SIGTERM"),
            Self::Sigint => f.write_str("SIGINT"),
            Self::UncaughtPanic(_) => f.write_str("UNCAUGHT_PANIC"),
            Self::UnhandledTaskFailure(_) => f.write_str("UNHANDLED_TASK_FAILURE"),
        }
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Starting as u8),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Starting -> Listening`
    pub fn mark_listening(&self) -> bool {
        self.transition(LifecycleState::Starting, LifecycleState::Listening)
    }

    /// `Starting | Listening -> ShuttingDown`. Returns `false` for every
    /// trigger after the first.
    pub fn begin_shutdown(&self) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match LifecycleState::from_u8(current) {
                    LifecycleState::Starting | LifecycleState::Listening => {
                        Some(LifecycleState::ShuttingDown as u8)
                    },
                    LifecycleState::ShuttingDown | LifecycleState::Stopped => None,
                }
            })
            .is_ok()
    }

    /// Terminal from any state
    pub fn mark_stopped(&self) {
        self.state.store(LifecycleState::Stopped as u8, Ordering::Release);
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_happy_path() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Starting);
        assert!(lifecycle.mark_listening());
        assert!(lifecycle.begin_shutdown());
        assert_eq!(lifecycle.state(), LifecycleState::ShuttingDown);
        lifecycle.mark_stopped();
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_shutdown_while_starting() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.begin_shutdown());
        assert_eq!(lifecycle.state(), LifecycleState::ShuttingDown);
        assert!(!lifecycle.mark_listening());
    }

    #[test]
    fn test_second_trigger_is_ignored() {
        let lifecycle = Lifecycle::new();
        lifecycle.mark_listening();
        assert!(lifecycle.begin_shutdown());
        assert!(!lifecycle.begin_shutdown());
        lifecycle.mark_stopped();
        assert!(!lifecycle.begin_shutdown());
    }

    #[test]
    fn test_concurrent_triggers_elect_one_winner() {
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.mark_listening();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lifecycle = Arc::clone(&lifecycle);
                std::thread::spawn(move || lifecycle.begin_shutdown())
            })
            .collect();

        let winners = handles
            .into_iter()
            .filter_map(|handle| handle.join().ok())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_reason_names() {
        assert_eq!(ShutdownReason::Sigterm.to_string(), "SIGTERM");
        assert_eq!(ShutdownReason::Sigint.to_string(), "SIGINT");
        assert_eq!(
            ShutdownReason::UncaughtPanic("boom".into()).to_string(),
            "UNCAUGHT_PANIC"
        );
        assert!(ShutdownReason::UnhandledTaskFailure("x".into()).is_failure());
        assert!(!ShutdownReason::Sigterm.is_failure());
        assert!(!ShutdownReason::Sigint.is_failure());
    }

    #[test]
    fn test_failure_detail() {
        assert_eq!(
            ShutdownReason::UncaughtPanic("boom at src/main.rs:1:1".into()).detail(),
            Some("boom at src/main.rs:1:1")
        );
        assert_eq!(ShutdownReason::Sigint.detail(), None);
    }
}
