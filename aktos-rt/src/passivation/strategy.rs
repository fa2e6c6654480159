//! Passivation strategies.

// Layer 1: Standard library imports
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// Floor for the shared controller's tick resolution.
pub(crate) const MIN_RESOLUTION: Duration = Duration::from_millis(50);

/// Fallback tick when no registered strategy states a preference.
pub(crate) const DEFAULT_RESOLUTION: Duration = Duration::from_millis(500);

/// Idle statistics of a cell, as seen by passivation predicates.
#[derive(Debug, Clone, Copy)]
pub struct PassivationView {
    /// Time since the cell last accepted a user message.
    pub idle: Duration,
    /// Total user messages dispatched so far.
    pub message_count: u64,
    /// Time since the cell started.
    pub age: Duration,
}

/// When to evict an idle cell.
#[derive(Clone)]
pub enum PassivationStrategy {
    /// Never passivate.
    Disabled,
    /// Shut down after `idle` with no user messages.
    TimeBased { idle: Duration },
    /// Shut down once `max` user messages have been processed.
    MessageCount { max: u64 },
    /// Shut down at an absolute instant.
    Expiry { at: Instant },
    /// Custom predicate evaluated on the controller tick.
    Predicate {
        resolution: Duration,
        predicate: Arc<dyn Fn(&PassivationView) -> bool + Send + Sync>,
    },
    /// Conjunction: every child strategy must be due.
    AllOf(Vec<PassivationStrategy>),
    /// Disjunction: any child strategy being due suffices.
    AnyOf(Vec<PassivationStrategy>),
}

impl PassivationStrategy {
    pub fn disabled() -> Self {
        Self::Disabled
    }

    pub fn time_based(idle: Duration) -> Self {
        Self::TimeBased { idle }
    }

    pub fn message_count(max: u64) -> Self {
        Self::MessageCount { max }
    }

    pub fn expiry_at(at: Instant) -> Self {
        Self::Expiry { at }
    }

    pub fn predicate<F>(resolution: Duration, predicate: F) -> Self
    where
        F: Fn(&PassivationView) -> bool + Send + Sync + 'static,
    {
        Self::Predicate {
            resolution,
            predicate: Arc::new(predicate),
        }
    }

    pub fn all_of(strategies: Vec<PassivationStrategy>) -> Self {
        Self::AllOf(strategies)
    }

    pub fn any_of(strategies: Vec<PassivationStrategy>) -> Self {
        Self::AnyOf(strategies)
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// Whether the cell should be evicted given its current statistics.
    pub(crate) fn due(&self, view: &PassivationView, now: Instant) -> bool {
        match self {
            Self::Disabled => false,
            Self::TimeBased { idle } => view.idle >= *idle,
            Self::MessageCount { max } => view.message_count >= *max,
            Self::Expiry { at } => now >= *at,
            Self::Predicate { predicate, .. } => predicate(view),
            Self::AllOf(children) => {
                !children.is_empty() && children.iter().all(|s| s.due(view, now))
            }
            Self::AnyOf(children) => children.iter().any(|s| s.due(view, now)),
        }
    }

    /// Tick-resolution hint for the shared controller.
    pub(crate) fn resolution(&self) -> Option<Duration> {
        let hint = match self {
            Self::Disabled => return None,
            Self::TimeBased { idle } => *idle / 4,
            Self::MessageCount { .. } => Duration::from_millis(100),
            Self::Expiry { .. } => Duration::from_millis(250),
            Self::Predicate { resolution, .. } => *resolution,
            Self::AllOf(children) | Self::AnyOf(children) => {
                return children.iter().filter_map(|s| s.resolution()).min()
            }
        };
        Some(hint.clamp(MIN_RESOLUTION, Duration::from_secs(5)))
    }
}

impl fmt::Debug for PassivationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "Disabled"),
            Self::TimeBased { idle } => write!(f, "TimeBased({idle:?})"),
            Self::MessageCount { max } => write!(f, "MessageCount({max})"),
            Self::Expiry { at } => write!(f, "Expiry({at:?})"),
            Self::Predicate { resolution, .. } => write!(f, "Predicate({resolution:?})"),
            Self::AllOf(children) => write!(f, "AllOf({children:?})"),
            Self::AnyOf(children) => write!(f, "AnyOf({children:?})"),
        }
    }
}

impl Default for PassivationStrategy {
    fn default() -> Self {
        Self::Disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(idle_ms: u64, count: u64) -> PassivationView {
        PassivationView {
            idle: Duration::from_millis(idle_ms),
            message_count: count,
            age: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_disabled_never_due() {
        let strategy = PassivationStrategy::disabled();
        assert!(!strategy.due(&view(100_000, 100_000), Instant::now()));
        assert_eq!(strategy.resolution(), None);
    }

    #[test]
    fn test_time_based() {
        let strategy = PassivationStrategy::time_based(Duration::from_millis(500));
        assert!(!strategy.due(&view(100, 0), Instant::now()));
        assert!(strategy.due(&view(500, 0), Instant::now()));
    }

    #[test]
    fn test_message_count() {
        let strategy = PassivationStrategy::message_count(3);
        assert!(!strategy.due(&view(0, 2), Instant::now()));
        assert!(strategy.due(&view(0, 3), Instant::now()));
    }

    #[test]
    fn test_expiry() {
        let now = Instant::now();
        let strategy = PassivationStrategy::expiry_at(now + Duration::from_secs(60));
        assert!(!strategy.due(&view(0, 0), now));
        assert!(strategy.due(&view(0, 0), now + Duration::from_secs(61)));
    }

    #[test]
    fn test_predicate() {
        let strategy = PassivationStrategy::predicate(Duration::from_millis(100), |v| {
            v.message_count > 10 && v.idle > Duration::from_millis(50)
        });
        assert!(!strategy.due(&view(100, 5), Instant::now()));
        assert!(strategy.due(&view(100, 11), Instant::now()));
    }

    #[test]
    fn test_composites() {
        let both = PassivationStrategy::all_of(vec![
            PassivationStrategy::time_based(Duration::from_millis(100)),
            PassivationStrategy::message_count(5),
        ]);
        assert!(!both.due(&view(200, 2), Instant::now()));
        assert!(both.due(&view(200, 5), Instant::now()));

        let either = PassivationStrategy::any_of(vec![
            PassivationStrategy::time_based(Duration::from_millis(100)),
            PassivationStrategy::message_count(5),
        ]);
        assert!(either.due(&view(200, 2), Instant::now()));
        assert!(!either.due(&view(10, 2), Instant::now()));
    }

    #[test]
    fn test_empty_all_of_never_due() {
        let strategy = PassivationStrategy::all_of(vec![]);
        assert!(!strategy.due(&view(1_000_000, 1_000_000), Instant::now()));
    }

    #[test]
    fn test_resolution_hints() {
        let fine = PassivationStrategy::time_based(Duration::from_millis(100));
        assert_eq!(fine.resolution(), Some(MIN_RESOLUTION));

        let coarse = PassivationStrategy::time_based(Duration::from_secs(60));
        assert_eq!(coarse.resolution(), Some(Duration::from_secs(5)));

        let composite = PassivationStrategy::any_of(vec![
            PassivationStrategy::time_based(Duration::from_secs(60)),
            PassivationStrategy::message_count(5),
        ]);
        assert_eq!(composite.resolution(), Some(Duration::from_millis(100)));
    }
}
