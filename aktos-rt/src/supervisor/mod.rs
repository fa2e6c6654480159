//! Supervision: mapping child failures to directives.
//!
//! A [`SupervisorStrategy`] is a pure rule list: the first matcher that
//! accepts the failure cause picks the [`Directive`], falling back to a
//! default. Restart counters live on the failing cell, not here, so one
//! strategy value can serve any number of children.

// Layer 1: Standard library imports
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::address::Address;

/// Default restart budget before a Restart directive degrades to Stop.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default window over which restarts are counted.
pub const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(30);

/// Boxed user-behavior error.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// What the supervisor tells a failed cell to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Keep the current state and continue with the next message.
    Resume,
    /// Re-initialize the actor (`post_stop` then `pre_start`), keeping the
    /// mailbox. Children are stopped first, post-order.
    Restart,
    /// Stop the cell; the parent is notified via `Terminated`.
    Stop,
    /// Re-raise the failure as the parent's own failure.
    Escalate,
}

impl Default for Directive {
    /// The conservative default: stop the failing actor.
    fn default() -> Self {
        Self::Stop
    }
}

/// Why a cell's behavior failed.
#[derive(Clone)]
pub enum FailureCause {
    /// `receive` (or a lifecycle hook) returned an error.
    Error(Arc<BoxError>),
    /// User code panicked; the dispatcher caught it.
    Panic(String),
    /// A child escalated its failure up the tree.
    Escalated { child: Address, message: String },
}

impl FailureCause {
    /// Human-readable description of the cause.
    pub fn message(&self) -> String {
        match self {
            Self::Error(err) => err.to_string(),
            Self::Panic(msg) => format!("panic: {msg}"),
            Self::Escalated { child, message } => {
                format!("escalated from {child}: {message}")
            }
        }
    }

    /// Typed view of the underlying error, when there is one.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Error(err) => {
                let inner: &(dyn Error + 'static) = &***err;
                inner.downcast_ref::<E>()
            }
            _ => None,
        }
    }
}

impl fmt::Debug for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FailureCause({})", self.message())
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Predicate over failure causes; first matching rule wins.
#[derive(Clone)]
pub enum ErrorMatcher {
    /// Matches every failure.
    Any,
    /// Matches panics only.
    Panics,
    /// Custom predicate over the cause; [`ErrorMatcher::of`] builds the
    /// typed-error variant of this.
    Predicate(Arc<dyn Fn(&FailureCause) -> bool + Send + Sync>),
}

impl ErrorMatcher {
    /// Matcher for a concrete error type returned by user behavior.
    pub fn of<E: Error + 'static>() -> Self {
        Self::Predicate(Arc::new(|cause| cause.downcast_ref::<E>().is_some()))
    }

    fn matches(&self, cause: &FailureCause) -> bool {
        match self {
            Self::Any => true,
            Self::Panics => matches!(cause, FailureCause::Panic(_)),
            Self::Predicate(p) => p(cause),
        }
    }
}

impl fmt::Debug for ErrorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "ErrorMatcher::Any"),
            Self::Panics => write!(f, "ErrorMatcher::Panics"),
            Self::Predicate(_) => write!(f, "ErrorMatcher::Predicate"),
        }
    }
}

#[derive(Debug, Clone)]
struct SupervisorRule {
    matcher: ErrorMatcher,
    directive: Directive,
}

/// Failure-handling policy for a cell.
///
/// # Example
/// ```rust
/// use aktos_rt::supervisor::{Directive, ErrorMatcher, SupervisorStrategy};
/// use std::time::Duration;
///
/// let strategy = SupervisorStrategy::new()
///     .with_rule(ErrorMatcher::Panics, Directive::Restart)
///     .with_fallback(Directive::Stop)
///     .with_max_retries(3)
///     .within(Duration::from_secs(10));
/// # let _ = strategy;
/// ```
#[derive(Debug, Clone)]
pub struct SupervisorStrategy {
    rules: Vec<SupervisorRule>,
    fallback: Directive,
    max_retries: u32,
    within: Duration,
}

impl SupervisorStrategy {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: Directive::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            within: DEFAULT_RETRY_WINDOW,
        }
    }

    /// Shorthand: apply one directive to every failure.
    pub fn on_any(directive: Directive) -> Self {
        Self::new().with_rule(ErrorMatcher::Any, directive)
    }

    /// Append a rule; earlier rules take precedence.
    pub fn with_rule(mut self, matcher: ErrorMatcher, directive: Directive) -> Self {
        self.rules.push(SupervisorRule { matcher, directive });
        self
    }

    /// Directive applied when no rule matches.
    pub fn with_fallback(mut self, directive: Directive) -> Self {
        self.fallback = directive;
        self
    }

    /// Restart budget: how many restarts are allowed within the window
    /// before the directive degrades to Stop.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Window over which restarts are counted.
    pub fn within(mut self, window: Duration) -> Self {
        self.within = window;
        self
    }

    /// Pick the directive for a failure: first matching rule, else fallback.
    pub fn decide(&self, cause: &FailureCause) -> Directive {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(cause))
            .map(|rule| rule.directive)
            .unwrap_or(self.fallback)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_window(&self) -> Duration {
        self.within
    }
}

impl Default for SupervisorStrategy {
    fn default() -> Self {
        Self::new()
    }
}
