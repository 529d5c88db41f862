use crate::port::TargetHandle;
use crate::selector::Strategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Defaults if a plan does not carry its own policy
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_millis(500);
const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(5);

/// What to do with the bound target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Click,
    Type(String),
    /// Read the visible text, or an attribute.
    Read { attribute: Option<String> },
    /// Read every element the first productive strategy yields.
    ReadAll { attribute: Option<String> },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::Type(_) => "type",
            Action::Read { .. } => "read",
            Action::ReadAll { .. } => "read_all",
        }
    }
}

/// Delay between attempts: `initial * multiplier^(n-1)` before retry `n`,
/// capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Backoff {
    pub initial: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl Backoff {
    pub fn none() -> Self {
        Self {
            initial: Duration::ZERO,
            multiplier: 1.0,
            max: Duration::ZERO,
        }
    }

    /// Delay before the `retry`-th retry (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        if retry == 0 || self.initial.is_zero() || self.max.is_zero() {
            return Duration::ZERO;
        }
        // Cap in f64 seconds; the uncapped product overflows Duration.
        let multiplier = if self.multiplier.is_finite() {
            self.multiplier.max(1.0)
        } else {
            1.0
        };
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_secs = self.max.as_secs_f64();
        let secs = self.initial.as_secs_f64() * multiplier.powi(exponent);
        if secs.is_nan() || secs >= max_secs {
            return self.max;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: DEFAULT_BACKOFF_INITIAL,
            multiplier: 2.0,
            max: DEFAULT_BACKOFF_MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub per_attempt_timeout: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, per_attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            per_attempt_timeout,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_ATTEMPT_TIMEOUT)
    }
}

/// Ordered alternative ways to reach one semantic target, plus what to do
/// with it. Strategies go most specific first, most generic last, and are
/// always tried in the declared order.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionPlan {
    pub label: String,
    pub strategies: Vec<Strategy>,
    pub action: Action,
    pub retry: RetryPolicy,
    pub within: Option<TargetHandle>,
}

impl ActionPlan {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            strategies: Vec::new(),
            action,
            retry: RetryPolicy::default(),
            within: None,
        }
    }

    pub fn click(label: impl Into<String>) -> Self {
        Self::new(label, Action::Click)
    }

    pub fn type_text(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(label, Action::Type(text.into()))
    }

    pub fn read(label: impl Into<String>) -> Self {
        Self::new(label, Action::Read { attribute: None })
    }

    pub fn read_all(label: impl Into<String>) -> Self {
        Self::new(label, Action::ReadAll { attribute: None })
    }

    /// Append one strategy to the end of the list.
    pub fn strategy(mut self, strategy: impl Into<Strategy>) -> Self {
        self.strategies.push(strategy.into());
        self
    }

    pub fn strategies<I, S>(mut self, strategies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Strategy>,
    {
        self.strategies.extend(strategies.into_iter().map(Into::into));
        self
    }

    /// Scope every strategy to a parent target.
    pub fn within(mut self, parent: TargetHandle) -> Self {
        self.within = Some(parent);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        let name = Some(name.into());
        match &mut self.action {
            Action::Read { attribute } | Action::ReadAll { attribute } => *attribute = name,
            _ => {}
        }
        self
    }
}
