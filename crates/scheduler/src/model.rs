use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Dispatch priority. Bands are served strictly: every `High` entry leaves
/// before any `Medium` one, and so on.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn index(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" | "normal" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// How the wait between attempts grows.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles after each failure, never exceeding `cap`.
    Exponential { cap: Duration },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryOpt {
    /// Retries after the first attempt; `max = 2` allows three invocations.
    pub max: u32,
    pub backoff: Duration,
    pub strategy: Backoff,
}

impl RetryOpt {
    pub fn none() -> Self {
        Self {
            max: 0,
            backoff: Duration::ZERO,
            strategy: Backoff::Fixed,
        }
    }

    pub fn fixed(max: u32, delay: Duration) -> Self {
        Self {
            max,
            backoff: delay,
            strategy: Backoff::Fixed,
        }
    }

    pub fn exponential(max: u32, initial: Duration, cap: Duration) -> Self {
        Self {
            max,
            backoff: initial,
            strategy: Backoff::Exponential { cap },
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.strategy {
            Backoff::Fixed => self.backoff,
            Backoff::Exponential { cap } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.backoff.saturating_mul(factor).min(cap)
            }
        }
    }
}

impl Default for RetryOpt {
    fn default() -> Self {
        Self::fixed(2, Duration::from_millis(300))
    }
}
