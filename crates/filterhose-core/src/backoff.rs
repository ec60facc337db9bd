use std::time::Duration;

/// Network hiccups: linear, starting immediately.
pub const NETWORK_INITIAL: Duration = Duration::ZERO;
pub const NETWORK_MAX: Duration = Duration::from_millis(16_000);
pub const NETWORK_STEP: Duration = Duration::from_millis(250);

/// HTTP errors (503): exponential, starting at five seconds.
pub const HTTP_INITIAL: Duration = Duration::from_millis(5_000);
pub const HTTP_MAX: Duration = Duration::from_millis(320_000);

/// Rate limited (420): exponential, starting at a minute.
pub const RATE_LIMIT_INITIAL: Duration = Duration::from_millis(60_000);
pub const RATE_LIMIT_MAX: Duration = Duration::from_millis(320_000);

/// Failure class a backoff policy is dedicated to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackoffClass {
    Network,
    Http,
    RateLimit,
}

impl std::fmt::Display for BackoffClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => f.write_str("network"),
            Self::Http => f.write_str("http"),
            Self::RateLimit => f.write_str("rate-limit"),
        }
    }
}

/// How a policy advances after each consumed delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Add(Duration),
    Multiply(u32),
}

impl Step {
    fn apply(self, value: Duration) -> Duration {
        match self {
            Self::Add(delta) => value.saturating_add(delta),
            Self::Multiply(factor) => value.saturating_mul(factor),
        }
    }
}

/// A policy's next delay went past its ceiling. Terminal for that class.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{class} backoff exhausted: next delay {delay:?} exceeds maximum {max:?}")]
pub struct BackoffExhausted {
    pub class: BackoffClass,
    pub delay: Duration,
    pub max: Duration,
}

#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    class: BackoffClass,
    initial: Duration,
    current: Duration,
    max: Option<Duration>,
    step: Step,
}

impl BackoffPolicy {
    pub fn new(class: BackoffClass, initial: Duration, max: Option<Duration>, step: Step) -> Self {
        Self {
            class,
            initial,
            current: initial,
            max,
            step,
        }
    }

    pub fn network() -> Self {
        Self::new(
            BackoffClass::Network,
            NETWORK_INITIAL,
            Some(NETWORK_MAX),
            Step::Add(NETWORK_STEP),
        )
    }

    pub fn http() -> Self {
        Self::new(BackoffClass::Http, HTTP_INITIAL, Some(HTTP_MAX), Step::Multiply(2))
    }

    /// `max = None` never exhausts.
    pub fn rate_limit(max: Option<Duration>) -> Self {
        Self::new(BackoffClass::RateLimit, RATE_LIMIT_INITIAL, max, Step::Multiply(2))
    }

    pub fn class(&self) -> BackoffClass {
        self.class
    }

    /// The delay the next call to [`next`](Self::next) would hand out.
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Consume the current delay and advance by the step.
    ///
    /// Fails without advancing once the current value exceeds the maximum, so
    /// an exhausted policy stays exhausted until [`reset`](Self::reset).
    pub fn next(&mut self) -> Result<Duration, BackoffExhausted> {
        let value = self.current;
        if let Some(max) = self.max {
            if value > max {
                return Err(BackoffExhausted {
                    class: self.class,
                    delay: value,
                    max,
                });
            }
        }
        self.current = self.step.apply(value);
        Ok(value)
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// The three independent policies, one per failure class.
#[derive(Clone, Debug)]
pub struct BackoffSet {
    network: BackoffPolicy,
    http: BackoffPolicy,
    rate_limit: BackoffPolicy,
}

impl BackoffSet {
    pub fn new(rate_limit_max: Option<Duration>) -> Self {
        Self {
            network: BackoffPolicy::network(),
            http: BackoffPolicy::http(),
            rate_limit: BackoffPolicy::rate_limit(rate_limit_max),
        }
    }

    pub fn policy(&self, class: BackoffClass) -> &BackoffPolicy {
        match class {
            BackoffClass::Network => &self.network,
            BackoffClass::Http => &self.http,
            BackoffClass::RateLimit => &self.rate_limit,
        }
    }

    pub fn next(&mut self, class: BackoffClass) -> Result<Duration, BackoffExhausted> {
        match class {
            BackoffClass::Network => self.network.next(),
            BackoffClass::Http => self.http.next(),
            BackoffClass::RateLimit => self.rate_limit.next(),
        }
    }

    /// Called after every successful connection.
    pub fn reset(&mut self) {
        self.network.reset();
        self.http.reset();
        self.rate_limit.reset();
    }
}

impl Default for BackoffSet {
    fn default() -> Self {
        Self::new(Some(RATE_LIMIT_MAX))
    }
}
