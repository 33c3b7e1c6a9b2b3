use std::time::Duration;

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Serialize, Serializer};

use crate::actions::ActionPlan;
use crate::error::{Error, Result};
use crate::extract::FollowUpPolicy;

/// When a run ends on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBound {
    /// Each worker stops this long after it started.
    #[serde(serialize_with = "ser_millis")]
    Duration(Duration),
    /// The whole run stops after this many requests (follow-ups included).
    Requests(u64),
}

impl StopBound {
    pub fn duration(self) -> Option<Duration> {
        match self {
            Self::Duration(d) => Some(d),
            Self::Requests(_) => None,
        }
    }

    pub fn requests(self) -> Option<u64> {
        match self {
            Self::Duration(_) => None,
            Self::Requests(n) => Some(n),
        }
    }
}

/// Pause between consecutive requests of one worker, drawn uniformly from `min..=max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DelayRange {
    #[serde(rename = "min_ms", serialize_with = "ser_millis")]
    pub min: Duration,
    #[serde(rename = "max_ms", serialize_with = "ser_millis")]
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(Error::InvalidDelayRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn sample(&self, rng: &mut StdRng) -> Duration {
        if self.min >= self.max {
            return self.min;
        }
        rng.random_range(self.min..=self.max)
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(100),
            max: Duration::from_millis(500),
        }
    }
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Immutable description of one run. Shared by every worker.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub target: String,
    pub workers: u64,
    pub stop: StopBound,
    pub plan: ActionPlan,
    pub delay: DelayRange,
    #[serde(rename = "timeout_ms", serialize_with = "ser_millis")]
    pub timeout: Duration,
    pub follow_up: FollowUpPolicy,
    /// How long stopped workers get to finish before they are aborted.
    #[serde(rename = "grace_ms", serialize_with = "ser_millis")]
    pub grace: Duration,
    #[serde(skip)]
    pub progress_interval: Duration,
    pub health_check: bool,
}

impl RunConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            workers: 10,
            stop: StopBound::Duration(Duration::from_secs(30)),
            plan: ActionPlan::default(),
            delay: DelayRange::default(),
            timeout: DEFAULT_TIMEOUT,
            follow_up: FollowUpPolicy::default(),
            grace: DEFAULT_GRACE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            health_check: true,
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: u64) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_stop(mut self, stop: StopBound) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub fn with_plan(mut self, plan: ActionPlan) -> Self {
        self.plan = plan;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: DelayRange) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_follow_up(mut self, follow_up: FollowUpPolicy) -> Self {
        self.follow_up = follow_up;
        self
    }

    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    #[must_use]
    pub fn with_health_check(mut self, enabled: bool) -> Self {
        self.health_check = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let parsed =
            url::Url::parse(&self.target).map_err(|_| Error::InvalidTarget(self.target.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(Error::InvalidTarget(self.target.clone()));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidTimeout);
        }
        if self.delay.min > self.delay.max {
            return Err(Error::InvalidDelayRange {
                min: self.delay.min,
                max: self.delay.max,
            });
        }
        self.follow_up.validate()?;
        self.plan.validate()?;
        Ok(())
    }
}

fn ser_millis<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use rand::SeedableRng;

    #[test]
    fn defaults_are_valid() {
        assert!(RunConfig::new("http://localhost").validate().is_ok());
    }

    #[test]
    fn rejects_bad_target() {
        for target in ["localhost", "ftp://x", "", "http://"] {
            assert!(
                matches!(
                    RunConfig::new(target).validate(),
                    Err(Error::InvalidTarget(_))
                ),
                "{target}"
            );
        }
    }

    #[test]
    fn rejects_zero_timeout() {
        let cfg = RunConfig::new("http://localhost").with_timeout(Duration::ZERO);
        assert!(matches!(cfg.validate(), Err(Error::InvalidTimeout)));
    }

    #[test]
    fn delay_range_checks_order_and_samples_inside() {
        assert!(DelayRange::new(Duration::from_millis(5), Duration::from_millis(1)).is_err());

        let range = DelayRange::new(Duration::from_millis(100), Duration::from_millis(500)).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..500 {
            let d = range.sample(&mut rng);
            assert!(d >= range.min && d <= range.max, "{d:?}");
        }

        let fixed = DelayRange::fixed(Duration::from_millis(250));
        assert_eq!(fixed.sample(&mut rng), Duration::from_millis(250));
    }

    #[test]
    fn serializes_durations_as_millis() {
        let cfg = RunConfig::new("http://localhost")
            .with_stop(StopBound::Duration(Duration::from_secs(2)))
            .with_timeout(Duration::from_millis(1500));
        let v = serde_json::to_value(&cfg).unwrap();
        assert_eq!(v["timeout_ms"], 1500);
        assert_eq!(v["stop"]["duration"], 2000);
        assert_eq!(v["delay"]["min_ms"], 100);
        assert_eq!(v["follow_up"]["probability"], 0.3);
    }
}
