use crate::{names::UnitId, Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Default renewal interval; leases are claimed for twice this long.
pub const DEFAULT_CLAIM_DURATION: Duration = Duration::from_secs(30);

/// Claim durations outside this range work but are unusual.
pub const RECOMMENDED_CLAIM_DURATION: (Duration, Duration) =
    (Duration::from_secs(10), Duration::from_secs(60));

/// Configuration for one unit's leadership tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// The unit trying to lead; its application is the lease target.
    pub unit_id: UnitId,

    /// Renewal interval `D`. Leases are requested for `2D` and renewed `D`
    /// before they expire.
    #[serde(with = "humantime_serde", default = "default_claim_duration")]
    pub claim_duration: Duration,
}

fn default_claim_duration() -> Duration {
    DEFAULT_CLAIM_DURATION
}

impl TrackerConfig {
    pub fn new(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            claim_duration: DEFAULT_CLAIM_DURATION,
        }
    }

    pub fn with_claim_duration(mut self, claim_duration: Duration) -> Self {
        self.claim_duration = claim_duration;
        self
    }

    /// Parse and validate a JSON config such as
    /// `{"unit_id": "mysql/0", "claim_duration": "30s"}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.claim_duration.is_zero() {
            return Err(TrackerError::InvalidConfig(
                "claim_duration must be greater than zero".to_owned(),
            ));
        }

        let (min, max) = RECOMMENDED_CLAIM_DURATION;
        if self.claim_duration < min || self.claim_duration > max {
            warn!(
                unit = %self.unit_id,
                claim_duration = ?self.claim_duration,
                "claim duration outside the recommended range of {min:?} to {max:?}"
            );
        }

        Ok(())
    }
}
