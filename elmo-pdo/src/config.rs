//! Sequencer tunables.
//!
//! Timing and failure policy for [`MotorController`](crate::MotorController), loadable
//! from TOML through serde.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ControllerError;

/// Firmware minimum between toggling motor enable and the next command.
pub const MIN_SETTLE_DELAY: Duration = Duration::from_millis(10);
/// Default settle delay, with margin over [`MIN_SETTLE_DELAY`].
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// How composite operations react to a failing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositePolicy {
    /// Run every step, report all failures. `set_limits` always succeeds.
    #[default]
    BestEffort,
    /// Stop at the first failing step and report it, `set_limits` included.
    Strict,
}

/// Tunables of the command sequencer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Pause after every MO command.
    #[serde(with = "millis")]
    pub settle_delay: Duration,
    /// Bound on waiting for a reply. `None` waits forever.
    #[serde(with = "opt_millis")]
    pub receive_timeout: Option<Duration>,
    pub policy: CompositePolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            receive_timeout: None,
            policy: CompositePolicy::BestEffort,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.settle_delay < MIN_SETTLE_DELAY {
            return Err(ControllerError::Config(format!(
                "settle delay {:?} is below the firmware minimum of {:?}",
                self.settle_delay, MIN_SETTLE_DELAY
            )));
        }
        if self.receive_timeout == Some(Duration::ZERO) {
            return Err(ControllerError::Config("receive timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_block_forever_and_settle_50ms() {
        let config = ControllerConfig::default();
        assert_eq!(config.settle_delay, Duration::from_millis(50));
        assert_eq!(config.receive_timeout, None);
        assert_eq!(config.policy, CompositePolicy::BestEffort);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn settle_delay_below_minimum_is_rejected() {
        let config = ControllerConfig {
            settle_delay: Duration::from_millis(5),
            ..ControllerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ControllerError::Config(_))));
    }

    #[test]
    fn parses_from_toml() {
        let config: ControllerConfig = toml::from_str(
            r#"
            settle_delay = 20
            receive_timeout = 250
            policy = "strict"
            "#,
        )
        .unwrap();
        assert_eq!(config.settle_delay, Duration::from_millis(20));
        assert_eq!(config.receive_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.policy, CompositePolicy::Strict);

        let partial: ControllerConfig = toml::from_str("").unwrap();
        assert_eq!(partial, ControllerConfig::default());
    }
}
