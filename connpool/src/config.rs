//! Pool construction parameters.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_CONN: usize = 2;
const DEFAULT_MAX_IDLE: usize = 1;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(5);

/// Configuration for a [`PermissionPool`](crate::PermissionPool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of permissions checked out at once.
    pub max_conn: usize,
    /// Maximum number of released permissions kept for reuse.
    pub max_idle: usize,
    /// How long a caller waits on a saturated pool.
    #[serde(rename = "acquire_timeout_ms", with = "duration_ms")]
    pub acquire_timeout: Duration,
    /// Lifetime stamped on each permission. Informational only.
    #[serde(rename = "max_lifetime_ms", with = "duration_ms")]
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_conn: DEFAULT_MAX_CONN,
            max_idle: DEFAULT_MAX_IDLE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            max_lifetime: DEFAULT_MAX_LIFETIME,
        }
    }
}

impl PoolConfig {
    pub fn new(max_conn: usize, max_idle: usize) -> Self {
        Self {
            max_conn,
            max_idle,
            ..Self::default()
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Defaults overridden by `CONNPOOL_MAX_CONN`, `CONNPOOL_MAX_IDLE`,
    /// `CONNPOOL_ACQUIRE_TIMEOUT_MS` and `CONNPOOL_MAX_LIFETIME_MS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_conn: parse_or(&lookup, "CONNPOOL_MAX_CONN", defaults.max_conn),
            max_idle: parse_or(&lookup, "CONNPOOL_MAX_IDLE", defaults.max_idle),
            acquire_timeout: Duration::from_millis(parse_or(
                &lookup,
                "CONNPOOL_ACQUIRE_TIMEOUT_MS",
                as_millis_u64(defaults.acquire_timeout),
            )),
            max_lifetime: Duration::from_millis(parse_or(
                &lookup,
                "CONNPOOL_MAX_LIFETIME_MS",
                as_millis_u64(defaults.max_lifetime),
            )),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, %default, "Ignoring unparseable pool setting");
            default
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn as_millis_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Serde adapter storing a `Duration` as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::as_millis_u64;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(as_millis_u64(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_pool() {
        let config = PoolConfig::default();
        assert_eq!(config.max_conn, 2);
        assert_eq!(config.max_idle, 1);
        assert_eq!(config.acquire_timeout, Duration::from_secs(3));
        assert_eq!(config.max_lifetime, Duration::from_secs(5));
    }

    #[test]
    fn builder_overrides_durations() {
        let config = PoolConfig::new(8, 4)
            .with_acquire_timeout(Duration::from_millis(250))
            .with_max_lifetime(Duration::from_secs(60));
        assert_eq!(config.max_conn, 8);
        assert_eq!(config.max_idle, 4);
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));
        assert_eq!(config.max_lifetime, Duration::from_secs(60));
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = PoolConfig::from_lookup(lookup_from(&[
            ("CONNPOOL_MAX_CONN", "16"),
            ("CONNPOOL_MAX_IDLE", " 4 "),
            ("CONNPOOL_ACQUIRE_TIMEOUT_MS", "1500"),
        ]));
        assert_eq!(config.max_conn, 16);
        assert_eq!(config.max_idle, 4);
        assert_eq!(config.acquire_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_lifetime, Duration::from_secs(5));
    }

    #[test]
    fn unparseable_values_fall_back() {
        let config = PoolConfig::from_lookup(lookup_from(&[
            ("CONNPOOL_MAX_CONN", "lots"),
            ("CONNPOOL_MAX_LIFETIME_MS", "-1"),
        ]));
        assert_eq!(config, PoolConfig::default());
    }

    #[test]
    fn config_serializes_durations_as_millis() {
        insta::assert_json_snapshot!(PoolConfig::default(), @r#"
        {
          "max_conn": 2,
          "max_idle": 1,
          "acquire_timeout_ms": 3000,
          "max_lifetime_ms": 5000
        }
        "#);
    }

    #[test]
    fn huge_durations_saturate_instead_of_wrapping() {
        assert_eq!(as_millis_u64(Duration::MAX), u64::MAX);
        assert_eq!(as_millis_u64(Duration::from_millis(1500)), 1500);

        let config = PoolConfig::default().with_acquire_timeout(Duration::MAX);
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["acquire_timeout_ms"], u64::MAX);
    }

    #[test]
    fn config_deserializes_partial_json() {
        let config: PoolConfig =
            serde_json::from_str(r#"{"max_conn": 10, "acquire_timeout_ms": 100}"#).unwrap();
        assert_eq!(config.max_conn, 10);
        assert_eq!(config.max_idle, 1);
        assert_eq!(config.acquire_timeout, Duration::from_millis(100));
    }
}
