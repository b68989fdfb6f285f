//! Capability tokens handed out by the pool.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::duration_ms;

/// Marker carried by every granted permission.
pub const GRANTED: &str = "PASSED";

/// Identifier of one granted unit of capacity.
///
/// Allocated from a per-pool monotonic counter, so ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PermissionId(u64);

impl PermissionId {
    pub fn new(index: u64) -> Self {
        Self(index)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PermissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The right to use one unit of pooled capacity until released.
///
/// A permission is a plain value, not a handle: it borrows nothing from the
/// pool and the pool keeps no record of who holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Permission {
    id: PermissionId,
    content: String,
    created_at: DateTime<Utc>,
    /// Carried for consumers; the pool never expires permissions.
    #[serde(rename = "max_lifetime_ms", with = "duration_ms")]
    max_lifetime: Duration,
}

impl Permission {
    pub(crate) fn granted(id: PermissionId, max_lifetime: Duration) -> Self {
        Self {
            id,
            content: GRANTED.to_string(),
            created_at: Utc::now(),
            max_lifetime,
        }
    }

    pub fn id(&self) -> PermissionId {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_granted(&self) -> bool {
        self.content == GRANTED
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn max_lifetime(&self) -> Duration {
        self.max_lifetime
    }

    /// Wall-clock time since the permission was minted.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granted_permission_carries_marker_and_lifetime() {
        let permission = Permission::granted(PermissionId::new(7), Duration::from_secs(5));
        assert_eq!(permission.id(), PermissionId::new(7));
        assert_eq!(permission.content(), "PASSED");
        assert!(permission.is_granted());
        assert_eq!(permission.max_lifetime(), Duration::from_secs(5));
        assert!(permission.created_at() <= Utc::now());
    }

    #[test]
    fn age_is_never_negative() {
        let permission = Permission {
            id: PermissionId::new(1),
            content: GRANTED.to_string(),
            // Clock skew: a timestamp slightly in the future.
            created_at: Utc::now() + chrono::TimeDelta::seconds(60),
            max_lifetime: Duration::from_secs(5),
        };
        assert_eq!(permission.age(), Duration::ZERO);
    }

    #[test]
    fn permission_id_displays_as_number() {
        assert_eq!(PermissionId::new(42).to_string(), "42");
        assert_eq!(PermissionId::new(42).get(), 42);
    }

    #[test]
    fn permission_serializes_with_millisecond_lifetime() {
        let permission = Permission::granted(PermissionId::new(3), Duration::from_millis(5000));
        let value = serde_json::to_value(&permission).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["content"], "PASSED");
        assert_eq!(value["max_lifetime_ms"], 5000);
        assert!(value["created_at"].is_string());
    }
}
