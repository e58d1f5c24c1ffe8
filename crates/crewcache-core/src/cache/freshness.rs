use std::collections::HashMap;

use chrono::Duration;
use tracing::warn;

use super::key::EntityKind;

/// How long user data is served without refetching.
/// Rosters change rarely within a session, but assignments do.
const USERS_WINDOW_SECS: i64 = 60;

/// How long project data is served without refetching.
const PROJECTS_WINDOW_SECS: i64 = 300;

/// Per-kind freshness windows. Kinds without a window are refetched on every
/// read that is not already covered by an in-flight fetch.
#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    windows: HashMap<EntityKind, Duration>,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        let mut windows = HashMap::new();
        windows.insert(EntityKind::Users, Duration::seconds(USERS_WINDOW_SECS));
        windows.insert(EntityKind::Projects, Duration::seconds(PROJECTS_WINDOW_SECS));
        Self { windows }
    }
}

impl FreshnessPolicy {
    /// Every kind refetches on each read.
    pub fn always_refetch() -> Self {
        Self {
            windows: HashMap::new(),
        }
    }

    pub fn window(&self, kind: EntityKind) -> Duration {
        self.windows.get(&kind).copied().unwrap_or_else(Duration::zero)
    }

    pub fn with_window(mut self, kind: EntityKind, window: Duration) -> Self {
        self.windows.insert(kind, window);
        self
    }

    /// Apply overrides keyed by kind name, in seconds. Unknown names are
    /// logged and skipped.
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a u64)>,
    {
        for (name, secs) in overrides {
            match EntityKind::from_name(name) {
                Some(kind) => {
                    let secs = i64::try_from(*secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
                    self.windows.insert(kind, Duration::seconds(secs));
                }
                None => warn!(kind = %name, "Unknown entity kind in freshness config"),
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_windows() {
        let policy = FreshnessPolicy::default();
        assert_eq!(policy.window(EntityKind::Users), Duration::seconds(60));
        assert_eq!(policy.window(EntityKind::Projects), Duration::seconds(300));
        assert_eq!(policy.window(EntityKind::Skills), Duration::zero());
        assert_eq!(policy.window(EntityKind::WorkLogs), Duration::zero());
    }

    #[test]
    fn test_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert("skills".to_string(), 120u64);
        overrides.insert("projects".to_string(), 0u64);
        overrides.insert("bogus".to_string(), 5u64);

        let policy = FreshnessPolicy::default().with_overrides(&overrides);
        assert_eq!(policy.window(EntityKind::Skills), Duration::seconds(120));
        assert_eq!(policy.window(EntityKind::Projects), Duration::zero());
        assert_eq!(policy.window(EntityKind::Users), Duration::seconds(60));
    }
}
