use std::fs;
use std::path::Path;

use chrono::{Duration, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Review rules for edits. Every field has a default, so a config file only
/// needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Votes needed to resolve an edit before its voting period ends.
    /// Zero disables vote-driven resolution.
    pub vote_application_threshold: u32,
    pub voting_period_secs: u64,
    /// Minimum age before a destructive edit may resolve on votes, and the
    /// shortened window once an edit has reached the vote threshold.
    pub min_destructive_voting_period_secs: u64,
    pub edit_update_limit: u32,
    /// Accepted edits after which a user is granted the vote role.
    pub vote_promotion_threshold: Option<u32>,
    pub auto_apply_creates: bool,
    /// Tag edits require the `edit_tags` role.
    pub require_tag_role: bool,
    /// Zero keeps moderator audits forever.
    pub mod_audit_retention_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vote_application_threshold: 3,
            voting_period_secs: 345_600,
            min_destructive_voting_period_secs: 172_800,
            edit_update_limit: 1,
            vote_promotion_threshold: None,
            auto_apply_creates: true,
            require_tag_role: false,
            mod_audit_retention_days: 0,
        }
    }
}

impl EngineConfig {
    /// Saturates at [`TimeDelta::MAX`] for periods too long to represent;
    /// [`EngineConfig::validate`] rejects those.
    pub fn voting_period(&self) -> Duration {
        period(self.voting_period_secs).unwrap_or(TimeDelta::MAX)
    }

    pub fn min_destructive_voting_period(&self) -> Duration {
        period(self.min_destructive_voting_period_secs).unwrap_or(TimeDelta::MAX)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        for (key, secs) in [
            ("voting_period_secs", self.voting_period_secs),
            ("min_destructive_voting_period_secs", self.min_destructive_voting_period_secs),
        ] {
            if period(secs).is_none() {
                return Err(CoreError::Config(format!("{key} out of range: {secs}")));
            }
        }
        Ok(())
    }

    pub fn from_toml(contents: &str) -> Result<Self, CoreError> {
        let config: Self = toml::from_str(contents).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` if it exists, then applies `QUORUM_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .map_err(|e| CoreError::Config(format!("failed to read {}: {e}", path.display())))?;
            Self::from_toml(&contents)
                .map_err(|e| CoreError::Config(format!("failed to parse {}: {e}", path.display())))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
        where
            T::Err: std::fmt::Display,
        {
            let raw = lookup(key)?;
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<T>() {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!("invalid {key}, ignoring: {err}");
                    None
                }
            }
        }

        fn parsed_period(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
            let secs = parsed::<u64>(lookup, key)?;
            if period(secs).is_none() {
                tracing::warn!("invalid {key}, ignoring: {secs} seconds is out of range");
                return None;
            }
            Some(secs)
        }

        if let Some(v) = parsed(&lookup, "QUORUM_VOTE_APPLICATION_THRESHOLD") {
            self.vote_application_threshold = v;
        }
        if let Some(v) = parsed_period(&lookup, "QUORUM_VOTING_PERIOD_SECS") {
            self.voting_period_secs = v;
        }
        if let Some(v) = parsed_period(&lookup, "QUORUM_MIN_DESTRUCTIVE_VOTING_PERIOD_SECS") {
            self.min_destructive_voting_period_secs = v;
        }
        if let Some(v) = parsed(&lookup, "QUORUM_EDIT_UPDATE_LIMIT") {
            self.edit_update_limit = v;
        }
        if let Some(v) = parsed(&lookup, "QUORUM_VOTE_PROMOTION_THRESHOLD") {
            self.vote_promotion_threshold = Some(v);
        }
        if let Some(v) = parsed(&lookup, "QUORUM_AUTO_APPLY_CREATES") {
            self.auto_apply_creates = v;
        }
        if let Some(v) = parsed(&lookup, "QUORUM_REQUIRE_TAG_ROLE") {
            self.require_tag_role = v;
        }
        if let Some(v) = parsed(&lookup, "QUORUM_MOD_AUDIT_RETENTION_DAYS") {
            self.mod_audit_retention_days = v;
        }
    }
}

fn period(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(TimeDelta::try_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml("vote_application_threshold = 5\n").unwrap();
        assert_eq!(config.vote_application_threshold, 5);
        assert_eq!(config.edit_update_limit, 1);
        assert_eq!(config.voting_period(), Duration::days(4));
        assert_eq!(config.min_destructive_voting_period(), Duration::days(2));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = EngineConfig::from_toml("vote_application_threshold = \"many\"").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("quorum.toml")).unwrap();
        assert_eq!(config.vote_application_threshold, EngineConfig::default().vote_application_threshold);
    }

    #[test]
    fn file_values_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quorum.toml");
        fs::write(&path, "edit_update_limit = 3\nvote_promotion_threshold = 10\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.edit_update_limit, 3);
        assert_eq!(config.vote_promotion_threshold, Some(10));
    }

    #[test]
    fn overrides_apply_and_bad_values_are_ignored() {
        let env: HashMap<&str, &str> = [
            ("QUORUM_VOTE_APPLICATION_THRESHOLD", "0"),
            ("QUORUM_EDIT_UPDATE_LIMIT", "lots"),
            ("QUORUM_AUTO_APPLY_CREATES", "false"),
            ("QUORUM_REQUIRE_TAG_ROLE", "true"),
            ("QUORUM_MOD_AUDIT_RETENTION_DAYS", "90"),
            ("QUORUM_VOTING_PERIOD_SECS", "9000000000000000000"),
        ]
        .into_iter()
        .collect();
        let mut config = EngineConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.vote_application_threshold, 0);
        assert_eq!(config.edit_update_limit, 1);
        assert!(!config.auto_apply_creates);
        assert!(config.require_tag_role);
        assert_eq!(config.mod_audit_retention_days, 90);
        assert_eq!(config.voting_period_secs, EngineConfig::default().voting_period_secs);
    }

    #[test]
    fn out_of_range_periods_are_rejected() {
        let err = EngineConfig::from_toml("voting_period_secs = 9000000000000000000").unwrap_err();
        assert!(matches!(err, CoreError::Config(msg) if msg.contains("voting_period_secs")));
        let err = EngineConfig::from_toml("min_destructive_voting_period_secs = 18446744073709551615").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));

        // Built in code, the accessors saturate instead of panicking.
        let config = EngineConfig { voting_period_secs: u64::MAX, ..Default::default() };
        assert!(config.validate().is_err());
        assert_eq!(config.voting_period(), TimeDelta::MAX);
    }
}
