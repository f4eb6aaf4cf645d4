use crate::error::{CoreError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// UnitConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_stale_after() -> u64 {
    90
}

fn default_enabled() -> bool {
    true
}

impl UnitConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

// ---------------------------------------------------------------------------
// SupervisionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionConfig {
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,
    #[serde(default = "default_restart_base")]
    pub restart_base_secs: u64,
    #[serde(default = "default_restart_max")]
    pub restart_max_secs: u64,
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
}

fn default_health_interval() -> u64 {
    10
}

fn default_restart_base() -> u64 {
    5
}

fn default_restart_max() -> u64 {
    60
}

fn default_max_failures() -> u32 {
    5
}

fn default_grace_period() -> u64 {
    10
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            health_interval_secs: default_health_interval(),
            restart_base_secs: default_restart_base(),
            restart_max_secs: default_restart_max(),
            max_consecutive_failures: default_max_failures(),
            grace_period_secs: default_grace_period(),
        }
    }
}

impl SupervisionConfig {
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn restart_base(&self) -> Duration {
        Duration::from_secs(self.restart_base_secs)
    }

    pub fn restart_max(&self) -> Duration {
        Duration::from_secs(self.restart_max_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

// ---------------------------------------------------------------------------
// ApprovalConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_soft_deadline")]
    pub soft_deadline_secs: u64,
    #[serde(default = "default_hard_cutoff")]
    pub hard_cutoff_secs: u64,
}

fn default_soft_deadline() -> u64 {
    86_400
}

fn default_hard_cutoff() -> u64 {
    604_800
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            soft_deadline_secs: default_soft_deadline(),
            hard_cutoff_secs: default_hard_cutoff(),
        }
    }
}

impl ApprovalConfig {
    pub fn soft_deadline(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.soft_deadline_secs as i64)
    }

    pub fn hard_cutoff(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.hard_cutoff_secs as i64)
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub units: Vec<UnitConfig>,
    #[serde(default)]
    pub supervision: SupervisionConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            units: Vec::new(),
            supervision: SupervisionConfig::default(),
            queue: QueueConfig::default(),
            approval: ApprovalConfig::default(),
        }
    }
}

impl Config {
    pub fn unit(&self, name: &str) -> Option<&UnitConfig> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn enabled_units(&self) -> impl Iterator<Item = &UnitConfig> {
        self.units.iter().filter(|u| u.enabled)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(CoreError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        fn error(warnings: &mut Vec<ConfigWarning>, message: String) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            });
        }

        // 1. Every supervision interval must be a positive number of seconds
        let s = &self.supervision;
        for (field, value) in [
            ("supervision.health_interval_secs", s.health_interval_secs),
            ("supervision.restart_base_secs", s.restart_base_secs),
            ("supervision.restart_max_secs", s.restart_max_secs),
            ("supervision.grace_period_secs", s.grace_period_secs),
        ] {
            if value == 0 {
                error(&mut warnings, format!("{field} must be greater than zero"));
            }
        }
        if s.restart_max_secs < s.restart_base_secs {
            error(&mut warnings, format!(
                "supervision.restart_max_secs ({}) is below restart_base_secs ({})",
                s.restart_max_secs, s.restart_base_secs
            ));
        }
        if s.max_consecutive_failures == 0 {
            error(&mut warnings, "supervision.max_consecutive_failures must be at least 1".to_string());
        }

        // 2. Retry ceiling
        if self.queue.max_attempts == 0 {
            error(&mut warnings, "queue.max_attempts must be at least 1".to_string());
        }

        // 3. Approval deadlines: both positive, hard cutoff strictly after
        //    the soft deadline
        let a = &self.approval;
        if a.soft_deadline_secs == 0 {
            error(&mut warnings, "approval.soft_deadline_secs must be greater than zero".to_string());
        }
        if a.hard_cutoff_secs <= a.soft_deadline_secs {
            error(&mut warnings, format!(
                "approval.hard_cutoff_secs ({}) must exceed soft_deadline_secs ({})",
                a.hard_cutoff_secs, a.soft_deadline_secs
            ));
        }

        // 4. Unit names are unique valid slugs with a non-empty command
        let mut seen = std::collections::HashSet::new();
        for unit in &self.units {
            if paths::validate_slug(&unit.name).is_err() {
                error(&mut warnings, format!("unit name '{}' is not a valid slug", unit.name));
            }
            if !seen.insert(unit.name.as_str()) {
                error(&mut warnings, format!("duplicate unit name '{}'", unit.name));
            }
            if unit.command.trim().is_empty() {
                error(&mut warnings, format!("unit '{}' has an empty command", unit.name));
            }
            if unit.stale_after_secs == 0 {
                error(&mut warnings, format!(
                    "unit '{}': stale_after_secs must be greater than zero",
                    unit.name
                ));
            } else if unit.stale_after_secs < s.health_interval_secs {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "unit '{}': stale_after_secs ({}) is below the health interval ({}), \
                         staleness cannot be detected that fast",
                        unit.name, unit.stale_after_secs, s.health_interval_secs
                    ),
                });
            }
        }

        if self.units.iter().all(|u| !u.enabled) && !self.units.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "all units are disabled".to_string(),
            });
        }

        warnings
    }

    /// Validation as run at process startup: any error-level finding
    /// rejects the config outright.
    pub fn validate_strict(&self) -> Result<()> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Config(errors.join("; ")))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str) -> UnitConfig {
        UnitConfig {
            name: name.to_string(),
            command: "python3".to_string(),
            args: vec![format!("watchers/{name}.py")],
            stale_after_secs: 90,
            sensitive: false,
            enabled: true,
        }
    }

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.supervision.restart_base_secs, 5);
        assert_eq!(parsed.queue.max_attempts, 3);
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let yaml = "version: 1\nunits:\n  - name: gmail\n    command: python3\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.units.len(), 1);
        assert_eq!(cfg.units[0].stale_after_secs, 90);
        assert!(cfg.units[0].enabled);
        assert!(!cfg.units[0].sensitive);
        assert_eq!(cfg.supervision.health_interval_secs, 10);
        assert_eq!(cfg.approval.soft_deadline_secs, 86_400);
    }

    #[test]
    fn validate_default_config_clean() {
        let cfg = Config::default();
        assert!(cfg.validate().is_empty());
        cfg.validate_strict().unwrap();
    }

    #[test]
    fn validate_rejects_zero_intervals() {
        let mut cfg = Config::default();
        cfg.supervision.health_interval_secs = 0;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error
                && w.message.contains("health_interval_secs")));
        assert!(cfg.validate_strict().is_err());
    }

    #[test]
    fn validate_rejects_inverted_backoff_bounds() {
        let mut cfg = Config::default();
        cfg.supervision.restart_base_secs = 120;
        cfg.supervision.restart_max_secs = 60;
        assert!(cfg.validate_strict().is_err());
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let mut cfg = Config::default();
        cfg.queue.max_attempts = 0;
        assert!(cfg.validate_strict().is_err());
    }

    #[test]
    fn validate_rejects_hard_cutoff_before_soft_deadline() {
        let mut cfg = Config::default();
        cfg.approval.soft_deadline_secs = 604_800;
        cfg.approval.hard_cutoff_secs = 86_400;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("hard_cutoff_secs")));
        assert!(cfg.validate_strict().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_unit_names() {
        let mut cfg = Config::default();
        cfg.units.push(unit("gmail"));
        cfg.units.push(unit("gmail"));
        assert!(cfg.validate_strict().is_err());
    }

    #[test]
    fn validate_rejects_bad_unit_name() {
        let mut cfg = Config::default();
        cfg.units.push(unit("Not A Slug"));
        assert!(cfg.validate_strict().is_err());
    }

    #[test]
    fn validate_rejects_empty_command() {
        let mut cfg = Config::default();
        let mut u = unit("gmail");
        u.command = "  ".to_string();
        cfg.units.push(u);
        assert!(cfg.validate_strict().is_err());
    }

    #[test]
    fn validate_warns_on_fast_staleness() {
        let mut cfg = Config::default();
        let mut u = unit("gmail");
        u.stale_after_secs = 3;
        cfg.units.push(u);
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("staleness")));
        // Warning only, strict validation still passes
        cfg.validate_strict().unwrap();
    }

    #[test]
    fn load_missing_config_not_initialized() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::NotInitialized));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.units.push(unit("inbox"));
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.units.len(), 1);
        assert_eq!(loaded.unit("inbox").unwrap().command, "python3");
        assert!(loaded.unit("missing").is_none());
    }
}
