//! Configuration management for vmctl
//!
//! Handles configuration loading from files and environment variables.
//! Configuration is stored in TOML format with support for multiple named profiles.

#[cfg(target_os = "macos")]
use directories::BaseDirs;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::{ConfigError, Result};
use super::tracking::TrackingConfig;

/// Environment variable consulted when a profile stores no password
pub const PASSWORD_ENV: &str = "VMCTL_PASSWORD";

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    /// Profile used when `--profile` is not given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
    /// Map of profile name -> profile configuration
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

/// Connection settings for one management server
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Profile {
    /// Management server host or URL
    pub endpoint: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Skip TLS verification
    #[serde(default)]
    pub insecure: bool,
    /// Inventory file backing the simulated fleet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<String>,
    #[serde(default, skip_serializing_if = "TrackingConfig::is_default")]
    pub tracking: TrackingConfig,
}

impl Profile {
    pub fn new(endpoint: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: None,
            insecure: false,
            inventory: None,
            tracking: TrackingConfig::default(),
        }
    }

    /// Check if this profile has a stored password
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Stored password, falling back to `VMCTL_PASSWORD`
    pub fn resolve_password(&self) -> Option<String> {
        self.password
            .clone()
            .or_else(|| std::env::var(PASSWORD_ENV).ok())
            .filter(|p| !p.is_empty())
    }

    /// Inventory file with `~` expanded
    pub fn inventory_path(&self) -> Option<PathBuf> {
        self.inventory
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
    }
}

impl Config {
    /// Resolve which profile to use
    ///
    /// Order: the explicit name, then `default_profile`, then the first
    /// profile alphabetically.
    pub fn resolve_profile(&self, explicit_profile: Option<&str>) -> Result<String> {
        if let Some(profile_name) = explicit_profile {
            return Ok(profile_name.to_string());
        }

        if let Some(ref default) = self.default_profile {
            return Ok(default.clone());
        }

        self.list_profiles()
            .first()
            .map(|(name, _)| name.to_string())
            .ok_or_else(|| ConfigError::NoProfiles {
                suggestion: "Use 'vmctl profile set' to create a profile.".to_string(),
            })
    }

    /// Look up a profile by name
    pub fn profile(&self, name: &str) -> Result<&Profile> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.to_string(),
            })
    }

    /// Resolve and look up in one step
    pub fn active_profile(&self, explicit_profile: Option<&str>) -> Result<(String, &Profile)> {
        let name = self.resolve_profile(explicit_profile)?;
        let profile = self.profile(&name)?;
        Ok((name, profile))
    }

    /// Load configuration from the standard location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::LoadError {
            path: config_path.display().to_string(),
            source: e,
        })?;

        // Expand environment variables in the config content
        let expanded_content = Self::expand_env_vars(&content);

        let config: Config = toml::from_str(&expanded_content)?;
        for profile in config.profiles.values() {
            profile.tracking.validate()?;
        }

        Ok(config)
    }

    /// Save configuration to the standard location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to_path(&config_path)
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        // Create parent directories if they don't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::SaveError {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let content = toml::to_string_pretty(self)?;

        fs::write(config_path, content).map_err(|e| ConfigError::SaveError {
            path: config_path.display().to_string(),
            source: e,
        })?;

        Ok(())
    }

    /// Set or update a profile
    pub fn set_profile(&mut self, name: String, profile: Profile) {
        self.profiles.insert(name, profile);
    }

    /// Remove a profile by name
    pub fn remove_profile(&mut self, name: &str) -> Option<Profile> {
        // Clear the default if this profile was it
        if self.default_profile.as_deref() == Some(name) {
            self.default_profile = None;
        }
        self.profiles.remove(name)
    }

    /// List all profiles sorted by name
    pub fn list_profiles(&self) -> Vec<(&String, &Profile)> {
        let mut profiles: Vec<_> = self.profiles.iter().collect();
        profiles.sort_by_key(|(name, _)| *name);
        profiles
    }

    /// Get the path to the configuration file
    ///
    /// On macOS, this supports both the standard macOS path and Linux-style ~/.config path:
    /// 1. Check ~/.config/vmctl/config.toml (Linux-style, preferred for consistency)
    /// 2. Fall back to ~/Library/Application Support/com.vmctl.vmctl/config.toml (macOS standard)
    ///
    /// On Linux: ~/.config/vmctl/config.toml
    /// On Windows: %APPDATA%\vmctl\vmctl\config.toml
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            if let Some(base_dirs) = BaseDirs::new() {
                let linux_style_path = base_dirs
                    .home_dir()
                    .join(".config")
                    .join("vmctl")
                    .join("config.toml");

                if linux_style_path.exists()
                    || linux_style_path
                        .parent()
                        .map(|p| p.exists())
                        .unwrap_or(false)
                {
                    return Ok(linux_style_path);
                }
            }
        }

        let proj_dirs =
            ProjectDirs::from("com", "vmctl", "vmctl").ok_or(ConfigError::ConfigDirError)?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Expand environment variables in configuration content
    ///
    /// Supports ${VAR} and ${VAR:-default} syntax. Unset variables without a
    /// default are left as written so profiles you are not using still load.
    ///
    /// Example:
    /// ```toml
    /// password = "${VCENTER_PASSWORD}"
    /// endpoint = "${VCENTER_HOST:-vcenter.lab.local}"
    /// ```
    pub(crate) fn expand_env_vars(content: &str) -> String {
        let expanded =
            shellexpand::env_with_context_no_errors(content, |var| std::env::var(var).ok());
        expanded.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lab_profile() -> Profile {
        Profile {
            password: Some("secret".to_string()),
            inventory: Some("~/lab/inventory.toml".to_string()),
            ..Profile::new("vcenter.lab.local", "administrator@vsphere.local")
        }
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.set_profile("lab".to_string(), lab_profile());
        config.default_profile = Some("lab".to_string());

        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(config.default_profile, deserialized.default_profile);
        assert_eq!(deserialized.profiles.get("lab"), Some(&lab_profile()));
        // default tracking settings are not written out
        assert!(!serialized.contains("tracking"));
    }

    #[test]
    fn test_profile_resolution_order() {
        let mut config = Config::default();
        assert!(matches!(
            config.resolve_profile(None),
            Err(ConfigError::NoProfiles { .. })
        ));

        config.set_profile("zeta".to_string(), lab_profile());
        config.set_profile("alpha".to_string(), lab_profile());
        assert_eq!(config.resolve_profile(None).unwrap(), "alpha");

        config.default_profile = Some("zeta".to_string());
        assert_eq!(config.resolve_profile(None).unwrap(), "zeta");
        assert_eq!(config.resolve_profile(Some("other")).unwrap(), "other");
    }

    #[test]
    fn test_active_profile_not_found() {
        let config = Config::default();
        let err = config.active_profile(Some("missing")).unwrap_err();
        assert!(matches!(err, ConfigError::ProfileNotFound { .. }));
        assert_eq!(err.to_string(), "Profile 'missing' not found");
    }

    #[test]
    fn test_remove_profile_clears_default() {
        let mut config = Config::default();
        config.set_profile("lab".to_string(), lab_profile());
        config.default_profile = Some("lab".to_string());

        assert!(config.remove_profile("lab").is_some());
        assert!(config.default_profile.is_none());
        assert!(config.remove_profile("lab").is_none());
    }

    #[test]
    fn test_inventory_path_expands_tilde() {
        let path = lab_profile().inventory_path().unwrap();
        assert!(!path.to_string_lossy().starts_with('~'));
        assert!(path.ends_with("lab/inventory.toml"));
    }

    #[test]
    #[serial_test::serial]
    fn test_password_falls_back_to_env() {
        let mut profile = lab_profile();
        unsafe {
            std::env::set_var(PASSWORD_ENV, "from-env");
        }
        assert_eq!(profile.resolve_password().as_deref(), Some("secret"));

        profile.password = None;
        assert_eq!(profile.resolve_password().as_deref(), Some("from-env"));

        unsafe {
            std::env::remove_var(PASSWORD_ENV);
        }
        assert_eq!(profile.resolve_password(), None);
    }

    #[test]
    #[serial_test::serial]
    fn test_env_var_expansion() {
        unsafe {
            std::env::set_var("TEST_VCENTER_HOST", "vc01.example.com");
            std::env::remove_var("TEST_VCENTER_MISSING");
        }

        let content = r#"
[profiles.test]
endpoint = "${TEST_VCENTER_HOST}"
username = "${TEST_VCENTER_MISSING:-root}"
password = "${TEST_VCENTER_MISSING}"
"#;

        let expanded = Config::expand_env_vars(content);
        assert!(expanded.contains("vc01.example.com"));
        assert!(expanded.contains("username = \"root\""));
        assert!(expanded.contains("${TEST_VCENTER_MISSING}"));

        unsafe {
            std::env::remove_var("TEST_VCENTER_HOST");
        }
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("absent.toml")).unwrap();
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_load_rejects_invalid_tracking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[profiles.lab]
endpoint = "vc"
username = "root"

[profiles.lab.tracking]
max_concurrency = 0
"#,
        )
        .unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
