use std::fs;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use vmctl_core::config::{Config, ConfigError, Profile};

/// Returns true if running as root (euid == 0). Used to skip permission tests.
#[cfg(unix)]
fn is_root() -> bool {
    // Use `id -u` to check the effective user ID without depending on libc.
    std::process::Command::new("id")
        .arg("-u")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim() == "0")
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// 1. Missing config directory / nonexistent path
// ---------------------------------------------------------------------------

#[test]
fn load_from_nonexistent_path_returns_default_config() {
    let path = PathBuf::from("/tmp/vmctl-test-nonexistent/does/not/exist/config.toml");
    assert!(!path.exists());

    let config = Config::load_from_path(&path).expect("should not error on missing path");

    assert!(config.profiles.is_empty());
    assert!(config.default_profile.is_none());
}

// ---------------------------------------------------------------------------
// 2. Empty config file
// ---------------------------------------------------------------------------

#[test]
fn load_empty_config_file_returns_default_config() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, "").unwrap();

    let config = Config::load_from_path(&config_path).expect("empty file should parse as default");

    assert!(config.profiles.is_empty());
    assert!(config.default_profile.is_none());
}

// ---------------------------------------------------------------------------
// 3. Corrupt / invalid TOML
// ---------------------------------------------------------------------------

#[test]
fn load_corrupt_toml_returns_parse_error() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, "[[[broken").unwrap();

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
    assert!(err.to_string().contains("parse"), "{err}");
}

// ---------------------------------------------------------------------------
// 4. Profile missing required fields
// ---------------------------------------------------------------------------

#[test]
fn load_profile_missing_required_fields_returns_error() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");

    // endpoint is present, username is not
    let content = r#"
[profiles.broken]
endpoint = "vcenter.lab.local"
"#;
    fs::write(&config_path, content).unwrap();

    assert!(
        Config::load_from_path(&config_path).is_err(),
        "incomplete profile should produce an error"
    );
}

// ---------------------------------------------------------------------------
// 5. Config with unknown / extra fields
// ---------------------------------------------------------------------------

#[test]
fn load_config_with_unknown_fields_ignores_them() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");

    let content = r#"
unknown_top_level_key = "hello"

[profiles.lab]
endpoint = "vcenter.lab.local"
username = "root"
totally_unknown_field = true
"#;
    fs::write(&config_path, content).unwrap();

    let config =
        Config::load_from_path(&config_path).expect("unknown fields should be silently ignored");

    assert!(config.profiles.contains_key("lab"));
}

// ---------------------------------------------------------------------------
// 6. Tracking table round trip
// ---------------------------------------------------------------------------

#[test]
fn save_and_reload_preserves_tracking_overrides() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("nested").join("config.toml");

    let mut profile = Profile::new("vc01.example.com", "ops");
    profile.inventory = Some("/srv/inventory.toml".to_string());
    profile.tracking.timeout_secs = 45;
    profile.tracking.retry.max_attempts = 6;
    profile.tracking.rate_limit.enabled = true;
    profile.tracking.audit_log = Some("/var/log/vmctl/audit.jsonl".to_string());

    let mut config = Config::default();
    config.set_profile("prod".to_string(), profile.clone());
    config.default_profile = Some("prod".to_string());
    config.save_to_path(&config_path).unwrap();

    let reloaded = Config::load_from_path(&config_path).unwrap();
    assert_eq!(reloaded.default_profile.as_deref(), Some("prod"));
    assert_eq!(reloaded.profiles.get("prod"), Some(&profile));
}

#[test]
fn missing_tracking_table_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        "[profiles.lab]\nendpoint = \"vc\"\nusername = \"root\"\n",
    )
    .unwrap();

    let config = Config::load_from_path(&config_path).unwrap();
    let (name, profile) = config.active_profile(None).unwrap();
    assert_eq!(name, "lab");
    assert!(profile.tracking.is_default());
    assert_eq!(profile.tracking.max_concurrency, 10);
}

// ---------------------------------------------------------------------------
// 7. Environment expansion during load
// ---------------------------------------------------------------------------

#[test]
#[serial_test::serial]
fn load_expands_environment_variables() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
[profiles.lab]
endpoint = "${VMCTL_EDGE_HOST:-vcenter.default.local}"
username = "${VMCTL_EDGE_USER}"
"#,
    )
    .unwrap();

    unsafe {
        std::env::remove_var("VMCTL_EDGE_HOST");
        std::env::set_var("VMCTL_EDGE_USER", "svc-vmctl");
    }

    let config = Config::load_from_path(&config_path).unwrap();
    let profile = config.profile("lab").unwrap();
    assert_eq!(profile.endpoint, "vcenter.default.local");
    assert_eq!(profile.username, "svc-vmctl");

    unsafe {
        std::env::remove_var("VMCTL_EDGE_USER");
    }
}

// ---------------------------------------------------------------------------
// 8. Permission errors (unix only)
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn load_unreadable_file_returns_clear_error() {
    use std::os::unix::fs::PermissionsExt;

    // Skip if running as root (permissions won't be enforced)
    if is_root() {
        eprintln!("skipping test: running as root");
        return;
    }

    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, "# valid toml").unwrap();

    fs::set_permissions(&config_path, fs::Permissions::from_mode(0o000)).unwrap();

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(matches!(err, ConfigError::LoadError { .. }), "{err}");

    // Restore permissions so TempDir cleanup can remove the file
    fs::set_permissions(&config_path, fs::Permissions::from_mode(0o644)).unwrap();
}

#[cfg(unix)]
#[test]
fn save_to_readonly_directory_returns_clear_error() {
    use std::os::unix::fs::PermissionsExt;

    if is_root() {
        eprintln!("skipping test: running as root");
        return;
    }

    let dir = TempDir::new().unwrap();
    let readonly_dir = dir.path().join("readonly");
    fs::create_dir(&readonly_dir).unwrap();
    fs::set_permissions(&readonly_dir, fs::Permissions::from_mode(0o444)).unwrap();

    let config_path = readonly_dir.join("config.toml");
    let err = Config::default().save_to_path(&config_path).unwrap_err();
    assert!(matches!(err, ConfigError::SaveError { .. }), "{err}");

    fs::set_permissions(&readonly_dir, fs::Permissions::from_mode(0o755)).unwrap();
}
