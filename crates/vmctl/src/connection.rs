//! Connection management: profile -> session -> simulated fleet backend

use crate::error::{Result as CliResult, VmCtlError};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, trace};
use vmctl_core::config::{Config, ConfigError, Profile, TrackingConfig};
use vmctl_core::sim::SimulatedFleet;
use vmctl_core::{
    BatchExecutor, JsonLinesAuditLog, OperationTracker, ProgressCallback, Session,
    SubmissionLimiter,
};

/// Tracking settings given on the command line; each one beats the profile
#[derive(Debug, Clone, Default)]
pub struct TrackingOverrides {
    pub timeout_secs: Option<u64>,
    pub max_concurrency: Option<usize>,
    pub rate_limit: Option<u32>,
    pub retry_attempts: Option<u32>,
    pub audit_log: Option<String>,
}

impl TrackingOverrides {
    pub fn apply(&self, tracking: &mut TrackingConfig) {
        if let Some(secs) = self.timeout_secs {
            tracking.timeout_secs = secs;
        }
        if let Some(n) = self.max_concurrency {
            tracking.max_concurrency = n;
        }
        // A rate on the command line turns limiting on
        if let Some(rpm) = self.rate_limit {
            tracking.rate_limit.enabled = true;
            tracking.rate_limit.requests_per_minute = rpm;
        }
        if let Some(attempts) = self.retry_attempts {
            tracking.retry.max_attempts = attempts;
        }
        if let Some(path) = &self.audit_log {
            tracking.audit_log = Some(path.clone());
        }
    }
}

/// Connection manager resolving profiles into live connections
#[derive(Clone)]
pub struct ConnectionManager {
    pub config: Config,
    pub config_path: Option<PathBuf>,
}

impl ConnectionManager {
    /// Create a new connection manager with a custom config path
    pub fn with_config_path(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    /// Save the configuration to the appropriate location
    pub fn save_config(&self, config: &Config) -> CliResult<PathBuf> {
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => Config::config_path()?,
        };
        config
            .save_to_path(&path)
            .context("Failed to save configuration")?;
        Ok(path)
    }

    /// Where the configuration lives (explicit `--config-file` wins)
    pub fn display_config_path(&self) -> Option<String> {
        self.config_path
            .clone()
            .or_else(|| Config::config_path().ok())
            .map(|p| p.display().to_string())
    }

    /// Resolve the active profile and open a session for it
    pub fn establish_session(&self, profile_name: Option<&str>) -> CliResult<(String, &Profile, Session)> {
        let (name, profile) = self.config.active_profile(profile_name)?;
        info!("Using profile: {}", name);

        let session = Session::from_profile(profile);
        debug!("Session established for {}", session.principal());
        trace!(
            "Password: {}",
            if profile.resolve_password().is_some() {
                "configured"
            } else {
                "not set"
            }
        );
        if session.insecure {
            debug!("TLS certificate verification disabled");
        }

        Ok((name, profile, session))
    }

    /// Open a connection: session, inventory backend and effective tracking settings
    pub fn connect(
        &self,
        profile_name: Option<&str>,
        overrides: &TrackingOverrides,
    ) -> CliResult<Connection> {
        let (name, profile, session) = self.establish_session(profile_name)?;

        let inventory_path = profile
            .inventory_path()
            .ok_or_else(|| ConfigError::NoInventory {
                profile: name.clone(),
            })?;
        let session = Arc::new(session);
        let fleet = SimulatedFleet::load(&inventory_path)?.with_session(session.clone());
        info!(
            "Connected to {} ({} VMs in {})",
            session.server,
            fleet.len(),
            inventory_path.display()
        );

        let mut tracking = profile.tracking.clone();
        overrides.apply(&mut tracking);
        tracking.validate()?;
        debug!("Effective tracking settings: {:?}", tracking);

        Ok(Connection {
            profile: name,
            session,
            fleet: Arc::new(fleet),
            inventory_path,
            tracking,
        })
    }
}

/// A resolved profile bound to its backend
pub struct Connection {
    pub profile: String,
    pub session: Arc<Session>,
    pub fleet: Arc<SimulatedFleet>,
    pub inventory_path: PathBuf,
    pub tracking: TrackingConfig,
}

impl Connection {
    /// Batch executor wired with retry, audit, rate limiting and progress
    pub fn executor(&self, progress: Option<ProgressCallback>) -> CliResult<BatchExecutor> {
        let mut tracker = OperationTracker::new().with_retry(self.tracking.retry_policy());

        if let Some(path) = self.tracking.audit_log_path() {
            let audit = JsonLinesAuditLog::open(&path).map_err(|e| VmCtlError::FileError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            debug!("Auditing operations to {}", audit.path().display());
            tracker = tracker.with_audit(Arc::new(audit));
        }

        if let Some(callback) = progress {
            tracker = tracker.with_progress(callback);
        }

        let mut executor = BatchExecutor::new(tracker, self.tracking.batch_options());
        if let Some(limiter) = SubmissionLimiter::from_config(&self.tracking.rate_limit) {
            debug!(
                "Rate limiting submissions to {}/min",
                limiter.requests_per_minute()
            );
            executor = executor.with_rate_limiter(Arc::new(limiter));
        }
        Ok(executor)
    }

    /// Persist applied effects so the next invocation sees them
    pub fn save_inventory(&self) -> CliResult<()> {
        self.fleet.save(&self.inventory_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_beat_profile_settings() {
        let mut tracking = TrackingConfig::default();
        let overrides = TrackingOverrides {
            timeout_secs: Some(30),
            rate_limit: Some(60),
            ..Default::default()
        };
        overrides.apply(&mut tracking);

        assert_eq!(tracking.timeout_secs, 30);
        assert!(tracking.rate_limit.enabled);
        assert_eq!(tracking.rate_limit.requests_per_minute, 60);
        assert_eq!(tracking.max_concurrency, 10);
    }

    #[test]
    fn test_connect_without_inventory_fails() {
        let mut config = Config::default();
        config.set_profile("lab".to_string(), Profile::new("vc01", "ops"));
        let mgr = ConnectionManager::with_config_path(config, None);

        let err = mgr
            .connect(None, &TrackingOverrides::default())
            .err()
            .unwrap();
        assert!(matches!(err, VmCtlError::NoInventory { .. }));
    }

    #[test]
    fn test_connect_rejects_zero_concurrency_override() {
        let dir = tempfile::tempdir().unwrap();
        let inventory = dir.path().join("fleet.toml");
        std::fs::write(&inventory, "[[vm]]\nname = \"a\"\npower_state = \"powered_off\"\n")
            .unwrap();

        let mut profile = Profile::new("vc01", "ops");
        profile.inventory = Some(inventory.display().to_string());
        let mut config = Config::default();
        config.set_profile("lab".to_string(), profile);
        let mgr = ConnectionManager::with_config_path(config, None);

        let overrides = TrackingOverrides {
            max_concurrency: Some(0),
            ..Default::default()
        };
        assert!(mgr.connect(Some("lab"), &overrides).is_err());

        let conn = mgr.connect(Some("lab"), &TrackingOverrides::default()).unwrap();
        assert_eq!(conn.fleet.len(), 1);
        assert_eq!(conn.session.server, "vc01");
    }
}
