//! Explicit connection context
//!
//! A [`Session`] is created once per process and shared read-only (behind
//! `Arc`) by every invoker that talks to the management server.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};
use uuid::Uuid;

use crate::config::Profile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Management server this session is bound to
    pub server: String,
    pub username: String,
    /// Address the server sees this client connecting from
    pub source_ip: IpAddr,
    pub session_key: String,
    pub established_at: DateTime<Utc>,
    /// TLS verification disabled
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub insecure: bool,
}

impl Session {
    /// Open a session against `server` for `username`
    pub fn establish(server: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            username: username.into(),
            source_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            session_key: new_session_key(),
            established_at: Utc::now(),
            insecure: false,
        }
    }

    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            insecure: profile.insecure,
            ..Self::establish(profile.endpoint.as_str(), profile.username.as_str())
        }
    }

    /// `user@server` label used in logs
    pub fn principal(&self) -> String {
        format!("{}@{}", self.username, self.server)
    }
}

/// Random v4 id as 32 lowercase hex characters
fn new_session_key() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_profile() {
        let profile = Profile {
            insecure: true,
            ..Profile::new("vcenter.lab.local", "administrator@vsphere.local")
        };
        let session = Session::from_profile(&profile);
        assert_eq!(session.server, "vcenter.lab.local");
        assert_eq!(session.principal(), "administrator@vsphere.local@vcenter.lab.local");
        assert!(session.insecure);
        assert_eq!(session.session_key.len(), 32);
    }

    #[test]
    fn test_session_keys_differ() {
        let a = Session::establish("vc", "root");
        let b = Session::establish("vc", "root");
        assert_ne!(a.session_key, b.session_key);
        assert!(
            a.session_key
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        );
    }
}
