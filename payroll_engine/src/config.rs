//! Server configuration read from the environment.

use std::path::PathBuf;

pub const POLICY_DIR_VAR: &str = "PAYROLL_POLICY_DIR";
pub const BIND_ADDR_VAR: &str = "PAYROLL_BIND_ADDR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Directory holding policy JSON documents.
    pub policy_dir: PathBuf,
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            policy_dir: PathBuf::from("policies"),
            bind_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl ServerConfig {
    /// Reads `PAYROLL_POLICY_DIR` and `PAYROLL_BIND_ADDR`, falling back to
    /// `policies` and `127.0.0.1:3000`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            policy_dir: lookup(POLICY_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.policy_dir),
            bind_addr: lookup(BIND_ADDR_VAR).unwrap_or(defaults.bind_addr),
        }
    }
}
