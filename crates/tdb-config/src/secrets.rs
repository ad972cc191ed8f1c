//! Runtime secret resolution.
//!
//! Config stores only env var NAMES (`broker.keys_env.shared_secret`,
//! `db.url_env`). The daemon calls [`resolve_secrets`] once at startup and
//! passes the result into constructors. `Debug` redacts values and error
//! messages name the variable, never its value.

use anyhow::{bail, Result};

use crate::DaemonConfig;

#[derive(Clone)]
pub struct ResolvedSecrets {
    shared_secret_var: String,
    database_url_var: String,
    /// Broker gateway shared secret. `None` if the named env var is unset or blank.
    pub broker_shared_secret: Option<String>,
    /// Postgres connection URL. `None` if the named env var is unset or blank.
    pub database_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "broker_shared_secret",
                &self.broker_shared_secret.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

impl ResolvedSecrets {
    pub fn require_database_url(&self) -> Result<&str> {
        match self.database_url.as_deref() {
            Some(url) => Ok(url),
            None => bail!(
                "SECRETS_MISSING: required env var '{}' (database url) is not set or empty",
                self.database_url_var
            ),
        }
    }

    pub fn require_broker_shared_secret(&self) -> Result<&str> {
        match self.broker_shared_secret.as_deref() {
            Some(s) => Ok(s),
            None => bail!(
                "SECRETS_MISSING: required env var '{}' (broker shared secret) is not set or empty",
                self.shared_secret_var
            ),
        }
    }
}

/// Unset or blank variables resolve to `None`.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

pub fn resolve_secrets(cfg: &DaemonConfig) -> ResolvedSecrets {
    let shared_secret_var = cfg.broker.keys_env.shared_secret.trim().to_string();
    let database_url_var = cfg.db.url_env.trim().to_string();
    ResolvedSecrets {
        broker_shared_secret: resolve_env(&shared_secret_var),
        database_url: resolve_env(&database_url_var),
        shared_secret_var,
        database_url_var,
    }
}
