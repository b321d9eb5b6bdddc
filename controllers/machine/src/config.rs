//! Controller configuration.
//!
//! All settings come from environment variables and are read once at
//! startup; the reconciliation core only sees the resulting values.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::time::Duration;

/// Host of the Tinkerbell metadata service when `TINKERBELL_IP` is unset
pub const DEFAULT_TINKERBELL_IP: &str = "192.168.1.1";

/// Port of the Tinkerbell metadata service
pub const METADATA_SERVICE_PORT: u16 = 50061;

const DEFAULT_PROBE_ADDR: &str = "0.0.0.0:8081";
const DEFAULT_BACKOFF_MIN_SECONDS: u64 = 5;
const DEFAULT_BACKOFF_MAX_SECONDS: u64 = 300;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Host of the metadata service referenced by generated templates
    pub tinkerbell_ip: String,
    /// Listen address of the health probe server
    pub probe_addr: SocketAddr,
    /// First retry delay after a failed reconciliation
    pub backoff_min: Duration,
    /// Cap on the retry delay
    pub backoff_max: Duration,
}

impl ControllerConfig {
    /// Loads configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let tinkerbell_ip = non_empty("TINKERBELL_IP").unwrap_or_else(|| DEFAULT_TINKERBELL_IP.to_string());

        let probe_addr = non_empty("PROBE_ADDR")
            .unwrap_or_else(|| DEFAULT_PROBE_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ControllerError::InvalidConfig(format!("PROBE_ADDR: {e}")))?;

        let seconds = |name: &str, default: u64| -> Result<u64, ControllerError> {
            non_empty(name).map_or(Ok(default), |v| {
                v.trim()
                    .parse::<u64>()
                    .map_err(|e| ControllerError::InvalidConfig(format!("{name}={v}: {e}")))
            })
        };

        let backoff_min = seconds("RECONCILE_BACKOFF_MIN_SECONDS", DEFAULT_BACKOFF_MIN_SECONDS)?;
        let backoff_max = seconds("RECONCILE_BACKOFF_MAX_SECONDS", DEFAULT_BACKOFF_MAX_SECONDS)?;
        if backoff_min == 0 || backoff_min > backoff_max {
            return Err(ControllerError::InvalidConfig(format!(
                "reconcile backoff bounds must satisfy 0 < min <= max (got {backoff_min}s..{backoff_max}s)"
            )));
        }

        Ok(Self {
            namespace: non_empty("WATCH_NAMESPACE"),
            tinkerbell_ip,
            probe_addr,
            backoff_min: Duration::from_secs(backoff_min),
            backoff_max: Duration::from_secs(backoff_max),
        })
    }

    /// URL of the metadata service written into generated templates
    pub fn metadata_url(&self) -> String {
        format!("http://{}:{}", self.tinkerbell_ip, METADATA_SERVICE_PORT)
    }
}
