//! Provisioning data for claimed hardware.
//!
//! The machine's bootstrap data is copied onto the hardware's user data
//! with the provider ID placeholder filled in.

use crate::error::ControllerError;
use crate::reconciler::{Reconciler, machine_identity, machine_key};
use crds::{Hardware, TinkerbellMachine};
use tracing::{debug, info};

/// Token in bootstrap data replaced by the machine's provider ID
pub const PROVIDER_ID_PLACEHOLDER: &str = "PROVIDER_ID";

/// Key of the bootstrap data secret holding the data
const BOOTSTRAP_SECRET_KEY: &str = "value";

/// Provider ID of a machine running on the given hardware
pub fn provider_id(hardware: &Hardware) -> String {
    format!("tinkerbell://{}", hardware.key())
}

/// Bootstrap data with every placeholder replaced by `provider_id`
pub fn render_user_data(bootstrap: &str, provider_id: &str) -> String {
    bootstrap.replace(PROVIDER_ID_PLACEHOLDER, provider_id)
}

impl Reconciler {
    /// Bootstrap data for the machine, inline or from its data secret
    pub async fn bootstrap_data(&self, machine: &TinkerbellMachine) -> Result<String, ControllerError> {
        let bootstrap = &machine.spec.bootstrap;

        if let Some(data) = bootstrap.data.as_deref().filter(|d| !d.is_empty()) {
            return Ok(data.to_string());
        }

        let Some(secret) = bootstrap.data_secret_name.as_deref().filter(|s| !s.is_empty()) else {
            return Err(ControllerError::BootstrapDataNotReady {
                machine: machine_key(machine),
            });
        };

        let (namespace, _) = machine_identity(machine)?;
        match self.store.get_secret_value(namespace, secret, BOOTSTRAP_SECRET_KEY).await {
            Ok(data) => Ok(data),
            Err(e) if e.is_not_found() => {
                debug!("Bootstrap secret {}/{} not available yet", namespace, secret);
                Err(ControllerError::BootstrapDataNotReady {
                    machine: machine_key(machine),
                })
            }
            Err(e) => Err(ControllerError::store(format!("reading bootstrap secret {namespace}/{secret}"), e)),
        }
    }

    /// Writes the rendered user data to the hardware when it differs from
    /// what is stored, returning the current hardware object.
    pub async fn inject_user_data(&self, hardware: Hardware, bootstrap: &str, provider_id: &str) -> Result<Hardware, ControllerError> {
        let user_data = render_user_data(bootstrap, provider_id);

        if hardware.spec.user_data.as_deref() == Some(user_data.as_str()) {
            debug!("Hardware {} user data up to date", hardware.key());
            return Ok(hardware);
        }

        let namespace = hardware.metadata.namespace.as_deref().unwrap_or("default");
        let name = hardware.metadata.name.as_deref().unwrap_or_default();

        let patched = self
            .store
            .patch_hardware_user_data(namespace, name, &user_data)
            .await
            .map_err(|e| ControllerError::store(format!("patching user data of Hardware {}", hardware.key()), e))?;

        info!("Updated user data of Hardware {}", patched.key());
        Ok(patched)
    }
}
