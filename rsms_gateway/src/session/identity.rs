// session/identity.rs: vehicle identity (VIN, SIM ICCID, battery pack serials)
use crate::errors::GatewayError;
use crate::persist;
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    pub vin: String,
    pub iccid: String,
    pub battery_pack_sns: Vec<String>,
}

impl Identity {
    /// Every field must be present before the session can log in.
    pub fn validate(self) -> Result<Self, GatewayError> {
        if self.vin.trim().is_empty() {
            return Err(GatewayError::Unprovisioned("vin"));
        }
        if self.iccid.trim().is_empty() {
            return Err(GatewayError::Unprovisioned("iccid"));
        }
        if self.battery_pack_sns.iter().all(|s| s.trim().is_empty()) {
            return Err(GatewayError::Unprovisioned("battery_pack_sn"));
        }
        Ok(self)
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current identity, or `Unprovisioned` naming the first missing field.
    async fn identity(&self) -> Result<Identity, GatewayError>;
}

/// Identity fixed at startup (from configuration).
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub Identity);

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn identity(&self) -> Result<Identity, GatewayError> {
        self.0.clone().validate()
    }
}

/// `key=value` provisioning file, re-read on every call so a file that
/// appears later is picked up. `battery_pack_sn` may list serials
/// separated by commas.
#[derive(Debug, Clone)]
pub struct FileIdentity {
    path: PathBuf,
}

impl FileIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl IdentityProvider for FileIdentity {
    async fn identity(&self) -> Result<Identity, GatewayError> {
        let Some(bytes) = persist::read_optional(&self.path).await? else {
            return Err(GatewayError::Unprovisioned("vin"));
        };
        let text = String::from_utf8_lossy(&bytes);
        let mut id = Identity::default();
        for (k, v) in persist::key_values(&text) {
            match k {
                "vin" => id.vin = v.trim().to_string(),
                "iccid" => id.iccid = v.trim().to_string(),
                "battery_pack_sn" => {
                    id.battery_pack_sns = v
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                }
                _ => {}
            }
        }
        id.validate()
    }
}
