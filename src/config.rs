use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::MacPolicy;
use crate::error::VieraError;

pub const DEFAULT_PORT: u16 = 55000;
pub const REMOTE_CONTROL_PATH: &str = "/nrc/control_0";
pub const RENDERING_CONTROL_PATH: &str = "/dmr/control_0";

/// Connection settings for a TV.
///
/// Every field has a default, so a JSON document only needs to name what it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub port: u16,
    /// Control endpoint of the network remote control (NRC) service.
    pub remote_control_path: String,
    /// Control endpoint of the UPnP rendering control (DMR) service.
    pub rendering_control_path: String,
    pub request_timeout_ms: u64,
    /// Check the HMAC tag on `X_EncResult` payloads before decrypting them.
    pub verify_result_mac: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            remote_control_path: REMOTE_CONTROL_PATH.to_string(),
            rendering_control_path: RENDERING_CONTROL_PATH.to_string(),
            request_timeout_ms: 5_000,
            verify_result_mac: true,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, VieraError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| VieraError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), VieraError> {
        if self.port == 0 {
            return Err(VieraError::Config("port must be non-zero".into()));
        }
        for path in [&self.remote_control_path, &self.rendering_control_path] {
            if !path.starts_with('/') {
                return Err(VieraError::Config(format!(
                    "control path {:?} must start with '/'",
                    path
                )));
            }
        }
        if self.request_timeout_ms == 0 {
            return Err(VieraError::Config("request timeout must be non-zero".into()));
        }
        Ok(())
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_verify_result_mac(mut self, verify: bool) -> Self {
        self.verify_result_mac = verify;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn mac_policy(&self) -> MacPolicy {
        if self.verify_result_mac {
            MacPolicy::Verify
        } else {
            MacPolicy::Ignore
        }
    }
}
