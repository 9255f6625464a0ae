use std::env;

use thiserror::Error;

/// Identity and shared secret for the external media-relay provider.
///
/// Both values are required to sign join credentials, so a missing or empty
/// value is a startup failure rather than a per-call one.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// The provider-issued application id, embedded in every credential.
    pub app_id: String,
    /// The shared secret used to sign credentials. Never leaves the process.
    pub app_certificate: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
}

impl ProviderConfig {
    pub const APP_ID_VAR: &'static str = "CODECAST_RTC_APP_ID";
    pub const APP_CERTIFICATE_VAR: &'static str = "CODECAST_RTC_APP_CERTIFICATE";

    pub fn new(app_id: String, app_certificate: String) -> Result<Self, ConfigError> {
        if app_id.trim().is_empty() {
            return Err(ConfigError::Missing(Self::APP_ID_VAR));
        }

        if app_certificate.trim().is_empty() {
            return Err(ConfigError::Missing(Self::APP_CERTIFICATE_VAR));
        }

        Ok(Self {
            app_id,
            app_certificate,
        })
    }

    /// Reads the provider identity from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_id =
            env::var(Self::APP_ID_VAR).map_err(|_| ConfigError::Missing(Self::APP_ID_VAR))?;

        let app_certificate = env::var(Self::APP_CERTIFICATE_VAR)
            .map_err(|_| ConfigError::Missing(Self::APP_CERTIFICATE_VAR))?;

        Self::new(app_id, app_certificate)
    }
}
