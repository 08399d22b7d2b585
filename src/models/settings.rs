//! Wallet settings model.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Savings percentage used until the user saves one.
pub const DEFAULT_SAVINGS_PERCENT: u8 = 10;

/// The singleton settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Wallet base endpoint, always ending with `/` once saved
    #[serde(default)]
    pub url: String,
    /// Bearer credential for the wallet admin API
    #[serde(default)]
    pub admin_key: String,
    /// Kept for the settings form; no wallet call consumes it
    #[serde(default = "default_savings_percent")]
    pub savings_percent: u8,
}

fn default_savings_percent() -> u8 {
    DEFAULT_SAVINGS_PERCENT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            url: String::new(),
            admin_key: String::new(),
            savings_percent: DEFAULT_SAVINGS_PERCENT,
        }
    }
}

impl Settings {
    /// Whether both the wallet URL and the admin key are present.
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.admin_key.trim().is_empty()
    }

    /// Credentials for a wallet call, or a configuration error when incomplete.
    pub fn credentials(&self) -> Result<WalletCredentials, AppError> {
        if !self.is_configured() {
            return Err(AppError::Configuration(
                "Wallet URL and admin key are not configured. Save them in the wallet settings first."
                    .to_string(),
            ));
        }

        Ok(WalletCredentials {
            base_url: normalize_base_url(&self.url),
            admin_key: self.admin_key.trim().to_string(),
        })
    }
}

/// Endpoint and credential used by the wallet client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletCredentials {
    pub base_url: String,
    pub admin_key: String,
}

/// Trim the URL and make sure it ends with a path separator.
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// Request body for saving settings. The whole record is replaced.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSettingsRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub admin_key: String,
    #[serde(default)]
    pub savings_percent: Option<u8>,
}

impl SaveSettingsRequest {
    /// Validate the request and build the record to persist.
    pub fn into_settings(self) -> Result<Settings, AppError> {
        let url = self.url.trim();
        let admin_key = self.admin_key.trim();

        if url.is_empty() || admin_key.is_empty() {
            return Err(AppError::Validation(
                "Both the wallet URL and the admin key are required".to_string(),
            ));
        }

        let savings_percent = self.savings_percent.unwrap_or(DEFAULT_SAVINGS_PERCENT);
        if savings_percent > 100 {
            return Err(AppError::Validation(
                "Savings percentage must be between 0 and 100".to_string(),
            ));
        }

        Ok(Settings {
            url: normalize_base_url(url),
            admin_key: admin_key.to_string(),
            savings_percent,
        })
    }
}

/// Settings as returned by the API. The admin key itself is never echoed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub url: String,
    pub admin_key_set: bool,
    pub savings_percent: u8,
    pub configured: bool,
}

impl From<&Settings> for SettingsView {
    fn from(settings: &Settings) -> Self {
        Self {
            url: settings.url.clone(),
            admin_key_set: !settings.admin_key.trim().is_empty(),
            savings_percent: settings.savings_percent,
            configured: settings.is_configured(),
        }
    }
}
