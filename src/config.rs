//! Merchant credentials and engine settings.
//!
//! [`MerchantConfig`] is immutable once handed to the engine; per-call fields
//! (`method`, `biz_content`, `sign`) live on
//! [`GatewayRequest`](crate::request::GatewayRequest) instead.

use crate::errors::{GatewayError, Result};
use crate::signer::{HmacSha256Signer, RsaSha256Signer, SignType, Signer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Production gateway endpoint.
pub const DEFAULT_GATEWAY_URL: &str = "https://openapi.alipay.com/gateway.do";

/// Credentials and protocol settings for one merchant application.
#[derive(Clone, Serialize, Deserialize)]
pub struct MerchantConfig {
    /// Application id assigned by the gateway
    pub app_id: String,

    /// Merchant private key (RSA) or shared secret (HMAC)
    pub private_key: String,

    /// Gateway public key used to verify inbound signatures
    #[serde(default)]
    pub public_key: Option<String>,

    /// Asynchronous notification callback
    #[serde(default)]
    pub notify_url: String,

    /// Browser return page for the form and URL channels
    #[serde(default)]
    pub return_url: Option<String>,

    /// Third-party authorization token for the scan and barcode channels
    #[serde(default)]
    pub app_auth_token: Option<String>,

    /// Response format tag
    #[serde(default = "default_format")]
    pub format: String,

    /// Character set tag
    #[serde(default = "default_charset")]
    pub charset: String,

    /// Signature algorithm
    #[serde(default = "default_sign_type")]
    pub sign_type: SignType,

    /// Protocol version tag
    #[serde(default = "default_version")]
    pub version: String,

    /// Gateway endpoint
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
}

fn default_format() -> String {
    "JSON".to_string()
}

fn default_charset() -> String {
    "utf-8".to_string()
}

fn default_sign_type() -> SignType {
    SignType::Rsa2
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

impl MerchantConfig {
    /// Creates a configuration with protocol defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use paygate::config::MerchantConfig;
    /// use paygate::signer::SignType;
    ///
    /// let config = MerchantConfig::new("2021000000000000", "shared-secret")
    ///     .with_sign_type(SignType::HmacSha256)
    ///     .with_notify_url("https://shop.example.com/notify");
    ///
    /// assert_eq!(config.charset, "utf-8");
    /// assert_eq!(config.version, "1.0");
    /// ```
    pub fn new(app_id: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            private_key: private_key.into(),
            public_key: None,
            notify_url: String::new(),
            return_url: None,
            app_auth_token: None,
            format: default_format(),
            charset: default_charset(),
            sign_type: default_sign_type(),
            version: default_version(),
            gateway_url: default_gateway_url(),
        }
    }

    /// Sets the gateway public key.
    pub fn with_public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = Some(key.into());
        self
    }

    /// Sets the notification callback.
    pub fn with_notify_url(mut self, url: impl Into<String>) -> Self {
        self.notify_url = url.into();
        self
    }

    /// Sets the browser return page.
    pub fn with_return_url(mut self, url: impl Into<String>) -> Self {
        self.return_url = Some(url.into());
        self
    }

    /// Sets the third-party authorization token.
    pub fn with_app_auth_token(mut self, token: impl Into<String>) -> Self {
        self.app_auth_token = Some(token.into());
        self
    }

    /// Sets the signature algorithm.
    pub fn with_sign_type(mut self, sign_type: SignType) -> Self {
        self.sign_type = sign_type;
        self
    }

    /// Points the engine at a different gateway (e.g. a sandbox).
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }

    /// Loads a configuration from `PAYGATE_*` environment variables.
    ///
    /// `PAYGATE_APP_ID` and `PAYGATE_PRIVATE_KEY` are required. Optional:
    /// `PAYGATE_PUBLIC_KEY`, `PAYGATE_NOTIFY_URL`, `PAYGATE_RETURN_URL`,
    /// `PAYGATE_APP_AUTH_TOKEN`, `PAYGATE_SIGN_TYPE`, `PAYGATE_GATEWAY_URL`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(required_env("PAYGATE_APP_ID")?, required_env("PAYGATE_PRIVATE_KEY")?);

        if let Some(key) = optional_env("PAYGATE_PUBLIC_KEY") {
            config.public_key = Some(key);
        }
        if let Some(url) = optional_env("PAYGATE_NOTIFY_URL") {
            config.notify_url = url;
        }
        if let Some(url) = optional_env("PAYGATE_RETURN_URL") {
            config.return_url = Some(url);
        }
        if let Some(token) = optional_env("PAYGATE_APP_AUTH_TOKEN") {
            config.app_auth_token = Some(token);
        }
        if let Some(sign_type) = optional_env("PAYGATE_SIGN_TYPE") {
            config.sign_type = sign_type.parse()?;
        }
        if let Some(url) = optional_env("PAYGATE_GATEWAY_URL") {
            config.gateway_url = url;
        }
        Ok(config)
    }

    /// Builds the signer matching `sign_type`.
    pub fn signer(&self) -> Result<Arc<dyn Signer>> {
        match self.sign_type {
            SignType::Rsa2 => Ok(Arc::new(RsaSha256Signer::new(
                &self.private_key,
                self.public_key.as_deref(),
            )?)),
            SignType::HmacSha256 => Ok(Arc::new(HmacSha256Signer::new(
                self.public_key
                    .clone()
                    .filter(|k| !k.is_empty())
                    .unwrap_or_else(|| self.private_key.clone()),
            )?)),
        }
    }
}

impl fmt::Debug for MerchantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerchantConfig")
            .field("app_id", &self.app_id)
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key.as_ref().map(|_| "<redacted>"))
            .field("notify_url", &self.notify_url)
            .field("return_url", &self.return_url)
            .field("app_auth_token", &self.app_auth_token.as_ref().map(|_| "<redacted>"))
            .field("format", &self.format)
            .field("charset", &self.charset)
            .field("sign_type", &self.sign_type)
            .field("version", &self.version)
            .field("gateway_url", &self.gateway_url)
            .finish()
    }
}

fn required_env(name: &str) -> Result<String> {
    optional_env(name).ok_or_else(|| GatewayError::ConfigError(format!("{} is not set", name)))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Bounds of the barcode polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingPolicy {
    /// Number of query attempts before the order is cancelled
    pub attempts: u32,

    /// Delay before each query attempt
    pub interval: Duration,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_secs(5),
        }
    }
}

impl PollingPolicy {
    /// Creates a policy.
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MerchantConfig::new("2021", "secret");
        assert_eq!(config.format, "JSON");
        assert_eq!(config.charset, "utf-8");
        assert_eq!(config.sign_type, SignType::Rsa2);
        assert_eq!(config.gateway_url, DEFAULT_GATEWAY_URL);
        assert!(config.return_url.is_none());
    }

    #[test]
    fn test_config_builders() {
        let config = MerchantConfig::new("2021", "secret")
            .with_return_url("https://shop/return")
            .with_app_auth_token("token")
            .with_gateway_url("https://openapi.alipaydev.com/gateway.do");

        assert_eq!(config.return_url.as_deref(), Some("https://shop/return"));
        assert_eq!(config.app_auth_token.as_deref(), Some("token"));
        assert!(config.gateway_url.contains("alipaydev"));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = MerchantConfig::new("2021", "super-secret-key").with_public_key("gateway-pub");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret-key"));
        assert!(!debug.contains("gateway-pub"));
        assert!(debug.contains("2021"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: MerchantConfig = serde_json::from_str(
            r#"{"app_id":"2021","private_key":"k","sign_type":"HMAC-SHA256"}"#,
        )
        .unwrap();
        assert_eq!(config.sign_type, SignType::HmacSha256);
        assert_eq!(config.version, "1.0");
    }

    #[test]
    fn test_hmac_signer_from_config() {
        let config = MerchantConfig::new("2021", "secret").with_sign_type(SignType::HmacSha256);
        let signer = config.signer().unwrap();
        assert_eq!(signer.sign_type(), SignType::HmacSha256);
    }

    #[test]
    fn test_polling_default() {
        let policy = PollingPolicy::default();
        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.interval, Duration::from_secs(5));
    }
}
