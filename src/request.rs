//! Per-call signed requests.
//!
//! A [`GatewayRequest`] copies the public fields from an immutable
//! [`MerchantConfig`], adds the call-specific `method` and `biz_content`, and
//! turns into a signed [`ParameterBag`]. Nothing is written back to the
//! config, so one call can never leak into the next.

use crate::config::MerchantConfig;
use crate::errors::Result;
use crate::params::ParameterBag;
use crate::signer::Signer;
use crate::types::{first_empty, keys};
use crate::utils::format_timestamp;
use chrono::NaiveDateTime;
use tracing::debug;

/// One outbound call, ready to be signed.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    app_id: String,
    method: String,
    format: String,
    charset: String,
    version: String,
    notify_url: String,
    timestamp: String,
    biz_content: String,
    return_url: Option<String>,
    app_auth_token: Option<String>,
}

impl GatewayRequest {
    /// Starts a request for `method` carrying `biz_content`.
    pub fn new(
        config: &MerchantConfig,
        method: impl Into<String>,
        biz_content: impl Into<String>,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            app_id: config.app_id.clone(),
            method: method.into(),
            format: config.format.clone(),
            charset: config.charset.clone(),
            version: config.version.clone(),
            notify_url: config.notify_url.clone(),
            timestamp: format_timestamp(timestamp),
            biz_content: biz_content.into(),
            return_url: None,
            app_auth_token: None,
        }
    }

    /// Adds `return_url` when one is configured.
    pub fn with_return_url(mut self, url: Option<&str>) -> Self {
        self.return_url = url.filter(|u| !u.is_empty()).map(str::to_string);
        self
    }

    /// Adds `app_auth_token` when one is configured.
    pub fn with_app_auth_token(mut self, token: Option<&str>) -> Self {
        self.app_auth_token = token.filter(|t| !t.is_empty()).map(str::to_string);
        self
    }

    /// Operation name of this request.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Checks that every required public parameter is non-empty.
    pub fn validate(&self) -> Result<()> {
        first_empty(&[
            (keys::APP_ID, self.app_id.as_str()),
            (keys::METHOD, self.method.as_str()),
            (keys::FORMAT, self.format.as_str()),
            (keys::CHARSET, self.charset.as_str()),
            (keys::TIMESTAMP, self.timestamp.as_str()),
            (keys::VERSION, self.version.as_str()),
            (keys::BIZ_CONTENT, self.biz_content.as_str()),
        ])
    }

    /// Validates, then signs, returning the complete parameter set.
    ///
    /// The signature covers every non-empty parameter except `sign` itself.
    pub fn sign(self, signer: &dyn Signer) -> Result<ParameterBag> {
        self.validate()?;

        let mut params = ParameterBag::new();
        params.add(keys::APP_ID, &self.app_id);
        params.add(keys::METHOD, &self.method);
        params.add(keys::FORMAT, &self.format);
        params.add(keys::CHARSET, &self.charset);
        params.add(keys::SIGN_TYPE, signer.sign_type());
        params.add(keys::TIMESTAMP, &self.timestamp);
        params.add(keys::VERSION, &self.version);
        params.add(keys::NOTIFY_URL, &self.notify_url);
        params.add(keys::BIZ_CONTENT, &self.biz_content);
        if let Some(url) = &self.return_url {
            params.add(keys::RETURN_URL, url);
        }
        if let Some(token) = &self.app_auth_token {
            params.add(keys::APP_AUTH_TOKEN, token);
        }

        let sign = signer.sign(&params.to_canonical_query_string(&[keys::SIGN]))?;
        params.add(keys::SIGN, sign);

        debug!(method = %self.method, "signed gateway request");
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GatewayError;
    use crate::signer::HmacSha256Signer;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn config() -> MerchantConfig {
        MerchantConfig::new("2021", "secret").with_notify_url("https://shop/notify")
    }

    #[test]
    fn test_sign_produces_public_parameters() {
        let signer = HmacSha256Signer::new("secret").unwrap();
        let params = GatewayRequest::new(&config(), "alipay.trade.query", r#"{"out_trade_no":"1"}"#, ts())
            .sign(&signer)
            .unwrap();

        assert_eq!(params.get("app_id"), Some("2021"));
        assert_eq!(params.get("method"), Some("alipay.trade.query"));
        assert_eq!(params.get("sign_type"), Some("HMAC-SHA256"));
        assert_eq!(params.get("timestamp"), Some("2024-05-01 12:00:00"));
        assert_eq!(params.get("notify_url"), Some("https://shop/notify"));
        assert!(!params.contains("return_url"));

        let canonical = params.to_canonical_query_string(&["sign"]);
        assert!(signer.verify(&canonical, params.get("sign").unwrap()).unwrap());
    }

    #[test]
    fn test_optional_fields() {
        let signer = HmacSha256Signer::new("secret").unwrap();
        let params = GatewayRequest::new(&config(), "alipay.trade.page.pay", "{}", ts())
            .with_return_url(Some("https://shop/return"))
            .with_app_auth_token(Some(""))
            .sign(&signer)
            .unwrap();

        assert_eq!(params.get("return_url"), Some("https://shop/return"));
        assert!(!params.contains("app_auth_token"));
    }

    #[test]
    fn test_empty_required_field_prevents_signing() {
        let signer = HmacSha256Signer::new("secret").unwrap();
        let config = MerchantConfig::new("", "secret");
        let err = GatewayRequest::new(&config, "alipay.trade.query", "{}", ts())
            .sign(&signer)
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidParameter(f) if f == "app_id"));

        let err = GatewayRequest::new(&MerchantConfig::new("2021", "s"), "alipay.trade.query", "", ts())
            .sign(&signer)
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidParameter(f) if f == "biz_content"));
    }
}
