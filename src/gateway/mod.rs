//! Channel-specific gateway orchestration.
//!
//! Each payment channel is a capability trait. [`GatewayEngine`] implements
//! every channel the open platform offers; a gateway that lacks a channel
//! simply does not implement that trait.
//!
//! All channels share one shape: stamp the channel's `method` and product
//! code onto a copy of the order, serialize it into `biz_content`, add the
//! public parameters, sign, and validate before anything leaves the process.

pub mod barcode;
mod channels;

pub use barcode::{BarcodeOutcome, FailureReason};

use crate::clock::{Clock, SystemClock};
use crate::config::{MerchantConfig, PollingPolicy};
use crate::errors::{GatewayError, Result};
use crate::events::{EventSink, NoopSink};
use crate::notify::{NotifyOutcome, NotifyValidator};
use crate::params::ParameterBag;
use crate::request::GatewayRequest;
use crate::signer::Signer;
use crate::transport::HttpTransport;
use crate::types::{keys, methods, responses, NotifyModel, OrderModel};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Envelope key the gateway uses when it rejects a call outright.
const ERROR_RESPONSE: &str = "error_response";

/// Identity shared by every gateway capability.
pub trait Gateway: Send + Sync {
    /// Short gateway name (e.g. "alipay").
    fn name(&self) -> &str;

    /// Endpoint requests are sent to.
    fn gateway_url(&self) -> &str;
}

/// Desktop web payment rendered as an auto-submitting HTML form.
pub trait FormPayment: Gateway {
    /// Returns the HTML form the host writes to the browser.
    fn build_form_payment(&self, order: &OrderModel) -> Result<String>;
}

/// Mobile web payment delivered as a redirect URL.
pub trait UrlPayment: Gateway {
    /// Returns the URL the host redirects the browser to.
    fn build_url_payment(&self, order: &OrderModel) -> Result<String>;
}

/// In-app payment handed to the client SDK as a signed query string.
pub trait AppPayment: Gateway {
    /// Returns the signed, url-encoded order string.
    fn build_app_payment(&self, order: &OrderModel) -> Result<String>;
}

/// Customer scans a QR code presented by the merchant.
#[async_trait]
pub trait ScanPayment: Gateway {
    /// Pre-creates the order and returns the QR payload.
    async fn build_scan_payment(&self, order: &OrderModel) -> Result<String>;
}

/// Merchant scans the customer's payment code.
#[async_trait]
pub trait BarcodePayment: Gateway {
    /// Submits the payment and waits for a terminal outcome.
    ///
    /// Cancelling `cancel` abandons the wait; the order is still cancelled at
    /// the gateway before this returns.
    async fn build_barcode_payment(
        &self,
        order: &OrderModel,
        cancel: CancellationToken,
    ) -> Result<BarcodeOutcome>;
}

/// Asynchronous notification handling.
#[async_trait]
pub trait NotifyVerification: Gateway {
    /// Runs the notification gates over the received fields.
    async fn verify_notification(&self, params: &ParameterBag) -> NotifyOutcome;
}

/// Protocol engine for one merchant application.
///
/// The engine holds only immutable configuration and shared collaborators;
/// every call builds its own parameters, so one engine can serve many
/// concurrent transactions.
///
/// # Examples
///
/// ```
/// use paygate::config::MerchantConfig;
/// use paygate::gateway::{GatewayEngine, UrlPayment};
/// use paygate::signer::SignType;
/// use paygate::transport::ReqwestTransport;
/// use paygate::types::OrderModel;
/// use std::sync::Arc;
///
/// # fn example() -> paygate::Result<()> {
/// let config = MerchantConfig::new("2021000000000000", "shared-secret")
///     .with_sign_type(SignType::HmacSha256)
///     .with_notify_url("https://shop.example.com/notify");
/// let engine = GatewayEngine::new(config, Arc::new(ReqwestTransport::new()?))?;
///
/// let url = engine.build_url_payment(&OrderModel::new("1001", "9.90", "Green tea"))?;
/// assert!(url.contains("method=alipay.trade.wap.pay"));
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
#[derive(Clone)]
pub struct GatewayEngine {
    config: MerchantConfig,
    signer: Arc<dyn Signer>,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    polling: PollingPolicy,
}

impl GatewayEngine {
    /// Creates an engine using the signer described by `config`.
    pub fn new(config: MerchantConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let signer = config.signer()?;
        Ok(Self {
            config,
            signer,
            transport,
            clock: Arc::new(SystemClock),
            events: Arc::new(NoopSink),
            polling: PollingPolicy::default(),
        })
    }

    /// Replaces the signer.
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = signer;
        self
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets where payment events are delivered.
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the barcode polling bounds.
    pub fn with_polling(mut self, polling: PollingPolicy) -> Self {
        self.polling = polling;
        self
    }

    /// Merchant configuration.
    pub fn config(&self) -> &MerchantConfig {
        &self.config
    }

    /// Validator for asynchronous notifications, sharing this engine's
    /// signer and transport.
    pub fn notify_validator(&self) -> NotifyValidator {
        NotifyValidator::new(&self.config, self.signer.clone(), self.transport.clone())
    }

    /// Signed parameters for the form channel.
    pub fn init_form_payment(&self, order: &OrderModel) -> Result<ParameterBag> {
        self.init_order(order, Channel::FORM)
    }

    /// Signed parameters for the URL channel.
    pub fn init_url_payment(&self, order: &OrderModel) -> Result<ParameterBag> {
        self.init_order(order, Channel::URL)
    }

    /// Signed parameters for the app channel.
    pub fn init_app_payment(&self, order: &OrderModel) -> Result<ParameterBag> {
        self.init_order(order, Channel::APP)
    }

    /// Signed parameters for the scan channel's pre-create call.
    pub fn init_scan_payment(&self, order: &OrderModel) -> Result<ParameterBag> {
        self.init_order(order, Channel::SCAN)
    }

    /// Signed parameters for the barcode channel's pay call.
    pub fn init_barcode_payment(&self, order: &OrderModel) -> Result<ParameterBag> {
        if order.auth_code.as_deref().map_or(true, |c| c.trim().is_empty()) {
            return Err(GatewayError::InvalidParameter("auth_code".to_string()));
        }
        self.init_order(order, Channel::BARCODE)
    }

    /// Signed parameters for an order query.
    pub fn init_query(&self, out_trade_no: &str) -> Result<ParameterBag> {
        self.init_common(methods::QUERY, out_trade_no)
    }

    /// Signed parameters for an order cancellation.
    pub fn init_cancel(&self, out_trade_no: &str) -> Result<ParameterBag> {
        self.init_common(methods::CANCEL, out_trade_no)
    }

    /// Queries the current state of an order.
    pub async fn query(&self, out_trade_no: &str) -> Result<NotifyModel> {
        let params = self.init_query(out_trade_no)?;
        self.commit(&params, responses::QUERY).await
    }

    /// Cancels an order, closing it or reversing a completed payment.
    pub async fn cancel(&self, out_trade_no: &str) -> Result<NotifyModel> {
        let params = self.init_cancel(out_trade_no)?;
        self.commit(&params, responses::CANCEL).await
    }

    /// Creates a scan-channel order at the gateway.
    pub async fn pre_create(&self, order: &OrderModel) -> Result<NotifyModel> {
        let params = self.init_scan_payment(order)?;
        self.commit(&params, responses::PRECREATE)
            .await?
            .ensure_business_success()
    }

    /// Parses a response envelope `{"<op>_response": {...}, "sign": "..."}`.
    ///
    /// The inner object named by `response_key` becomes the result; the
    /// envelope's `sign` is attached to it because the signature covers the
    /// inner object only.
    pub fn read_return_result(raw: &str, response_key: &str) -> Result<NotifyModel> {
        let envelope = ParameterBag::from_json(raw)?;
        let sign = envelope.get_or_default(keys::SIGN).to_string();

        let inner = match envelope.get(response_key) {
            Some(inner) => inner,
            None => {
                if let Some(error) = envelope.get(ERROR_RESPONSE) {
                    let notify = NotifyModel::from_params(&ParameterBag::from_json(error)?);
                    notify.ensure_business_success()?;
                }
                return Err(GatewayError::MissingKey(response_key.to_string()));
            }
        };

        let mut notify = NotifyModel::from_params(&ParameterBag::from_json(inner)?);
        notify.sign = sign;
        Ok(notify)
    }

    /// Submits signed parameters and parses the envelope.
    async fn commit(&self, params: &ParameterBag, response_key: &str) -> Result<NotifyModel> {
        let body = params.to_url_encoded_query_string();
        debug!(method = params.get_or_default(keys::METHOD), "submitting gateway request");
        let raw = self
            .transport
            .post_form(&self.config.gateway_url, &body)
            .await?;
        Self::read_return_result(&raw, response_key)
    }

    fn init_order(&self, order: &OrderModel, channel: Channel) -> Result<ParameterBag> {
        let mut stamped = order.clone();
        stamped.product_code = channel.product_code.map(str::to_string);
        stamped.scene = channel.scene.map(str::to_string);
        stamped.validate()?;

        let mut request = GatewayRequest::new(
            &self.config,
            channel.method,
            stamped.to_biz_content()?,
            self.clock.now(),
        );
        if channel.return_url {
            request = request.with_return_url(self.config.return_url.as_deref());
        }
        if channel.app_auth_token {
            request = request.with_app_auth_token(self.config.app_auth_token.as_deref());
        }
        request.sign(self.signer.as_ref())
    }

    fn init_common(&self, method: &str, out_trade_no: &str) -> Result<ParameterBag> {
        if out_trade_no.trim().is_empty() {
            return Err(GatewayError::InvalidParameter(keys::OUT_TRADE_NO.to_string()));
        }
        let biz_content = json!({ "out_trade_no": out_trade_no }).to_string();
        GatewayRequest::new(&self.config, method, biz_content, self.clock.now())
            .with_app_auth_token(self.config.app_auth_token.as_deref())
            .sign(self.signer.as_ref())
    }
}

impl Gateway for GatewayEngine {
    fn name(&self) -> &str {
        "alipay"
    }

    fn gateway_url(&self) -> &str {
        &self.config.gateway_url
    }
}

/// Fields that define a channel; every init overwrites all of them.
#[derive(Clone, Copy)]
struct Channel {
    method: &'static str,
    product_code: Option<&'static str>,
    scene: Option<&'static str>,
    return_url: bool,
    app_auth_token: bool,
}

impl Channel {
    const FORM: Self = Self {
        method: methods::WEB,
        product_code: Some(crate::types::product_codes::FAST_INSTANT_TRADE_PAY),
        scene: None,
        return_url: true,
        app_auth_token: false,
    };

    const URL: Self = Self {
        method: methods::WAP,
        product_code: Some(crate::types::product_codes::QUICK_WAP_WAY),
        scene: None,
        return_url: true,
        app_auth_token: false,
    };

    const APP: Self = Self {
        method: methods::APP,
        product_code: Some(crate::types::product_codes::QUICK_MSECURITY_PAY),
        scene: None,
        return_url: false,
        app_auth_token: false,
    };

    const SCAN: Self = Self {
        method: methods::SCAN,
        product_code: None,
        scene: None,
        return_url: false,
        app_auth_token: true,
    };

    const BARCODE: Self = Self {
        method: methods::BARCODE,
        product_code: Some(crate::types::product_codes::FACE_TO_FACE_PAYMENT),
        scene: Some(crate::types::SCENE_BAR_CODE),
        return_url: false,
        app_auth_token: true,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{HmacSha256Signer, SignType};
    use crate::transport::ReqwestTransport;

    fn engine() -> GatewayEngine {
        let config = MerchantConfig::new("2021", "secret")
            .with_sign_type(SignType::HmacSha256)
            .with_notify_url("https://shop/notify")
            .with_return_url("https://shop/return")
            .with_app_auth_token("auth-token");
        GatewayEngine::new(config, Arc::new(ReqwestTransport::new().unwrap())).unwrap()
    }

    fn order() -> OrderModel {
        OrderModel::new("1001", "9.00", "Coffee")
    }

    fn biz(params: &ParameterBag) -> serde_json::Value {
        serde_json::from_str(params.get("biz_content").unwrap()).unwrap()
    }

    #[test]
    fn test_read_return_result_attaches_envelope_sign() {
        let notify = GatewayEngine::read_return_result(
            r#"{"pay_response":{"trade_status":"TRADE_SUCCESS","out_trade_no":"1001"},"sign":"abc"}"#,
            "pay_response",
        )
        .unwrap();

        assert_eq!(notify.trade_status, "TRADE_SUCCESS");
        assert_eq!(notify.out_trade_no, "1001");
        assert_eq!(notify.sign, "abc");
    }

    #[test]
    fn test_read_return_result_missing_operation() {
        let err = GatewayEngine::read_return_result(
            r#"{"alipay_trade_query_response":{"code":"10000"},"sign":"abc"}"#,
            "alipay_trade_cancel_response",
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::MissingKey(k) if k == "alipay_trade_cancel_response"));
    }

    #[test]
    fn test_read_return_result_error_response() {
        let err = GatewayEngine::read_return_result(
            r#"{"error_response":{"code":"40002","msg":"Invalid Arguments","sub_code":"isv.invalid-app-id","sub_msg":"bad app id"},"sign":"x"}"#,
            "alipay_trade_query_response",
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::GatewayRejected { code, .. } if code == "40002"));
    }

    #[test]
    fn test_read_return_result_malformed() {
        let err = GatewayEngine::read_return_result("<html>bad gateway</html>", "x").unwrap_err();
        assert!(matches!(err, GatewayError::MalformedPayload(_)));
    }

    #[test]
    fn test_channel_fields() {
        let engine = engine();

        let form = engine.init_form_payment(&order()).unwrap();
        assert_eq!(form.get("method"), Some(methods::WEB));
        assert_eq!(biz(&form)["product_code"], "FAST_INSTANT_TRADE_PAY");
        assert_eq!(form.get("return_url"), Some("https://shop/return"));
        assert!(!form.contains("app_auth_token"));

        let app = engine.init_app_payment(&order()).unwrap();
        assert_eq!(biz(&app)["product_code"], "QUICK_MSECURITY_PAY");
        assert!(!app.contains("return_url"));

        let scan = engine.init_scan_payment(&order()).unwrap();
        assert_eq!(scan.get("method"), Some(methods::SCAN));
        assert!(biz(&scan).get("product_code").is_none());
        assert_eq!(scan.get("app_auth_token"), Some("auth-token"));

        let barcode = engine
            .init_barcode_payment(&order().with_auth_code("2876344"))
            .unwrap();
        assert_eq!(biz(&barcode)["scene"], "bar_code");
        assert_eq!(biz(&barcode)["product_code"], "FACE_TO_FACE_PAYMENT");
    }

    #[test]
    fn test_barcode_requires_auth_code() {
        let err = engine().init_barcode_payment(&order()).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidParameter(f) if f == "auth_code"));
    }

    #[test]
    fn test_query_and_cancel_parameters() {
        let engine = engine();
        let query = engine.init_query("1001").unwrap();
        assert_eq!(query.get("method"), Some(methods::QUERY));
        assert_eq!(query.get("biz_content"), Some(r#"{"out_trade_no":"1001"}"#));

        let cancel = engine.init_cancel("1001").unwrap();
        assert_eq!(cancel.get("method"), Some(methods::CANCEL));

        assert!(matches!(
            engine.init_query(""),
            Err(GatewayError::InvalidParameter(f)) if f == "out_trade_no"
        ));
    }

    #[test]
    fn test_signature_verifies() {
        let engine = engine();
        let params = engine.init_url_payment(&order()).unwrap();
        let signer = HmacSha256Signer::new("secret").unwrap();
        let canonical = params.to_canonical_query_string(&["sign"]);
        assert!(signer.verify(&canonical, params.get("sign").unwrap()).unwrap());
    }
}
