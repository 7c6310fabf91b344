//! Core type definitions for the gateway protocol.
//!
//! This module contains the wire constants, the outbound order payload that is
//! serialized into `biz_content`, and the inbound view shared by responses and
//! asynchronous notifications.

use crate::errors::{GatewayError, Result};
use crate::params::ParameterBag;
use serde::{Deserialize, Serialize};

/// Public parameter names and fixed protocol values.
pub mod keys {
    /// Merchant application id
    pub const APP_ID: &str = "app_id";
    /// Operation name
    pub const METHOD: &str = "method";
    /// Response format
    pub const FORMAT: &str = "format";
    /// Character set
    pub const CHARSET: &str = "charset";
    /// Signature algorithm tag
    pub const SIGN_TYPE: &str = "sign_type";
    /// Signature
    pub const SIGN: &str = "sign";
    /// Request timestamp
    pub const TIMESTAMP: &str = "timestamp";
    /// Protocol version
    pub const VERSION: &str = "version";
    /// Asynchronous notification callback
    pub const NOTIFY_URL: &str = "notify_url";
    /// Browser return page
    pub const RETURN_URL: &str = "return_url";
    /// Serialized business payload
    pub const BIZ_CONTENT: &str = "biz_content";
    /// Third-party authorization token
    pub const APP_AUTH_TOKEN: &str = "app_auth_token";
    /// Merchant order id
    pub const OUT_TRADE_NO: &str = "out_trade_no";
    /// Trade status
    pub const TRADE_STATUS: &str = "trade_status";
    /// One-time notification id
    pub const NOTIFY_ID: &str = "notify_id";
    /// Notify-verification result flag
    pub const IS_SUCCESS: &str = "is_success";
}

/// Operation names for each channel.
pub mod methods {
    /// Desktop web page payment (form redirect)
    pub const WEB: &str = "alipay.trade.page.pay";
    /// Mobile web payment (URL redirect)
    pub const WAP: &str = "alipay.trade.wap.pay";
    /// In-app payment
    pub const APP: &str = "alipay.trade.app.pay";
    /// QR pre-create (customer scans merchant)
    pub const SCAN: &str = "alipay.trade.precreate";
    /// Barcode payment (merchant scans customer)
    pub const BARCODE: &str = "alipay.trade.pay";
    /// Order query
    pub const QUERY: &str = "alipay.trade.query";
    /// Order cancellation
    pub const CANCEL: &str = "alipay.trade.cancel";
}

/// Envelope keys wrapping each operation's result.
pub mod responses {
    /// Result of [`super::methods::SCAN`]
    pub const PRECREATE: &str = "alipay_trade_precreate_response";
    /// Result of [`super::methods::BARCODE`]
    pub const PAY: &str = "alipay_trade_pay_response";
    /// Result of [`super::methods::QUERY`]
    pub const QUERY: &str = "alipay_trade_query_response";
    /// Result of [`super::methods::CANCEL`]
    pub const CANCEL: &str = "alipay_trade_cancel_response";
}

/// Product codes stamped per channel.
pub mod product_codes {
    /// Form channel
    pub const FAST_INSTANT_TRADE_PAY: &str = "FAST_INSTANT_TRADE_PAY";
    /// URL channel
    pub const QUICK_WAP_WAY: &str = "QUICK_WAP_WAY";
    /// App channel
    pub const QUICK_MSECURITY_PAY: &str = "QUICK_MSECURITY_PAY";
    /// Barcode channel
    pub const FACE_TO_FACE_PAYMENT: &str = "FACE_TO_FACE_PAYMENT";
}

/// Scene tag required by the barcode channel.
pub const SCENE_BAR_CODE: &str = "bar_code";

/// Business result code meaning the call itself succeeded.
pub const CODE_SUCCESS: &str = "10000";

/// Body the host must return after accepting a notification.
pub const NOTIFY_ACK: &str = "success";

/// Trade lifecycle as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeStatus {
    /// Created, waiting for the buyer to pay
    WaitBuyerPay,
    /// Closed unpaid, or fully refunded
    Closed,
    /// Paid
    Success,
    /// Paid and no longer refundable
    Finished,
    /// Absent or unrecognised status
    Unknown(String),
}

impl TradeStatus {
    /// Parses the wire value.
    pub fn parse(value: &str) -> Self {
        match value {
            "WAIT_BUYER_PAY" => Self::WaitBuyerPay,
            "TRADE_CLOSED" => Self::Closed,
            "TRADE_SUCCESS" => Self::Success,
            "TRADE_FINISHED" => Self::Finished,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Wire value.
    pub fn as_str(&self) -> &str {
        match self {
            Self::WaitBuyerPay => "WAIT_BUYER_PAY",
            Self::Closed => "TRADE_CLOSED",
            Self::Success => "TRADE_SUCCESS",
            Self::Finished => "TRADE_FINISHED",
            Self::Unknown(s) => s,
        }
    }
}

/// Business fields of one payment attempt, serialized into `biz_content`.
///
/// # Examples
///
/// ```
/// use paygate::types::OrderModel;
///
/// let order = OrderModel::new("20240101001", "88.88", "Green tea");
/// let json = order.to_biz_content().unwrap();
/// assert_eq!(json, r#"{"out_trade_no":"20240101001","total_amount":"88.88","subject":"Green tea"}"#);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct OrderModel {
    /// Merchant order id, unique per merchant
    pub out_trade_no: String,

    /// Amount in yuan with two decimals (e.g. "88.88")
    pub total_amount: String,

    /// Order title
    pub subject: String,

    /// Order description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Channel product code, stamped by the engine
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_code: Option<String>,

    /// Payment code scanned from the customer's device (barcode channel)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_code: Option<String>,

    /// Payment scene, stamped by the engine for the barcode channel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,

    /// Relative expiry (e.g. "90m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_express: Option<String>,

    /// Merchant store id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
}

impl OrderModel {
    /// Creates an order with the three fields every channel requires.
    pub fn new(
        out_trade_no: impl Into<String>,
        total_amount: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            out_trade_no: out_trade_no.into(),
            total_amount: total_amount.into(),
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Sets the description.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the customer's payment code for the barcode channel.
    pub fn with_auth_code(mut self, auth_code: impl Into<String>) -> Self {
        self.auth_code = Some(auth_code.into());
        self
    }

    /// Sets the relative expiry.
    pub fn with_timeout_express(mut self, timeout: impl Into<String>) -> Self {
        self.timeout_express = Some(timeout.into());
        self
    }

    /// Sets the store id.
    pub fn with_store_id(mut self, store_id: impl Into<String>) -> Self {
        self.store_id = Some(store_id.into());
        self
    }

    /// Fails with [`GatewayError::InvalidParameter`] naming the first empty
    /// required field.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("out_trade_no", self.out_trade_no.as_str()),
            ("total_amount", self.total_amount.as_str()),
            ("subject", self.subject.as_str()),
        ];
        first_empty(&required)
    }

    /// Serializes the order as the `biz_content` parameter.
    pub fn to_biz_content(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Fails on the first `(name, value)` pair whose value is blank.
pub(crate) fn first_empty(fields: &[(&str, &str)]) -> Result<()> {
    match fields.iter().find(|(_, v)| v.trim().is_empty()) {
        Some((name, _)) => Err(GatewayError::InvalidParameter(name.to_string())),
        None => Ok(()),
    }
}

/// Inbound view of a gateway response or asynchronous notification.
///
/// Every field defaults to empty; callers decide which ones they need.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct NotifyModel {
    /// Trade status (e.g. "TRADE_SUCCESS")
    pub trade_status: String,

    /// Gateway trade id
    pub trade_no: String,

    /// Merchant order id
    pub out_trade_no: String,

    /// Signature; for responses, copied from the enclosing envelope
    pub sign: String,

    /// Signature algorithm tag
    pub sign_type: String,

    /// One-time notification id
    pub notify_id: String,

    /// QR payload returned by the scan channel
    pub qr_code: String,

    /// Business result code ("10000" on success)
    pub code: String,

    /// Business result message
    pub msg: String,

    /// Detailed failure code
    pub sub_code: String,

    /// Detailed failure message
    pub sub_msg: String,

    /// Amount in yuan
    pub total_amount: String,

    /// Masked buyer account
    pub buyer_logon_id: String,

    /// Application id the notification was issued for
    pub app_id: String,
}

impl NotifyModel {
    /// Builds the typed view from parsed parameters.
    ///
    /// Absent fields stay empty; fields the model does not know are ignored.
    pub fn from_params(params: &ParameterBag) -> Self {
        let field = |key: &str| params.get_or_default(key).to_string();
        Self {
            trade_status: field(keys::TRADE_STATUS),
            trade_no: field("trade_no"),
            out_trade_no: field(keys::OUT_TRADE_NO),
            sign: field(keys::SIGN),
            sign_type: field(keys::SIGN_TYPE),
            notify_id: field(keys::NOTIFY_ID),
            qr_code: field("qr_code"),
            code: field("code"),
            msg: field("msg"),
            sub_code: field("sub_code"),
            sub_msg: field("sub_msg"),
            total_amount: field("total_amount"),
            buyer_logon_id: field("buyer_logon_id"),
            app_id: field(keys::APP_ID),
        }
    }

    /// Parsed trade status.
    pub fn status(&self) -> TradeStatus {
        TradeStatus::parse(&self.trade_status)
    }

    /// Returns true when the trade reached the paid sentinel.
    pub fn is_paid(&self) -> bool {
        self.status() == TradeStatus::Success
    }

    /// Returns true when the gateway accepted the call itself.
    pub fn is_business_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }

    /// Converts a business failure into [`GatewayError::GatewayRejected`].
    ///
    /// Responses without a `code` field pass through unchanged.
    pub fn ensure_business_success(self) -> Result<Self> {
        if self.code.is_empty() || self.is_business_success() {
            Ok(self)
        } else {
            Err(GatewayError::GatewayRejected {
                code: self.code,
                msg: self.msg,
                sub_code: self.sub_code,
                sub_msg: self.sub_msg,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_biz_content_skips_unset() {
        let order = OrderModel::new("1001", "9.00", "Coffee").with_auth_code("28763443825664394");
        let json = order.to_biz_content().unwrap();

        assert!(json.contains(r#""auth_code":"28763443825664394""#));
        assert!(!json.contains("product_code"));
        assert!(!json.contains("scene"));
    }

    #[test]
    fn test_order_validate_names_first_missing() {
        let order = OrderModel::new("", "", "Coffee");
        assert!(matches!(
            order.validate(),
            Err(GatewayError::InvalidParameter(f)) if f == "out_trade_no"
        ));

        let order = OrderModel::new("1001", " ", "Coffee");
        assert!(matches!(
            order.validate(),
            Err(GatewayError::InvalidParameter(f)) if f == "total_amount"
        ));

        assert!(OrderModel::new("1001", "9.00", "Coffee").validate().is_ok());
    }

    #[test]
    fn test_trade_status_parsing() {
        assert_eq!(TradeStatus::parse("TRADE_SUCCESS"), TradeStatus::Success);
        assert_eq!(TradeStatus::parse("WAIT_BUYER_PAY"), TradeStatus::WaitBuyerPay);
        assert_eq!(TradeStatus::parse(""), TradeStatus::Unknown(String::new()));
        assert_eq!(TradeStatus::Closed.as_str(), "TRADE_CLOSED");
    }

    #[test]
    fn test_notify_model_from_params() {
        let mut params = ParameterBag::new();
        params.add("trade_status", "TRADE_SUCCESS");
        params.add("out_trade_no", "1001");
        params.add("unrelated", "ignored");

        let notify = NotifyModel::from_params(&params);
        assert_eq!(notify.out_trade_no, "1001");
        assert!(notify.is_paid());
        assert!(notify.sign.is_empty());
    }

    #[test]
    fn test_ensure_business_success() {
        let ok = NotifyModel {
            code: "10000".into(),
            ..Default::default()
        };
        assert!(ok.ensure_business_success().is_ok());

        let failed = NotifyModel {
            code: "40004".into(),
            sub_code: "ACQ.TRADE_NOT_EXIST".into(),
            ..Default::default()
        };
        assert!(matches!(
            failed.ensure_business_success(),
            Err(GatewayError::GatewayRejected { sub_code, .. }) if sub_code == "ACQ.TRADE_NOT_EXIST"
        ));
    }
}
