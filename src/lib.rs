//! # paygate
//!
//! A Rust protocol engine for signed-request payment gateways of the Alipay
//! open-platform family.
//!
//! The engine turns a merchant order into the exact signed parameter set the
//! gateway expects, submits it over HTTP where the channel needs a server call,
//! parses the response envelope, and validates the asynchronous notifications
//! the gateway sends back.
//!
//! ## Features
//!
//! - **Form payment**: Auto-submitting HTML form for desktop browsers
//! - **URL payment**: Signed redirect URL for mobile browsers
//! - **App payment**: Signed order string for the client SDK
//! - **Scan payment**: Pre-created order returning a QR payload
//! - **Barcode payment**: Pay, poll, and cancel on timeout, with cancellation
//! - **Notifications**: Status, signature and `notify_id` checks before trust
//! - **Signing**: RSA2 (SHA256withRSA) and HMAC-SHA256
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paygate::config::MerchantConfig;
//! use paygate::gateway::{FormPayment, GatewayEngine};
//! use paygate::transport::ReqwestTransport;
//! use paygate::types::OrderModel;
//! use std::sync::Arc;
//!
//! # fn example() -> paygate::Result<()> {
//! let config = MerchantConfig::from_env()?;
//! let engine = GatewayEngine::new(config, Arc::new(ReqwestTransport::new()?))?;
//!
//! let html = engine.build_form_payment(&OrderModel::new("20240101001", "0.01", "Test order"))?;
//! println!("{}", html);
//! # Ok(())
//! # }
//! ```
//!
//! ## Protocol Overview
//!
//! Every outbound call follows the same steps:
//!
//! 1. **Stamp**: the channel writes its `method`, `product_code` and `scene`
//! 2. **Serialize**: the order becomes the `biz_content` JSON parameter
//! 3. **Sign**: parameters are sorted by key, empty values dropped, and the
//!    `k=v&k=v` string is signed
//! 4. **Validate**: a blank required field aborts before any network call
//! 5. **Submit**: server-side channels POST the form body and unwrap the
//!    `<operation>_response` envelope
//!
//! ## Security
//!
//! A notification is trusted only after the trade status is paid, the
//! signature verifies over the canonical string, and the gateway confirms the
//! `notify_id`. Keys and signing input never appear in errors or logs.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod clock;
pub mod config;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod notify;
pub mod params;
pub mod request;
pub mod signer;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use config::{MerchantConfig, PollingPolicy};
pub use errors::{GatewayError, Result};
pub use events::{EventSink, PaymentEvent};
pub use gateway::{
    AppPayment, BarcodeOutcome, BarcodePayment, FormPayment, Gateway, GatewayEngine,
    NotifyVerification, ScanPayment, UrlPayment,
};
pub use notify::{NotifyOutcome, NotifyValidator};
pub use params::ParameterBag;
pub use signer::{SignType, Signer};
pub use types::{NotifyModel, OrderModel, TradeStatus};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_accessibility() {
        let config = MerchantConfig::new("2021", "secret").with_sign_type(SignType::HmacSha256);
        let transport = std::sync::Arc::new(transport::ReqwestTransport::new().unwrap());
        let engine = GatewayEngine::new(config, transport).unwrap();
        assert_eq!(engine.name(), "alipay");
        assert_eq!(engine.gateway_url(), config::DEFAULT_GATEWAY_URL);
    }
}
