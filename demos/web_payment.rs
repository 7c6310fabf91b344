//! Example of the client-side payment channels.
//!
//! Builds the desktop form, the mobile redirect URL and the in-app order
//! string for one order. None of these channels talk to the gateway.
//!
//! Run with:
//! ```bash
//! cargo run --example web_payment
//! ```
//!
//! Environment variables:
//! - PAYGATE_APP_ID, PAYGATE_PRIVATE_KEY, PAYGATE_NOTIFY_URL: merchant settings
//! - PAYGATE_RETURN_URL: optional browser return page

use paygate::gateway::{AppPayment, FormPayment, GatewayEngine, UrlPayment};
use paygate::transport::ReqwestTransport;
use paygate::types::OrderModel;
use paygate::MerchantConfig;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let config = MerchantConfig::from_env()?;
    println!("🔐 paygate web payment example");
    println!("   App id: {}", config.app_id);
    println!("   Sign type: {}", config.sign_type);
    println!();

    let engine = GatewayEngine::new(config, Arc::new(ReqwestTransport::new()?))?;

    let order_no = format!("DEMO{}", chrono::Local::now().format("%Y%m%d%H%M%S"));
    let order = OrderModel::new(order_no, "0.01", "paygate demo order")
        .with_body("One test item")
        .with_timeout_express("15m");

    println!("🧾 Desktop form:");
    println!("{}", engine.build_form_payment(&order)?);
    println!();

    println!("📱 Mobile URL:");
    println!("{}", engine.build_url_payment(&order)?);
    println!();

    println!("📦 App order string:");
    println!("{}", engine.build_app_payment(&order)?);

    Ok(())
}
