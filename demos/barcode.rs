//! Example point-of-sale barcode payment.
//!
//! Charges the customer's payment code, then polls until the payment is
//! confirmed or the attempts run out. Press Ctrl-C to abandon the wait; the
//! order is cancelled at the gateway either way.
//!
//! Run with:
//! ```bash
//! cargo run --example barcode -- <auth_code> [amount]
//! ```
//!
//! Environment variables:
//! - PAYGATE_APP_ID, PAYGATE_PRIVATE_KEY, PAYGATE_PUBLIC_KEY: merchant credentials
//! - PAYGATE_NOTIFY_URL: notification URL registered for the order

use anyhow::{anyhow, Context};
use paygate::events::ChannelSink;
use paygate::gateway::{BarcodeOutcome, BarcodePayment, GatewayEngine};
use paygate::transport::ReqwestTransport;
use paygate::types::OrderModel;
use paygate::{MerchantConfig, PaymentEvent};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let auth_code = args
        .next()
        .ok_or_else(|| anyhow!("usage: barcode <auth_code> [amount]"))?;
    let amount = args.next().unwrap_or_else(|| "0.01".to_string());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let config = MerchantConfig::from_env().context("loading merchant config")?;
    let engine = GatewayEngine::new(config, Arc::new(ReqwestTransport::new()?))?
        .with_event_sink(Arc::new(ChannelSink::new(tx)));

    let events = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                PaymentEvent::PaymentSucceeded { out_trade_no, trade_no } => {
                    println!("✅ {} paid, trade {}", out_trade_no, trade_no)
                }
                PaymentEvent::PaymentFailed { out_trade_no, reason } => {
                    println!("❌ {} failed: {}", out_trade_no, reason)
                }
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n⏹  Abandoning payment...");
            on_ctrl_c.cancel();
        }
    });

    let order_no = format!("POS{}", chrono::Local::now().format("%Y%m%d%H%M%S"));
    let order = OrderModel::new(order_no, amount, "paygate POS demo").with_auth_code(auth_code);

    println!("💳 Charging {} for order {}...", order.total_amount, order.out_trade_no);
    let outcome = engine.build_barcode_payment(&order, cancel).await?;

    if let BarcodeOutcome::Failed { cancel_confirmed: false, .. } = outcome {
        println!("⚠️  The gateway did not confirm the cancellation; check the order manually.");
    }

    drop(engine);
    events.await?;
    Ok(())
}
