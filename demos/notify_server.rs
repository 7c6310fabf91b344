//! Example merchant web server using Axum.
//!
//! Serves checkout pages for the form and mobile-URL channels and receives the
//! gateway's asynchronous notifications.
//!
//! Run with:
//! ```bash
//! cargo run --example notify_server
//! ```
//!
//! Environment variables:
//! - PAYGATE_APP_ID, PAYGATE_PRIVATE_KEY, PAYGATE_PUBLIC_KEY: merchant credentials
//! - PAYGATE_NOTIFY_URL: public URL of `/notify` on this server
//! - PORT: Server port (default: 3000)

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use paygate::gateway::{FormPayment, GatewayEngine, UrlPayment};
use paygate::notify::{success_ack, NotifyOutcome, RejectReason};
use paygate::transport::ReqwestTransport;
use paygate::types::OrderModel;
use paygate::MerchantConfig;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
struct AppState {
    engine: GatewayEngine,
}

#[derive(Deserialize)]
struct Checkout {
    out_trade_no: String,
    total_amount: String,
    subject: String,
}

impl Checkout {
    fn order(self) -> OrderModel {
        OrderModel::new(self.out_trade_no, self.total_amount, self.subject)
    }
}

/// Desktop checkout: renders the auto-submitting form.
async fn form_handler(
    State(state): State<Arc<AppState>>,
    Query(checkout): Query<Checkout>,
) -> Result<Response, AppError> {
    let html = state.engine.build_form_payment(&checkout.order())?;
    Ok(Html(html).into_response())
}

/// Mobile checkout: redirects to the gateway.
async fn wap_handler(
    State(state): State<Arc<AppState>>,
    Query(checkout): Query<Checkout>,
) -> Result<Response, AppError> {
    let url = state.engine.build_url_payment(&checkout.order())?;
    Ok(Redirect::to(&url).into_response())
}

/// Gateway notification endpoint.
///
/// Trusted and genuinely unpaid notifications are acknowledged. Integrity and
/// verification failures answer `fail` so the gateway retries later.
async fn notify_handler(State(state): State<Arc<AppState>>, body: String) -> Response {
    match state.engine.notify_validator().validate_query_string(&body).await {
        NotifyOutcome::Trusted(notify) => {
            println!(
                "✅ Order {} paid (trade {}, amount {})",
                notify.out_trade_no, notify.trade_no, notify.total_amount
            );
            (StatusCode::OK, success_ack()).into_response()
        }
        NotifyOutcome::Rejected {
            reason: RejectReason::NotPaid(status),
            notify,
            ..
        } => {
            println!("ℹ️  Order {} is {}, nothing to do", notify.out_trade_no, status);
            (StatusCode::OK, success_ack()).into_response()
        }
        NotifyOutcome::Rejected { reason, .. } => {
            println!("⚠️  Notification rejected: {}", reason);
            (StatusCode::OK, "fail").into_response()
        }
        NotifyOutcome::TransportError(e) => {
            println!("❌ Notification check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "fail").into_response()
        }
    }
}

/// Root endpoint with information.
async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "message": "paygate example merchant",
        "endpoints": {
            "/pay/form?out_trade_no=&total_amount=&subject=": "Desktop checkout",
            "/pay/wap?out_trade_no=&total_amount=&subject=": "Mobile checkout",
            "/notify": "Gateway notifications (POST)"
        },
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()?;

    let config = MerchantConfig::from_env()?;
    println!("🚀 Starting paygate example merchant");
    println!("   App id: {}", config.app_id);
    println!("   Notify URL: {}", config.notify_url);
    println!("   Port: {}", port);

    let engine = GatewayEngine::new(config, Arc::new(ReqwestTransport::new()?))?;
    let state = Arc::new(AppState { engine });

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/pay/form", get(form_handler))
        .route("/pay/wap", get(wap_handler))
        .route("/notify", post(notify_handler))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("✅ Server listening on http://{}", addr);
    println!("\nTry:");
    println!(
        "  open 'http://localhost:{}/pay/form?out_trade_no=1001&total_amount=0.01&subject=Test'",
        port
    );
    println!();

    axum::serve(listener, app).await?;

    Ok(())
}

// Error handling
struct AppError(paygate::GatewayError);

impl From<paygate::GatewayError> for AppError {
    fn from(e: paygate::GatewayError) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            paygate::GatewayError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
