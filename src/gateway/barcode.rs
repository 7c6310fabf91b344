//! Barcode (merchant-scans-customer) payment loop.
//!
//! ```text
//! Paying -> Waiting(1) -> Querying(1) -> Waiting(2) -> ... -> Querying(n)
//!                              |                                   |
//!                              +--> Succeeded        Cancelling <--+
//!                                                         |
//!                                                         +--> Failed
//! ```
//!
//! Every path ends in exactly one [`PaymentEvent`]. A host cancellation is
//! only observed while waiting; it moves straight to `Cancelling`.

use super::GatewayEngine;
use crate::errors::Result;
use crate::events::PaymentEvent;
use crate::types::{responses, NotifyModel, OrderModel};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a barcode payment ended unpaid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Every query attempt passed without the paid status
    AttemptsExhausted,
    /// The host cancelled the wait
    Abandoned,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::AttemptsExhausted => write!(f, "payment not confirmed in time"),
            FailureReason::Abandoned => write!(f, "payment abandoned by merchant"),
        }
    }
}

/// Terminal result of a barcode payment.
#[derive(Debug, Clone, PartialEq)]
pub enum BarcodeOutcome {
    /// A query returned the paid status
    Paid(NotifyModel),
    /// The order was cancelled at the gateway
    Failed {
        /// Why polling stopped
        reason: FailureReason,
        /// Whether the gateway acknowledged the cancel request
        cancel_confirmed: bool,
    },
}

impl BarcodeOutcome {
    /// Returns true for [`BarcodeOutcome::Paid`].
    pub fn is_paid(&self) -> bool {
        matches!(self, BarcodeOutcome::Paid(_))
    }
}

#[derive(Debug)]
enum State {
    Paying,
    Waiting(u32),
    Querying(u32),
    Cancelling(FailureReason),
    Done(BarcodeOutcome),
}

pub(super) async fn run(
    engine: &GatewayEngine,
    order: &OrderModel,
    cancel: &CancellationToken,
) -> Result<BarcodeOutcome> {
    // Nothing is submitted unless the pay request is valid.
    let pay = engine.init_barcode_payment(order)?;
    let out_trade_no = order.out_trade_no.as_str();
    let policy = engine.polling;

    let mut state = State::Paying;
    loop {
        state = match state {
            State::Paying => {
                match engine.commit(&pay, responses::PAY).await {
                    Ok(response) => debug!(
                        out_trade_no,
                        code = %response.code,
                        trade_status = %response.trade_status,
                        "barcode pay submitted"
                    ),
                    Err(e) => warn!(out_trade_no, error = %e, "barcode pay call failed, polling anyway"),
                }
                State::Waiting(1)
            }
            State::Waiting(attempt) if attempt > policy.attempts => {
                State::Cancelling(FailureReason::AttemptsExhausted)
            }
            State::Waiting(attempt) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => State::Cancelling(FailureReason::Abandoned),
                    _ = engine.clock.sleep(policy.interval) => State::Querying(attempt),
                }
            }
            State::Querying(attempt) => match engine.query(out_trade_no).await {
                Ok(response) if response.is_paid() => State::Done(BarcodeOutcome::Paid(response)),
                Ok(response) => {
                    debug!(out_trade_no, attempt, trade_status = %response.trade_status, "not paid yet");
                    State::Waiting(attempt + 1)
                }
                Err(e) => {
                    warn!(out_trade_no, attempt, error = %e, "barcode query failed");
                    State::Waiting(attempt + 1)
                }
            },
            State::Cancelling(reason) => {
                let cancel_confirmed = match engine.cancel(out_trade_no).await {
                    Ok(response) => response.is_business_success(),
                    Err(e) => {
                        warn!(out_trade_no, error = %e, "barcode cancel failed");
                        false
                    }
                };
                State::Done(BarcodeOutcome::Failed {
                    reason,
                    cancel_confirmed,
                })
            }
            State::Done(outcome) => {
                engine.events.emit(event_for(out_trade_no, &outcome));
                info!(out_trade_no, paid = outcome.is_paid(), "barcode payment finished");
                return Ok(outcome);
            }
        };
    }
}

fn event_for(out_trade_no: &str, outcome: &BarcodeOutcome) -> PaymentEvent {
    match outcome {
        BarcodeOutcome::Paid(response) => PaymentEvent::PaymentSucceeded {
            out_trade_no: out_trade_no.to_string(),
            trade_no: response.trade_no.clone(),
        },
        BarcodeOutcome::Failed { reason, .. } => PaymentEvent::PaymentFailed {
            out_trade_no: out_trade_no.to_string(),
            reason: reason.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::config::{MerchantConfig, PollingPolicy};
    use crate::errors::GatewayError;
    use crate::events::RecordingSink;
    use crate::gateway::BarcodePayment;
    use crate::params::ParameterBag;
    use crate::signer::SignType;
    use crate::transport::HttpTransport;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct InstantClock;

    #[async_trait]
    impl Clock for InstantClock {
        fn now(&self) -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        }

        async fn sleep(&self, _duration: Duration) {
            tokio::task::yield_now().await;
        }
    }

    /// Answers pay/cancel with success, queries with WAIT_BUYER_PAY until
    /// `paid_on` (1-based) and TRADE_SUCCESS from then on.
    struct Gateway {
        paid_on: Option<usize>,
        methods: Mutex<Vec<String>>,
    }

    impl Gateway {
        fn new(paid_on: Option<usize>) -> Self {
            Self {
                paid_on,
                methods: Mutex::new(Vec::new()),
            }
        }

        fn count(&self, method: &str) -> usize {
            self.methods
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.as_str() == method)
                .count()
        }
    }

    #[async_trait]
    impl HttpTransport for Gateway {
        async fn post_form(&self, _url: &str, body: &str) -> crate::Result<String> {
            let mut params = ParameterBag::new();
            params.load_from_query_string(body);
            let method = params.get_or_default("method").to_string();
            self.methods.lock().unwrap().push(method.clone());

            let body = match method.as_str() {
                "alipay.trade.pay" => {
                    r#"{"alipay_trade_pay_response":{"code":"10003","msg":"USER_PAYING"},"sign":"s"}"#
                        .to_string()
                }
                "alipay.trade.query" => {
                    let queries = self.count("alipay.trade.query");
                    let status = match self.paid_on {
                        Some(n) if queries >= n => "TRADE_SUCCESS",
                        _ => "WAIT_BUYER_PAY",
                    };
                    format!(
                        r#"{{"alipay_trade_query_response":{{"code":"10000","trade_no":"T1","trade_status":"{}"}},"sign":"s"}}"#,
                        status
                    )
                }
                "alipay.trade.cancel" => {
                    r#"{"alipay_trade_cancel_response":{"code":"10000","msg":"Success"},"sign":"s"}"#
                        .to_string()
                }
                other => panic!("unexpected method {}", other),
            };
            Ok(body)
        }

        async fn get_page(&self, _url: &str) -> crate::Result<String> {
            Err(GatewayError::TransportFailure("unused".into()))
        }
    }

    fn engine(gateway: Arc<Gateway>, sink: Arc<RecordingSink>) -> GatewayEngine {
        let config = MerchantConfig::new("2021", "secret").with_sign_type(SignType::HmacSha256);
        GatewayEngine::new(config, gateway)
            .unwrap()
            .with_clock(Arc::new(InstantClock))
            .with_event_sink(sink)
    }

    fn order() -> OrderModel {
        OrderModel::new("1001", "5.00", "Bread").with_auth_code("287654321")
    }

    #[tokio::test]
    async fn test_paid_on_second_query() {
        let gateway = Arc::new(Gateway::new(Some(2)));
        let sink = Arc::new(RecordingSink::new());
        let outcome = engine(gateway.clone(), sink.clone())
            .build_barcode_payment(&order(), CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_paid());
        assert_eq!(gateway.count("alipay.trade.query"), 2);
        assert_eq!(gateway.count("alipay.trade.cancel"), 0);
        assert_eq!(
            sink.events(),
            vec![PaymentEvent::PaymentSucceeded {
                out_trade_no: "1001".into(),
                trade_no: "T1".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_zero_attempts_cancels_immediately() {
        let gateway = Arc::new(Gateway::new(Some(1)));
        let sink = Arc::new(RecordingSink::new());
        let outcome = engine(gateway.clone(), sink.clone())
            .with_polling(PollingPolicy::new(0, Duration::from_secs(5)))
            .build_barcode_payment(&order(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            BarcodeOutcome::Failed {
                reason: FailureReason::AttemptsExhausted,
                cancel_confirmed: true,
            }
        );
        assert_eq!(gateway.count("alipay.trade.query"), 0);
        assert_eq!(gateway.count("alipay.trade.cancel"), 1);
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_auth_code_submits_nothing() {
        let gateway = Arc::new(Gateway::new(None));
        let sink = Arc::new(RecordingSink::new());
        let err = engine(gateway.clone(), sink.clone())
            .build_barcode_payment(
                &OrderModel::new("1001", "5.00", "Bread"),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::InvalidParameter(f) if f == "auth_code"));
        assert!(gateway.methods.lock().unwrap().is_empty());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_failure_event_reason() {
        let event = event_for(
            "1001",
            &BarcodeOutcome::Failed {
                reason: FailureReason::Abandoned,
                cancel_confirmed: false,
            },
        );
        assert_eq!(
            event,
            PaymentEvent::PaymentFailed {
                out_trade_no: "1001".into(),
                reason: "payment abandoned by merchant".into(),
            }
        );
    }
}
