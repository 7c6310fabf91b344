//! Validation of asynchronous payment notifications.
//!
//! A notification is only authoritative once it has passed three gates in
//! order:
//!
//! 1. **Parameter check** - `trade_status` equals the paid sentinel
//! 2. **Signature check** - the signature recomputed over every received field
//!    (minus `sign` and `sign_type`) matches the attached one
//! 3. **Notify id check** - the gateway confirms the one-time `notify_id`
//!    through a second, independent request
//!
//! Failing a gate is an ordinary [`NotifyOutcome::Rejected`], not an error. A
//! missing or wrong signature is additionally logged on the `paygate::security`
//! target so integrity violations can be routed apart from unpaid orders.

use crate::config::MerchantConfig;
use crate::errors::{GatewayError, Result};
use crate::params::ParameterBag;
use crate::signer::Signer;
use crate::transport::HttpTransport;
use crate::types::{keys, NotifyModel, NOTIFY_ACK};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Progress of a notification through the validation gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyState {
    /// Parsed, nothing checked yet
    Received,
    /// Trade status is the paid sentinel
    ParameterChecked,
    /// Signature matches
    SignatureChecked,
    /// Gateway confirmed the notify id
    IdVerified,
    /// All gates passed
    Trusted,
}

/// Why a notification was not trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Trade status is not the paid sentinel (carries the received status)
    NotPaid(String),
    /// Recomputed signature differs from the attached one, or none was attached
    SignatureMismatch,
    /// The gateway did not confirm the notify id
    NotifyIdInvalid,
    /// A field needed for validation was absent or empty
    MissingField(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotPaid(status) => write!(f, "trade status '{}' is not paid", status),
            RejectReason::SignatureMismatch => f.write_str("signature mismatch"),
            RejectReason::NotifyIdInvalid => f.write_str("notify id not confirmed by gateway"),
            RejectReason::MissingField(name) => write!(f, "missing field '{}'", name),
        }
    }
}

/// Result of the validation pipeline.
#[derive(Debug)]
pub enum NotifyOutcome {
    /// All gates passed; the notification proves payment
    Trusted(NotifyModel),
    /// A gate failed
    Rejected {
        /// Failing gate
        reason: RejectReason,
        /// Last gate passed before the rejection
        reached: NotifyState,
        /// Parsed notification, for the host's records
        notify: NotifyModel,
    },
    /// The notify id confirmation round-trip could not be completed
    TransportError(GatewayError),
}

impl NotifyOutcome {
    /// Returns true only for [`NotifyOutcome::Trusted`].
    pub fn is_trusted(&self) -> bool {
        matches!(self, NotifyOutcome::Trusted(_))
    }

    /// Maps the outcome onto the crate error taxonomy.
    ///
    /// An unpaid status becomes [`GatewayError::NotPaid`]; missing fields
    /// become [`GatewayError::MissingKey`].
    pub fn into_result(self) -> Result<NotifyModel> {
        match self {
            NotifyOutcome::Trusted(notify) => Ok(notify),
            NotifyOutcome::TransportError(e) => Err(e),
            NotifyOutcome::Rejected { reason, notify, .. } => Err(match reason {
                RejectReason::NotPaid(status) => GatewayError::NotPaid(status),
                RejectReason::SignatureMismatch => {
                    GatewayError::SignatureMismatch(format!("notification for order {}", notify.out_trade_no))
                }
                RejectReason::NotifyIdInvalid => GatewayError::NotifyIdInvalid(notify.notify_id),
                RejectReason::MissingField(name) => GatewayError::MissingKey(name),
            }),
        }
    }
}

/// Body the host must write back to the gateway after accepting a
/// notification; anything else makes the gateway retry delivery.
pub fn success_ack() -> &'static str {
    NOTIFY_ACK
}

/// Runs the notification gates for one merchant.
#[derive(Clone)]
pub struct NotifyValidator {
    app_id: String,
    gateway_url: String,
    signer: Arc<dyn Signer>,
    transport: Arc<dyn HttpTransport>,
}

impl NotifyValidator {
    /// Creates a validator.
    pub fn new(
        config: &MerchantConfig,
        signer: Arc<dyn Signer>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            app_id: config.app_id.clone(),
            gateway_url: config.gateway_url.clone(),
            signer,
            transport,
        }
    }

    /// Validates a notification delivered as a form body or query string.
    pub async fn validate_query_string(&self, raw: &str) -> NotifyOutcome {
        let mut params = ParameterBag::new();
        params.load_from_query_string(raw);
        self.validate(&params).await
    }

    /// Validates already-parsed notification fields.
    pub async fn validate(&self, params: &ParameterBag) -> NotifyOutcome {
        let notify = NotifyModel::from_params(params);
        debug!(out_trade_no = %notify.out_trade_no, "notification received");

        if !notify.is_paid() {
            info!(
                out_trade_no = %notify.out_trade_no,
                trade_status = %notify.trade_status,
                "notification rejected: not paid"
            );
            let status = notify.trade_status.clone();
            return reject(RejectReason::NotPaid(status), NotifyState::Received, notify);
        }

        // An unsigned paid notification is treated like a wrong signature.
        let signature_ok = !notify.sign.is_empty() && {
            let canonical = params.to_canonical_query_string(&[keys::SIGN, keys::SIGN_TYPE]);
            match self.signer.verify(&canonical, &notify.sign) {
                Ok(ok) => ok,
                Err(e) => {
                    error!(target: "paygate::security", error = %e, "notification signature could not be checked");
                    false
                }
            }
        };
        if !signature_ok {
            error!(
                target: "paygate::security",
                out_trade_no = %notify.out_trade_no,
                notify_id = %notify.notify_id,
                signed = !notify.sign.is_empty(),
                "notification signature mismatch: possible forgery"
            );
            return reject(RejectReason::SignatureMismatch, NotifyState::ParameterChecked, notify);
        }

        if notify.notify_id.is_empty() {
            return reject(
                RejectReason::MissingField(keys::NOTIFY_ID.to_string()),
                NotifyState::SignatureChecked,
                notify,
            );
        }

        match self.confirm_notify_id(&notify.notify_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    out_trade_no = %notify.out_trade_no,
                    notify_id = %notify.notify_id,
                    "notification rejected: notify id not confirmed"
                );
                return reject(RejectReason::NotifyIdInvalid, NotifyState::SignatureChecked, notify);
            }
            Err(e) => {
                warn!(out_trade_no = %notify.out_trade_no, error = %e, "notify id confirmation failed");
                return NotifyOutcome::TransportError(e);
            }
        }

        info!(out_trade_no = %notify.out_trade_no, trade_no = %notify.trade_no, "notification trusted");
        NotifyOutcome::Trusted(notify)
    }

    /// URL of the notify-verification endpoint for `notify_id`.
    pub fn verify_url(&self, notify_id: &str) -> Result<Url> {
        Ok(Url::parse_with_params(
            &self.gateway_url,
            &[
                ("service", "notify_verify"),
                ("partner", self.app_id.as_str()),
                ("notify_id", notify_id),
            ],
        )?)
    }

    async fn confirm_notify_id(&self, notify_id: &str) -> Result<bool> {
        let url = self.verify_url(notify_id)?;
        let body = self.transport.get_page(url.as_str()).await?;
        Ok(is_confirmation(&body))
    }
}

/// Accepts both the plain `true` body and the legacy XML form
/// `<alipay><is_success>T</is_success></alipay>`.
fn is_confirmation(body: &str) -> bool {
    let body = body.trim();
    if body.starts_with('<') {
        return ParameterBag::from_xml(body)
            .map(|params| params.get(keys::IS_SUCCESS) == Some("T"))
            .unwrap_or(false);
    }
    body == "true"
}

fn reject(reason: RejectReason, reached: NotifyState, notify: NotifyModel) -> NotifyOutcome {
    NotifyOutcome::Rejected {
        reason,
        reached,
        notify,
    }
}
