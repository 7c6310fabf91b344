//! Terminal payment events raised to the host.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// Outcome of a transaction, raised exactly once.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PaymentEvent {
    /// The gateway confirmed the payment
    PaymentSucceeded {
        /// Merchant order id
        out_trade_no: String,
        /// Gateway trade id, when known
        trade_no: String,
    },
    /// The transaction ended without payment
    PaymentFailed {
        /// Merchant order id
        out_trade_no: String,
        /// Human-readable reason
        reason: String,
    },
}

impl PaymentEvent {
    /// Merchant order id this event refers to.
    pub fn out_trade_no(&self) -> &str {
        match self {
            PaymentEvent::PaymentSucceeded { out_trade_no, .. }
            | PaymentEvent::PaymentFailed { out_trade_no, .. } => out_trade_no,
        }
    }
}

/// Receives payment events.
pub trait EventSink: Send + Sync {
    /// Called once per terminal outcome.
    fn emit(&self, event: PaymentEvent);
}

/// Discards events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: PaymentEvent) {}
}

/// Forwards events into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: UnboundedSender<PaymentEvent>,
}

impl ChannelSink {
    /// Wraps the sending half of a channel.
    pub fn new(sender: UnboundedSender<PaymentEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: PaymentEvent) {
        if let Err(e) = self.sender.send(event) {
            warn!(out_trade_no = %e.0.out_trade_no(), "payment event dropped: receiver closed");
        }
    }
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PaymentEvent>>,
}

impl RecordingSink {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    pub fn events(&self) -> Vec<PaymentEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: PaymentEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
