//! Pending invoice models.

use serde::{Deserialize, Serialize};

/// A locally tracked invoice awaiting payment confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingInvoice {
    pub id: i64,
    pub bolt11: String,
    pub payment_hash: String,
    #[serde(default)]
    pub memo: String,
    /// Amount in sats
    pub amount: u64,
    /// Only ever moves from false to true
    pub paid: bool,
    /// Creation time in milliseconds, used for newest-first ordering
    pub timestamp: i64,
}

impl PendingInvoice {
    /// Memo, or a placeholder when the invoice has none.
    pub fn label(&self) -> &str {
        if self.memo.is_empty() {
            "No description"
        } else {
            &self.memo
        }
    }

    /// Unpaid invoices may be removed from the list.
    pub fn is_deletable(&self) -> bool {
        !self.paid
    }
}

/// Request body for generating an invoice.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvoiceRequest {
    pub amount: i64,
    #[serde(default)]
    pub memo: Option<String>,
}

/// Progress of the status poll for one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum PollStatus {
    /// Not polled during this process lifetime
    Idle,
    #[serde(rename_all = "camelCase")]
    Waiting { attempt: u32, max_attempts: u32 },
    Paid,
    Expired,
    Cancelled,
}

impl PollStatus {
    /// Status line shown next to the invoice.
    pub fn status_text(&self) -> &'static str {
        match self {
            PollStatus::Idle => "Not being checked.",
            PollStatus::Waiting { .. } => "Waiting for payment...",
            PollStatus::Paid => "Payment received!",
            PollStatus::Expired => "Invoice expired or unpaid.",
            PollStatus::Cancelled => "Payment check cancelled.",
        }
    }
}

/// An invoice together with its live poll status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceView {
    #[serde(flatten)]
    pub invoice: PendingInvoice,
    pub label: String,
    pub deletable: bool,
    pub poll: PollStatus,
    pub status_text: String,
}

impl InvoiceView {
    pub fn new(invoice: PendingInvoice, poll: PollStatus) -> Self {
        // A paid record outranks whatever the poller last reported.
        let poll = if invoice.paid { PollStatus::Paid } else { poll };
        Self {
            label: invoice.label().to_string(),
            deletable: invoice.is_deletable(),
            status_text: poll.status_text().to_string(),
            poll,
            invoice,
        }
    }
}
