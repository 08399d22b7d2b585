//! Payment and balance models.

use serde::{Deserialize, Serialize};

/// Request body for paying a bolt11 invoice.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayInvoiceRequest {
    #[serde(default)]
    pub bolt11: String,
    #[serde(default)]
    pub worker_id: Option<i64>,
}

/// Wallet balance as shown on the dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceReport {
    pub balance_msat: i64,
    pub balance_sats: f64,
    pub display: String,
    /// Connectivity problem; the balance then reads zero
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a successful outgoing payment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub payment_hash: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<i64>,
    pub balance: BalanceReport,
}
