//! Client for the Lightning wallet admin API.
//!
//! Wraps the four remote calls the payroll needs: wallet balance, outgoing
//! payment, invoice creation and invoice status.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{BalanceReport, PaymentReceipt, WalletCredentials, Worker};

/// Header carrying the wallet admin key.
pub const WALLET_KEY_HEADER: &str = "X-Api-Key";

const WALLET_PATH: &str = "api/v1/wallet";
const PAYMENTS_PATH: &str = "api/v1/payments";

/// Wallet details returned by the balance endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletDetails {
    /// Balance in millisatoshis
    pub balance: i64,
}

/// Invoice payload returned when a new invoice is created.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawCreatedInvoice")]
pub struct CreatedInvoice {
    pub payment_hash: String,
    pub bolt11: String,
}

/// Wire shape of a created invoice. Wallets send the payment request as
/// `bolt11`, `payment_request`, or both.
#[derive(Debug, Deserialize)]
struct RawCreatedInvoice {
    payment_hash: String,
    #[serde(default)]
    bolt11: Option<String>,
    #[serde(default)]
    payment_request: Option<String>,
}

impl TryFrom<RawCreatedInvoice> for CreatedInvoice {
    type Error = String;

    fn try_from(raw: RawCreatedInvoice) -> Result<Self, Self::Error> {
        let bolt11 = raw
            .bolt11
            .or(raw.payment_request)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| "created invoice carries no payment request".to_string())?;

        Ok(Self {
            payment_hash: raw.payment_hash,
            bolt11,
        })
    }
}

/// Response of a successful outgoing payment.
#[derive(Debug, Clone, Deserialize)]
pub struct SentPayment {
    pub payment_hash: String,
}

/// Status of a payment looked up by hash.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceStatus {
    #[serde(default)]
    pub paid: bool,
}

#[derive(Debug, Serialize)]
struct OutgoingPaymentBody<'a> {
    out: bool,
    bolt11: &'a str,
}

#[derive(Debug, Serialize)]
struct IncomingInvoiceBody<'a> {
    out: bool,
    amount: u64,
    memo: &'a str,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// HTTP client for the wallet admin API.
#[derive(Debug, Clone)]
pub struct WalletClient {
    http: Client,
}

impl WalletClient {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// GET the wallet and return its balance in millisatoshis.
    pub async fn balance_msat(&self, creds: &WalletCredentials) -> Result<i64, AppError> {
        let response = self
            .http
            .get(format!("{}{}", creds.base_url, WALLET_PATH))
            .header(WALLET_KEY_HEADER, &creds.admin_key)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Wallet balance request rejected");
            return Err(AppError::Wallet(
                "Could not connect to the wallet API. Check the URL and admin key in the wallet settings."
                    .to_string(),
            ));
        }

        let details: WalletDetails = response.json().await?;
        Ok(details.balance)
    }

    /// Pay a bolt11 invoice from the wallet.
    pub async fn pay_invoice(
        &self,
        creds: &WalletCredentials,
        bolt11: &str,
    ) -> Result<SentPayment, AppError> {
        let response = self
            .http
            .post(format!("{}{}", creds.base_url, PAYMENTS_PATH))
            .header(WALLET_KEY_HEADER, &creds.admin_key)
            .json(&OutgoingPaymentBody { out: true, bolt11 })
            .send()
            .await?;

        parse_response(response, "Unknown error while paying").await
    }

    /// Create an invoice for `amount` sats.
    pub async fn create_invoice(
        &self,
        creds: &WalletCredentials,
        amount: u64,
        memo: &str,
    ) -> Result<CreatedInvoice, AppError> {
        let response = self
            .http
            .post(format!("{}{}", creds.base_url, PAYMENTS_PATH))
            .header(WALLET_KEY_HEADER, &creds.admin_key)
            .json(&IncomingInvoiceBody {
                out: false,
                amount,
                memo,
            })
            .send()
            .await?;

        parse_response(response, "Unknown error while creating the invoice").await
    }

    /// Look up whether the invoice behind `payment_hash` has been paid.
    pub async fn invoice_status(
        &self,
        creds: &WalletCredentials,
        payment_hash: &str,
    ) -> Result<InvoiceStatus, AppError> {
        let response = self
            .http
            .get(format!("{}{}/{}", creds.base_url, PAYMENTS_PATH, payment_hash))
            .header(WALLET_KEY_HEADER, &creds.admin_key)
            .send()
            .await?;

        parse_response(response, "Error while checking the invoice").await
    }

    /// Balance for display. Failures degrade to a zero balance carrying the error.
    pub async fn balance_report(&self, creds: &WalletCredentials) -> BalanceReport {
        match self.balance_msat(creds).await {
            Ok(msat) => BalanceReport {
                balance_msat: msat,
                balance_sats: msat as f64 / 1000.0,
                display: format!("{} SATS", format_msat_as_sats(msat)),
                error: None,
            },
            Err(e) => BalanceReport {
                balance_msat: 0,
                balance_sats: 0.0,
                display: "0 SATS".to_string(),
                error: Some(e.message().to_string()),
            },
        }
    }

    /// Pay `bolt11`, attribute it to `worker` if given, and refresh the balance.
    pub async fn pay_and_refresh(
        &self,
        creds: &WalletCredentials,
        bolt11: &str,
        worker: Option<&Worker>,
    ) -> Result<PaymentReceipt, AppError> {
        let payment = self.pay_invoice(creds, bolt11).await?;

        let message = match worker {
            Some(worker) => format!(
                "Payment to {} succeeded. Hash: {}",
                worker.name, payment.payment_hash
            ),
            None => format!("Payment succeeded. Hash: {}", payment.payment_hash),
        };
        tracing::info!(payment_hash = %payment.payment_hash, worker_id = ?worker.map(|w| w.id), "Invoice paid");

        let balance = self.balance_report(creds).await;

        Ok(PaymentReceipt {
            payment_hash: payment.payment_hash,
            message,
            worker_id: worker.map(|w| w.id),
            balance,
        })
    }
}

/// Decode a success body, or turn the remote `detail` into a wallet error.
async fn parse_response<T: DeserializeOwned>(
    response: Response,
    fallback: &str,
) -> Result<T, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<RemoteError>(&body)
        .ok()
        .and_then(|e| e.detail)
        .and_then(|d| d.as_str().map(str::to_string))
        .filter(|d| !d.is_empty());

    tracing::warn!(%status, detail = ?detail, "Wallet API returned an error");
    Err(AppError::Wallet(detail.unwrap_or_else(|| fallback.to_string())))
}

/// Group an integer with `,` every three digits.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Format millisatoshis as grouped sats with up to three fractional digits.
pub fn format_msat_as_sats(msat: i64) -> String {
    let sign = if msat < 0 { "-" } else { "" };
    let abs = msat.unsigned_abs();
    let whole = group_thousands(abs / 1000);
    let frac = abs % 1000;

    if frac == 0 {
        format!("{}{}", sign, whole)
    } else {
        let frac = format!("{:03}", frac);
        format!("{}{}.{}", sign, whole, frac.trim_end_matches('0'))
    }
}
