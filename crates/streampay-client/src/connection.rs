use std::future::Future;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Request for an invoice covering one part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRequest {
    pub counterparty_id: String,
    pub amount: u64,
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub invoice: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayRequest {
    pub invoice: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub payment_hash: String,
}

/// Remote payment backend.
///
/// Every call may take arbitrarily long; callers are expected to bound them
/// with their own timeout.
pub trait PaymentClient: Send + Sync + 'static {
    /// Whether the backend can be reached at all.
    fn check_connection(&self) -> impl Future<Output = bool> + Send;

    /// Estimated network fee for paying `amount` to `counterparty_id`.
    fn quote_fee(
        &self,
        counterparty_id: &str,
        amount: u64,
    ) -> impl Future<Output = Result<u64>> + Send;

    fn create_invoice(&self, request: InvoiceRequest)
    -> impl Future<Output = Result<Invoice>> + Send;

    fn pay_invoice(&self, request: PayRequest) -> impl Future<Output = Result<Receipt>> + Send;
}
