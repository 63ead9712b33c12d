use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::connection::{Invoice, InvoiceRequest, PayRequest, PaymentClient, Receipt};
use crate::response::{FeeQuote, PaymentResponse};

const USER_AGENT: &str = concat!("streampay/", env!("CARGO_PKG_VERSION"));

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeeRequest<'a> {
    counterparty_id: &'a str,
    amount: u64,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// JSON-over-HTTP payment backend.
pub struct HttpPaymentClient {
    client: Client,
    base_url: String,
}

impl HttpPaymentClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.post(&url).json(body).send().await?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| anyhow!("invalid response from {path}: {e}"))?;

        if !status.is_success() {
            // A backend rejection may still carry its reason in the envelope.
            if let Ok(ErrorBody { error: Some(error) }) =
                serde_json::from_slice::<ErrorBody>(&bytes)
            {
                return Err(anyhow!(error));
            }
            return Err(anyhow!("invalid response from {path}: HTTP {status}"));
        }

        let parsed: PaymentResponse<T> = serde_json::from_slice(&bytes)
            .map_err(|e| anyhow!("invalid response from {path}: {e}"))?;
        parsed.into_result()
    }
}

impl PaymentClient for HttpPaymentClient {
    async fn check_connection(&self) -> bool {
        let url = format!("{}/api/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                log::debug!("payment backend health check failed: {}", e);
                false
            }
        }
    }

    async fn quote_fee(&self, counterparty_id: &str, amount: u64) -> Result<u64> {
        let quote: FeeQuote = self
            .post(
                "/api/fee",
                &FeeRequest {
                    counterparty_id,
                    amount,
                },
            )
            .await?;
        Ok(quote.fee)
    }

    async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice> {
        self.post("/api/invoice", &request).await
    }

    async fn pay_invoice(&self, request: PayRequest) -> Result<Receipt> {
        self.post("/api/pay", &request).await
    }
}
