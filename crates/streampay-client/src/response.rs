use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Backend response envelope: `{"ok": true, ...data}` or
/// `{"ok": false, "error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse<T> {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T> PaymentResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            data: None,
        }
    }

    /// Convert into a `Result`, turning `ok: false` into an error carrying the
    /// backend's message.
    pub fn into_result(self) -> Result<T> {
        if !self.ok {
            return Err(anyhow!(
                self.error
                    .unwrap_or_else(|| "payment backend reported a failure".to_string())
            ));
        }
        self.data
            .ok_or_else(|| anyhow!("invalid response: missing payload"))
    }
}

/// Fee quote payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub fee: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Invoice, Receipt};

    #[test]
    fn test_success_response() {
        let resp = PaymentResponse::success(FeeQuote { fee: 3 });
        assert!(resp.ok);
        assert_eq!(resp.into_result().unwrap().fee, 3);
    }

    #[test]
    fn test_failure_response() {
        let resp: PaymentResponse<FeeQuote> = PaymentResponse::failure("no route");
        assert!(!resp.ok);
        assert_eq!(resp.into_result().unwrap_err().to_string(), "no route");
    }

    #[test]
    fn test_parse_invoice_success() {
        let resp: PaymentResponse<Invoice> =
            serde_json::from_str(r#"{"ok":true,"invoice":"lnbc1"}"#).unwrap();
        assert_eq!(resp.into_result().unwrap().invoice, "lnbc1");
    }

    #[test]
    fn test_parse_payment_failure() {
        let resp: PaymentResponse<Receipt> =
            serde_json::from_str(r#"{"ok":false,"error":"insufficient balance"}"#).unwrap();
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.to_string(), "insufficient balance");
    }

    #[test]
    fn test_ok_without_payload_is_invalid() {
        let resp: PaymentResponse<Receipt> = serde_json::from_str(r#"{"ok":true}"#).unwrap();
        let err = resp.into_result().unwrap_err();
        assert!(err.to_string().contains("invalid response"));
    }

    #[test]
    fn test_failure_without_message() {
        let resp: PaymentResponse<Receipt> = serde_json::from_str(r#"{"ok":false}"#).unwrap();
        assert!(resp.into_result().is_err());
    }
}
