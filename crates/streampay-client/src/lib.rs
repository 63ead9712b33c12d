// Payment backend: client contract, HTTP implementation, error classification

pub mod connection;
pub mod http;
pub mod offline;
pub mod response;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use connection::{Invoice, InvoiceRequest, PayRequest, PaymentClient, Receipt};
pub use http::HttpPaymentClient;
pub use offline::is_unreachable;
pub use response::{FeeQuote, PaymentResponse};
