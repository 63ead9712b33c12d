// In-process payment backend with scripted replies, for engine tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::connection::{Invoice, InvoiceRequest, PayRequest, PaymentClient, Receipt};

/// How the next call of a given kind behaves.
#[derive(Debug, Clone)]
pub enum Scripted {
    Succeed,
    Fail(String),
    /// Never resolves.
    Hang,
    /// Succeeds after the given (virtual) time.
    Delay(Duration),
}

/// Payment client whose replies are queued up front. Calls beyond the queue
/// succeed immediately.
pub struct ScriptedPaymentClient {
    connected: AtomicBool,
    fee: Mutex<Result<u64, String>>,
    invoice_replies: Mutex<VecDeque<Scripted>>,
    pay_replies: Mutex<VecDeque<Scripted>>,
    invoice_requests: Mutex<Vec<InvoiceRequest>>,
    paid_invoices: Mutex<Vec<String>>,
    counter: AtomicUsize,
}

impl Default for ScriptedPaymentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPaymentClient {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            fee: Mutex::new(Ok(1)),
            invoice_replies: Mutex::new(VecDeque::new()),
            pay_replies: Mutex::new(VecDeque::new()),
            invoice_requests: Mutex::new(Vec::new()),
            paid_invoices: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_fee(&self, fee: Result<u64, String>) {
        *self.fee.lock().unwrap() = fee;
    }

    pub fn push_invoice_reply(&self, reply: Scripted) {
        self.invoice_replies.lock().unwrap().push_back(reply);
    }

    pub fn push_pay_reply(&self, reply: Scripted) {
        self.pay_replies.lock().unwrap().push_back(reply);
    }

    /// Every invoice request seen so far.
    pub fn invoice_requests(&self) -> Vec<InvoiceRequest> {
        self.invoice_requests.lock().unwrap().clone()
    }

    /// Invoices for which a pay call was made, whatever its outcome.
    pub fn paid_invoices(&self) -> Vec<String> {
        self.paid_invoices.lock().unwrap().clone()
    }

    fn next(queue: &Mutex<VecDeque<Scripted>>) -> Scripted {
        queue.lock().unwrap().pop_front().unwrap_or(Scripted::Succeed)
    }

    fn next_id(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

async fn play<T>(step: Scripted, value: T) -> Result<T> {
    match step {
        Scripted::Succeed => Ok(value),
        Scripted::Fail(message) => Err(anyhow!(message)),
        Scripted::Hang => std::future::pending().await,
        Scripted::Delay(delay) => {
            tokio::time::sleep(delay).await;
            Ok(value)
        }
    }
}

impl PaymentClient for ScriptedPaymentClient {
    async fn check_connection(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn quote_fee(&self, _counterparty_id: &str, _amount: u64) -> Result<u64> {
        let fee = self.fee.lock().unwrap().clone();
        fee.map_err(|message| anyhow!(message))
    }

    async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice> {
        let id = self.next_id();
        let invoice = Invoice {
            invoice: format!("lnbc{}n1scripted{id}", request.amount),
        };
        self.invoice_requests.lock().unwrap().push(request);
        let step = Self::next(&self.invoice_replies);
        play(step, invoice).await
    }

    async fn pay_invoice(&self, request: PayRequest) -> Result<Receipt> {
        let receipt = Receipt {
            payment_hash: format!("{:064x}", self.next_id()),
        };
        self.paid_invoices.lock().unwrap().push(request.invoice);
        let step = Self::next(&self.pay_replies);
        play(step, receipt).await
    }
}
