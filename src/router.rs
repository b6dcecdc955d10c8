// src/router.rs
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::H256;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::error::{AaError, Result};
use crate::provider::{EthereumProvider, ProviderEvent};
use crate::smart_account::SmartAccount;
use crate::types::{FeeQuotesResponse, RequestArguments, ResolveTransactionParams, Transactions, UserOpBundle};

/// Name under which confirmation requests are announced to the host application.
pub const REQUEST_SEND_TRANSACTION_EVENT: &str = "RequestSendTransaction";

const EVENT_CAPACITY: usize = 100;

/// How `eth_sendTransaction` pays for gas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SendTransactionMode {
    /// The host application picks a fee option for every transaction.
    UserSelect,
    /// Sponsored when the backend offers it, native fee otherwise.
    Gasless,
    #[default]
    UserPaidNative,
}

impl TryFrom<u8> for SendTransactionMode {
    type Error = AaError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SendTransactionMode::UserSelect),
            1 => Ok(SendTransactionMode::Gasless),
            2 => Ok(SendTransactionMode::UserPaidNative),
            other => Err(AaError::Configuration(format!(
                "sendTxMode value error, must be one of 0, 1, 2 (got {other})"
            ))),
        }
    }
}

impl From<SendTransactionMode> for u8 {
    fn from(mode: SendTransactionMode) -> Self {
        match mode {
            SendTransactionMode::UserSelect => 0,
            SendTransactionMode::Gasless => 1,
            SendTransactionMode::UserPaidNative => 2,
        }
    }
}

impl fmt::Display for SendTransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SendTransactionMode::UserSelect => "user-select",
            SendTransactionMode::Gasless => "gasless",
            SendTransactionMode::UserPaidNative => "user-paid-native",
        };
        f.write_str(name)
    }
}

/// Payload of a `RequestSendTransaction` event: every fee option for the transaction
/// awaiting a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionRequest {
    pub id: u64,
    pub fee_quotes: FeeQuotesResponse,
}

struct PendingConfirmation {
    request: SendTransactionRequest,
    responder: oneshot::Sender<Result<ResolveTransactionParams>>,
}

/// Clears the pending slot if the waiting send is dropped before the host answers, as
/// long as the slot still belongs to that send.
struct PendingGuard<'a> {
    slot: &'a Mutex<Option<PendingConfirmation>>,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.as_ref().map_or(false, |pending| pending.request.id == self.id) {
            debug!("Dropping abandoned pending transaction {}", self.id);
            *slot = None;
        }
    }
}

/// Provider facade that makes the smart account look like the connected account and
/// routes `eth_sendTransaction` through account abstraction.
///
/// In [`SendTransactionMode::UserSelect`] a send suspends until the host calls
/// [`resolve_send_transaction`](Self::resolve_send_transaction) or
/// [`reject_send_transaction`](Self::reject_send_transaction). Only one send can wait at a
/// time: a newer one replaces the older, which then fails with
/// [`AaError::ConfirmationSuperseded`].
pub struct AaWrapProvider {
    smart_account: Arc<SmartAccount>,
    mode: SendTransactionMode,
    pending: Mutex<Option<PendingConfirmation>>,
    next_request_id: AtomicU64,
    requests: broadcast::Sender<SendTransactionRequest>,
}

impl AaWrapProvider {
    pub fn new(smart_account: Arc<SmartAccount>, mode: SendTransactionMode) -> Self {
        let (requests, _) = broadcast::channel(EVENT_CAPACITY);
        info!("Routing transactions through smart account in {} mode", mode);
        Self {
            smart_account,
            mode,
            pending: Mutex::new(None),
            next_request_id: AtomicU64::new(1),
            requests,
        }
    }

    /// Builds the wrapper from a raw mode value, failing for anything but 0, 1 or 2.
    pub fn with_raw_mode(smart_account: Arc<SmartAccount>, mode: u8) -> Result<Self> {
        Ok(Self::new(smart_account, SendTransactionMode::try_from(mode)?))
    }

    pub fn smart_account(&self) -> &Arc<SmartAccount> {
        &self.smart_account
    }

    pub fn mode(&self) -> SendTransactionMode {
        self.mode
    }

    /// Receives a `RequestSendTransaction` event for every send awaiting a fee decision.
    pub fn on_request_send_transaction(&self) -> broadcast::Receiver<SendTransactionRequest> {
        self.requests.subscribe()
    }

    /// Native events of the wrapped provider.
    pub fn on_provider_event(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        self.smart_account.provider().subscribe()
    }

    pub fn pending_send_transaction(&self) -> Option<SendTransactionRequest> {
        self.pending.lock().as_ref().map(|pending| pending.request.clone())
    }

    /// Continues the pending send with the host's choice. Returns `false` when nothing
    /// was waiting.
    pub fn resolve_send_transaction(&self, params: ResolveTransactionParams) -> bool {
        self.complete(Ok(params))
    }

    /// Fails the pending send with `error`. Returns `false` when nothing was waiting.
    pub fn reject_send_transaction(&self, error: AaError) -> bool {
        self.complete(Err(error))
    }

    fn complete(&self, outcome: Result<ResolveTransactionParams>) -> bool {
        let Some(pending) = self.pending.lock().take() else {
            debug!("No pending transaction to complete");
            return false;
        };
        debug!("Completing pending transaction {}", pending.request.id);
        pending.responder.send(outcome).is_ok()
    }

    pub async fn enable(&self) -> Result<Value> {
        self.request(RequestArguments::new("eth_requestAccounts")).await
    }

    pub async fn request(&self, args: RequestArguments) -> Result<Value> {
        match args.method.as_str() {
            "eth_requestAccounts" | "eth_accounts" => {
                self.smart_account.provider().request(args).await?;
                let address = self.smart_account.get_address().await?;
                Ok(json!(address.into_iter().collect::<Vec<_>>()))
            }
            "eth_sendTransaction" => {
                let hash = self.send_transaction(args.params).await?;
                Ok(json!(hash))
            }
            _ => self.smart_account.provider().request(args).await,
        }
    }

    async fn send_transaction(&self, params: Option<Vec<Value>>) -> Result<H256> {
        let tx_data = params
            .and_then(|params| params.into_iter().next())
            .filter(|tx| !tx.is_null())
            .ok_or_else(|| AaError::MissingParameter("send transaction param error".to_string()))?;
        let tx: Transactions = serde_json::from_value(tx_data.clone())
            .map_err(|e| AaError::MissingParameter(format!("send transaction param error: {e}")))?;

        let fee_quotes = self.smart_account.get_fee_quotes(tx.clone()).await?;
        debug!("Priced transaction in {} mode", self.mode);

        match self.mode {
            SendTransactionMode::Gasless => {
                let bundle = payable(fee_quotes.gasless_or_native())?;
                self.smart_account.send_user_operation(&bundle).await
            }
            SendTransactionMode::UserPaidNative => {
                let bundle = payable(fee_quotes.native())?;
                self.smart_account.send_user_operation(&bundle).await
            }
            SendTransactionMode::UserSelect => self.await_confirmation(tx_data, tx, fee_quotes).await,
        }
    }

    async fn await_confirmation(
        &self,
        tx_data: Value,
        tx: Transactions,
        mut fee_quotes: FeeQuotesResponse,
    ) -> Result<H256> {
        if fee_quotes.transactions.is_none() {
            fee_quotes.transactions = Some(vec![tx_data]);
        }
        let request = SendTransactionRequest {
            id: self.next_request_id.fetch_add(1, Ordering::Relaxed),
            fee_quotes,
        };

        let (responder, answer) = oneshot::channel();
        let replaced = self
            .pending
            .lock()
            .replace(PendingConfirmation { request: request.clone(), responder });
        if let Some(replaced) = replaced {
            warn!("Pending transaction {} replaced by {}", replaced.request.id, request.id);
        }

        let id = request.id;
        let _guard = PendingGuard { slot: &self.pending, id };
        if self.requests.send(request).is_err() {
            warn!("No listener for {} event {}", REQUEST_SEND_TRANSACTION_EVENT, id);
        }

        let params = match answer.await {
            Ok(outcome) => outcome?,
            Err(_) => return Err(AaError::ConfirmationSuperseded),
        };
        debug!("Pending transaction {} resolved", id);
        self.smart_account.send_transaction(params.with_transaction(tx)).await
    }
}

fn payable(bundle: Option<&UserOpBundle>) -> Result<UserOpBundle> {
    bundle
        .cloned()
        .ok_or_else(|| AaError::MissingParameter("fee quotes carry no payable user operation".to_string()))
}

#[async_trait]
impl EthereumProvider for AaWrapProvider {
    async fn request(&self, args: RequestArguments) -> Result<Value> {
        AaWrapProvider::request(self, args).await
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        self.on_provider_event()
    }
}
