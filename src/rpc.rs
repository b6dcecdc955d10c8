// src/rpc.rs
use std::sync::Arc;

use ethers::types::Address;
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::error::{ErrorObject, ErrorObjectOwned, INVALID_PARAMS_CODE};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::error::AaError;
use crate::router::{AaWrapProvider, SendTransactionRequest};
use crate::types::{RequestArguments, ResolveTransactionParams};

/// EIP-1193 code for a request the user declined.
pub const USER_REJECTED_CODE: i32 = 4001;
const SERVER_ERROR_CODE: i32 = -32000;

/// JSON-RPC surface of a wrapped provider for dapps that cannot embed the library.
#[rpc(server)]
pub trait WalletRpc {
    #[method(name = "eth_accounts")]
    async fn accounts(&self) -> RpcResult<Vec<Address>>;

    #[method(name = "eth_requestAccounts")]
    async fn request_accounts(&self) -> RpcResult<Vec<Address>>;

    #[method(name = "eth_chainId")]
    async fn chain_id(&self) -> RpcResult<Value>;

    /// Resolves once the user operation is submitted; in user-select mode this waits for
    /// `aa_resolveSendTransaction` or `aa_rejectSendTransaction`.
    #[method(name = "eth_sendTransaction")]
    async fn send_transaction(&self, tx: Value) -> RpcResult<Value>;

    #[method(name = "aa_pendingSendTransaction")]
    async fn pending_send_transaction(&self) -> RpcResult<Option<SendTransactionRequest>>;

    #[method(name = "aa_resolveSendTransaction")]
    async fn resolve_send_transaction(&self, params: ResolveTransactionParams) -> RpcResult<bool>;

    #[method(name = "aa_rejectSendTransaction")]
    async fn reject_send_transaction(&self, reason: Option<String>) -> RpcResult<bool>;
}

pub struct WalletRpcImpl {
    provider: Arc<AaWrapProvider>,
}

impl WalletRpcImpl {
    pub fn new(provider: Arc<AaWrapProvider>) -> Self {
        Self { provider }
    }

    async fn accounts_for(&self, method: &str) -> RpcResult<Vec<Address>> {
        let accounts = self.provider.request(RequestArguments::new(method)).await.map_err(rpc_error)?;
        serde_json::from_value(accounts).map_err(|e| rpc_error(AaError::from(e)))
    }
}

#[async_trait]
impl WalletRpcServer for WalletRpcImpl {
    async fn accounts(&self) -> RpcResult<Vec<Address>> {
        self.accounts_for("eth_accounts").await
    }

    async fn request_accounts(&self) -> RpcResult<Vec<Address>> {
        self.accounts_for("eth_requestAccounts").await
    }

    async fn chain_id(&self) -> RpcResult<Value> {
        self.provider.request(RequestArguments::new("eth_chainId")).await.map_err(rpc_error)
    }

    async fn send_transaction(&self, tx: Value) -> RpcResult<Value> {
        debug!("Received eth_sendTransaction: {}", tx);

        match self.provider.request(RequestArguments::with_params("eth_sendTransaction", vec![tx])).await {
            Ok(hash) => {
                info!("Transaction sent through smart account: {}", hash);
                Ok(hash)
            }
            Err(e) => {
                error!("Failed to send transaction: {}", e);
                Err(rpc_error(e))
            }
        }
    }

    async fn pending_send_transaction(&self) -> RpcResult<Option<SendTransactionRequest>> {
        Ok(self.provider.pending_send_transaction())
    }

    async fn resolve_send_transaction(&self, params: ResolveTransactionParams) -> RpcResult<bool> {
        Ok(self.provider.resolve_send_transaction(params))
    }

    async fn reject_send_transaction(&self, reason: Option<String>) -> RpcResult<bool> {
        let reason = reason.unwrap_or_else(|| "rejected by user".to_string());
        Ok(self.provider.reject_send_transaction(AaError::UserRejected(reason)))
    }
}

pub fn rpc_error(e: AaError) -> ErrorObjectOwned {
    match e {
        AaError::Backend { code, message, data } => {
            let code = i32::try_from(code).unwrap_or(SERVER_ERROR_CODE);
            ErrorObject::owned(code, message, data)
        }
        AaError::UserRejected(reason) => ErrorObject::owned(USER_REJECTED_CODE, reason, None::<()>),
        AaError::MissingParameter(message) => ErrorObject::owned(INVALID_PARAMS_CODE, message, None::<()>),
        AaError::UnsupportedChain(chain_id) => ErrorObject::owned(
            SERVER_ERROR_CODE,
            format!("Invalid Chain: {chain_id}"),
            Some(json!({ "chainId": chain_id })),
        ),
        other => ErrorObject::owned(SERVER_ERROR_CODE, other.to_string(), None::<()>),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_keep_their_code() {
        let err = rpc_error(AaError::Backend { code: -32602, message: "bad".into(), data: Some(json!(1)) });
        assert_eq!(err.code(), -32602);
        assert_eq!(err.message(), "bad");
    }

    #[test]
    fn rejections_use_eip1193_code() {
        let err = rpc_error(AaError::user_rejected("no"));
        assert_eq!(err.code(), USER_REJECTED_CODE);

        let err = rpc_error(AaError::MissingParameter("tx".into()));
        assert_eq!(err.code(), INVALID_PARAMS_CODE);

        let err = rpc_error(AaError::ConfirmationSuperseded);
        assert_eq!(err.code(), SERVER_ERROR_CODE);
    }
}
