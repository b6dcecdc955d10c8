// src/provider.rs
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::{AaError, Result};
use crate::types::{PasskeyOption, RequestArguments, SignUserOpHashResult};

/// Native events of an injected provider, forwarded unchanged to consumers of the wrapper.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Connect { chain_id: u64 },
    Disconnect { code: i64, message: String },
    ChainChanged(u64),
    AccountsChanged(Vec<Address>),
}

/// Signing through a platform authenticator instead of the owner key.
#[async_trait]
pub trait PasskeyCapability: Send + Sync {
    async fn passkey_option(&self) -> Result<Option<PasskeyOption>>;

    async fn sign_message(&self, message: H256) -> Result<SignUserOpHashResult>;
}

/// EIP-1193 style provider: `request({method, params})` plus event subscription.
#[async_trait]
pub trait EthereumProvider: Send + Sync {
    async fn request(&self, args: RequestArguments) -> Result<Value>;

    fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        None
    }

    /// Present only on passkey-backed providers.
    fn passkey(&self) -> Option<&dyn PasskeyCapability> {
        None
    }
}

/// Provider backed by a local private key. Account and signing methods are answered
/// locally, everything else goes to the node at `eth_rpc_url` when one is configured.
pub struct LocalWalletProvider {
    wallet: LocalWallet,
    client: Option<Provider<Http>>,
}

impl LocalWalletProvider {
    pub fn new(private_key: &str, chain_id: u64) -> Result<Self> {
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| AaError::Configuration(format!("invalid private key: {e}")))?
            .with_chain_id(chain_id);
        info!("Initialized local wallet provider with owner: {:?}", wallet.address());
        Ok(Self { wallet, client: None })
    }

    pub fn with_rpc(mut self, eth_rpc_url: &str) -> Result<Self> {
        let client = Provider::<Http>::try_from(eth_rpc_url)
            .map_err(|e| AaError::Configuration(format!("invalid eth rpc url: {e}")))?;
        self.client = Some(client);
        Ok(self)
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn personal_sign(&self, params: &[Value]) -> Result<Value> {
        let message = params
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| AaError::MissingParameter("personal_sign message".to_string()))?;
        if let Some(account) = params.get(1).and_then(Value::as_str) {
            let account: Address = account
                .parse()
                .map_err(|_| AaError::Provider(format!("invalid account {account}")))?;
            if account != self.wallet.address() {
                return Err(AaError::Provider(format!("unknown account {account:?}")));
            }
        }

        let bytes = match message.strip_prefix("0x") {
            Some(stripped) => hex::decode(stripped)
                .map_err(|e| AaError::Signing(format!("invalid hex message: {e}")))?,
            None => message.as_bytes().to_vec(),
        };
        let signature = self.wallet.sign_message(bytes).await?;
        Ok(json!(format!("0x{}", hex::encode(signature.to_vec()))))
    }
}

#[async_trait]
impl EthereumProvider for LocalWalletProvider {
    async fn request(&self, args: RequestArguments) -> Result<Value> {
        let params = args.params.unwrap_or_default();
        match args.method.as_str() {
            "eth_accounts" | "eth_requestAccounts" => Ok(json!([self.wallet.address()])),
            "eth_chainId" => Ok(json!(format!("{:#x}", self.wallet.chain_id()))),
            "personal_sign" => self.personal_sign(&params).await,
            method => match &self.client {
                Some(client) => {
                    debug!("Forwarding {} to node", method);
                    Ok(client.request::<_, Value>(method, params).await?)
                }
                None => Err(AaError::Provider(format!("method {method} is not supported"))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[tokio::test]
    async fn answers_account_methods_locally() {
        let provider = LocalWalletProvider::new(KEY, 137).unwrap();
        let accounts = provider.request(RequestArguments::new("eth_accounts")).await.unwrap();
        assert_eq!(accounts, json!([provider.address()]));

        let chain = provider.request(RequestArguments::new("eth_chainId")).await.unwrap();
        assert_eq!(chain, json!("0x89"));
    }

    #[tokio::test]
    async fn personal_sign_recovers_to_owner() {
        let provider = LocalWalletProvider::new(KEY, 1).unwrap();
        let hash = H256::repeat_byte(0x11);
        let signed = provider
            .request(RequestArguments::with_params(
                "personal_sign",
                vec![json!(format!("{hash:?}")), json!(provider.address())],
            ))
            .await
            .unwrap();

        let signature: Signature = signed.as_str().unwrap().parse().unwrap();
        signature.verify(hash.as_bytes(), provider.address()).unwrap();
    }

    #[tokio::test]
    async fn unknown_methods_need_a_node() {
        let provider = LocalWalletProvider::new(KEY, 1).unwrap();
        let err = provider.request(RequestArguments::new("eth_blockNumber")).await.unwrap_err();
        assert!(matches!(err, AaError::Provider(_)));
    }
}
