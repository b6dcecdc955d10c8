// src/smart_account.rs
use std::sync::Arc;

use ethers::types::{Address, Bytes, H256};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::cache::{AddressResolver, AddressStore};
use crate::client::{Backend, HttpBackend};
use crate::config::{AccountContract, AccountContractConfig, SmartAccountConfig};
use crate::error::{AaError, Result};
use crate::provider::EthereumProvider;
use crate::signer::{SignedUserOperation, Signer};
use crate::types::{
    Account, AccountConfig, AccountOptions, CreateSessionKeyOptions, FeeQuotesResponse, RequestArguments,
    SendTransactionParams, SessionKey, SignerParams, Transaction, Transactions, UserOpBundle, UserOpParams,
    UserOperation,
};

pub const METHOD_GET_FEE_QUOTES: &str = "particle_aa_getFeeQuotes";
pub const METHOD_CREATE_USER_OP: &str = "particle_aa_createUserOp";
pub const METHOD_SEND_USER_OP: &str = "particle_aa_sendUserOp";
pub const METHOD_GET_SMART_ACCOUNT: &str = "particle_aa_getSmartAccount";
pub const METHOD_CREATE_SESSIONS: &str = "particle_aa_createSessions";
pub const METHOD_VALIDATE_SESSION: &str = "particle_aa_validateSession";

/// Everything needed to issue one backend call for the active contract, detached from
/// `SmartAccount` so it can outlive the borrow (shared address lookups).
#[derive(Clone)]
struct BackendCall {
    provider: Arc<dyn EthereumProvider>,
    backend: Arc<dyn Backend>,
    contract: AccountContractConfig,
}

impl BackendCall {
    async fn send<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let chain_id = chain_id(self.provider.as_ref()).await?;
        if !self.contract.supports_chain(chain_id) {
            return Err(AaError::UnsupportedChain(chain_id));
        }
        let result = self.backend.call(chain_id, method, params).await?;
        Ok(serde_json::from_value(result)?)
    }
}

async fn chain_id(provider: &dyn EthereumProvider) -> Result<u64> {
    let value = provider.request(RequestArguments::new("eth_chainId")).await?;
    match &value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
    .ok_or_else(|| AaError::Provider(format!("invalid chain id {value}")))
}

/// Smart account of the provider's connected owner: account configuration, user
/// operation building, signing and submission, all through the backend.
pub struct SmartAccount {
    provider: Arc<dyn EthereumProvider>,
    backend: Arc<dyn Backend>,
    config: SmartAccountConfig,
    contract: RwLock<AccountContract>,
    resolver: AddressResolver,
}

impl SmartAccount {
    pub fn new(
        provider: Arc<dyn EthereumProvider>,
        backend: Arc<dyn Backend>,
        config: SmartAccountConfig,
        store: Arc<dyn AddressStore>,
    ) -> Result<Self> {
        let contract = config.validate()?;
        debug!("Using account contract {} {}", contract.name, contract.version);
        Ok(Self {
            provider,
            backend,
            config,
            contract: RwLock::new(contract),
            resolver: AddressResolver::new(store),
        })
    }

    pub fn with_http_backend(
        provider: Arc<dyn EthereumProvider>,
        config: SmartAccountConfig,
        store: Arc<dyn AddressStore>,
    ) -> Result<Self> {
        let backend = HttpBackend::new(&config)?;
        info!("Using account abstraction backend at {}", backend.endpoint());
        Self::new(provider, Arc::new(backend), config, store)
    }

    pub fn provider(&self) -> &Arc<dyn EthereumProvider> {
        &self.provider
    }

    pub fn config(&self) -> &SmartAccountConfig {
        &self.config
    }

    pub fn smart_account_contract(&self) -> AccountContract {
        self.contract.read().clone()
    }

    pub fn set_smart_account_contract(&self, contract: AccountContract) -> Result<()> {
        self.config.require_contract(&contract)?;
        *self.contract.write() = contract;
        Ok(())
    }

    pub async fn chain_id(&self) -> Result<u64> {
        chain_id(self.provider.as_ref()).await
    }

    /// First account reported by the provider, if any is connected.
    pub async fn owner(&self) -> Result<Option<Address>> {
        let accounts = self.provider.request(RequestArguments::new("eth_accounts")).await?;
        let owner = match accounts.get(0).and_then(Value::as_str) {
            Some(account) if !account.is_empty() => Some(
                account.parse::<Address>().map_err(|_| AaError::Provider(format!("invalid account {account}")))?,
            ),
            _ => None,
        };
        Ok(owner)
    }

    pub async fn personal_sign(&self, message: &str) -> Result<Bytes> {
        let owner = self.require_owner().await?;
        let signature = self
            .provider
            .request(RequestArguments::with_params("personal_sign", vec![json!(message), json!(owner)]))
            .await?;
        signature
            .as_str()
            .ok_or_else(|| AaError::Signing("personal_sign returned no signature".to_string()))?
            .parse::<Bytes>()
            .map_err(|e| AaError::Signing(e.to_string()))
    }

    async fn require_owner(&self) -> Result<Address> {
        self.owner().await?.ok_or_else(|| AaError::Provider("no connected account".to_string()))
    }

    fn backend_call(&self) -> Result<BackendCall> {
        let contract = self.config.require_contract(&self.contract.read())?.clone();
        Ok(BackendCall { provider: self.provider.clone(), backend: self.backend.clone(), contract })
    }

    fn account_config_for(&self, owner_address: Address, options: AccountOptions) -> Result<AccountConfig> {
        let contract = self.contract.read().clone();
        self.config.require_contract(&contract)?;
        Ok(AccountConfig { name: contract.name, version: contract.version, owner_address, options })
    }

    async fn account_options(&self) -> Result<AccountOptions> {
        let passkey_option = match self.provider.passkey() {
            Some(passkey) => passkey.passkey_option().await?,
            None => None,
        };
        Ok(AccountOptions { passkey_option })
    }

    pub async fn account_config(&self) -> Result<AccountConfig> {
        let owner = self.require_owner().await?;
        let options = self.account_options().await?;
        self.account_config_for(owner, options)
    }

    /// Issues a backend call for the active contract after checking the chain allow-list.
    pub async fn send_rpc<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        self.backend_call()?.send(method, params).await
    }

    pub async fn get_fee_quotes(&self, tx: impl Into<Transactions>) -> Result<FeeQuotesResponse> {
        let txs: Transactions = tx.into();
        let account = self.account_config().await?;
        self.send_rpc(METHOD_GET_FEE_QUOTES, vec![json!(account), json!(txs.into_vec())]).await
    }

    /// Builds and prices a user operation. Optional fee parameters are left out of the
    /// request entirely when not given.
    pub async fn build_user_operation(&self, params: UserOpParams) -> Result<UserOpBundle> {
        let account = self.account_config().await?;
        let mut rpc_params = vec![json!(account), json!(params.tx.into_vec())];
        if let Some(fee_quote) = params.fee_quote {
            rpc_params.push(json!(fee_quote));
        }
        if let Some(token_paymaster) = params.token_paymaster_address {
            rpc_params.push(json!(token_paymaster));
        }
        self.send_rpc(METHOD_CREATE_USER_OP, rpc_params).await
    }

    pub async fn sign_user_operation(&self, bundle: &UserOpBundle) -> Result<SignedUserOperation> {
        let account = self.account_config().await?;
        Signer::for_provider(self.provider.as_ref()).sign_user_operation(&account, bundle).await
    }

    pub async fn send_user_operation(&self, bundle: &UserOpBundle) -> Result<H256> {
        let signed = self.sign_user_operation(bundle).await?;
        self.send_signed_user_operation(&signed.user_op, signed.signer_params.as_ref()).await
    }

    pub async fn send_signed_user_operation(
        &self,
        user_op: &UserOperation,
        signer_params: Option<&SignerParams>,
    ) -> Result<H256> {
        if !user_op.is_signed() {
            return Err(AaError::Signing("user operation is not signed".to_string()));
        }
        let account = self.account_config().await?;
        let mut params = vec![json!(account), json!(user_op)];
        if let Some(signer_params) = signer_params {
            params.push(json!(signer_params));
        }
        let hash: H256 = self.send_rpc(METHOD_SEND_USER_OP, params).await?;
        info!("Submitted user operation from {:?}: {:?}", user_op.sender(), hash);
        Ok(hash)
    }

    /// Sends a pre-built bundle as is, or builds one from the transaction first.
    pub async fn send_transaction(&self, params: SendTransactionParams) -> Result<H256> {
        let bundle = match params {
            SendTransactionParams::Bundle(bundle) => bundle,
            SendTransactionParams::Build(params) => self.build_user_operation(params).await?,
        };
        self.send_user_operation(&bundle).await
    }

    pub async fn get_account(&self) -> Result<Account> {
        let account = self.account_config().await?;
        first_account(self.send_rpc(METHOD_GET_SMART_ACCOUNT, vec![json!(account)]).await?)
    }

    /// Smart account address of the connected owner, or `None` when no account is
    /// connected. Served from the address store when possible.
    ///
    /// With no owner there is no placeholder address: `eth_accounts` on the router answers
    /// `[]` rather than a list holding an empty string.
    pub async fn get_address(&self) -> Result<Option<Address>> {
        let Some(owner) = self.owner().await? else {
            return Ok(None);
        };
        let options = self.account_options().await?;
        let account = self.account_config_for(owner, options)?;
        let call = self.backend_call()?;
        let params = vec![json!(account)];

        let address = self
            .resolver
            .resolve(&account, move || async move {
                let accounts: Vec<Account> = call.send(METHOD_GET_SMART_ACCOUNT, params).await?;
                Ok(first_account(accounts)?.smart_account_address)
            })
            .await?;
        Ok(Some(address))
    }

    pub async fn is_deployed(&self) -> Result<bool> {
        Ok(self.get_account().await?.is_deployed)
    }

    /// Deploys the account by sending an empty call to the zero address.
    pub async fn deploy_wallet_contract(&self) -> Result<H256> {
        let tx = Transaction { to: Address::zero(), data: Some(Bytes::default()), ..Default::default() };
        self.send_transaction(SendTransactionParams::Build(Transactions::from(tx).into())).await
    }

    pub async fn create_sessions(&self, options: &[CreateSessionKeyOptions]) -> Result<FeeQuotesResponse> {
        let account = self.account_config().await?;
        self.send_rpc(METHOD_CREATE_SESSIONS, vec![json!(account), json!(options)]).await
    }

    pub async fn validate_session(&self, target_session: &SessionKey, sessions: &[SessionKey]) -> Result<bool> {
        let account = self.account_config().await?;
        self.send_rpc(
            METHOD_VALIDATE_SESSION,
            vec![json!(account), json!({ "sessions": sessions, "targetSession": target_session })],
        )
        .await
    }
}

fn first_account(accounts: Vec<Account>) -> Result<Account> {
    accounts.into_iter().next().ok_or_else(|| AaError::Backend {
        code: 0,
        message: "no smart account returned".to_string(),
        data: None,
    })
}
