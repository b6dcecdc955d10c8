// src/signer.rs
use ethers::types::{Bytes, H256};
use ethers::utils::hash_message;
use serde_json::json;
use tracing::debug;

use crate::error::{AaError, Result};
use crate::provider::{EthereumProvider, PasskeyCapability};
use crate::types::{AccountConfig, RequestArguments, SignUserOpHashResult, SignerParams, UserOpBundle, UserOperation};

/// Account contracts whose passkey validator checks the bare user operation hash.
/// Every other contract expects the EIP-191 prefixed hash.
pub const RAW_HASH_PASSKEY_CONTRACTS: &[&str] = &["COINBASE"];

/// How the owner authorizes a user operation, picked from the provider's capabilities.
pub enum Signer<'a> {
    Standard(&'a dyn EthereumProvider),
    Passkey(&'a dyn PasskeyCapability),
}

/// A user operation with its signature filled in, plus whatever the backend needs to
/// verify that signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedUserOperation {
    pub user_op: UserOperation,
    pub signer_params: Option<SignerParams>,
}

impl<'a> Signer<'a> {
    pub fn for_provider(provider: &'a dyn EthereumProvider) -> Self {
        match provider.passkey() {
            Some(passkey) => Signer::Passkey(passkey),
            None => Signer::Standard(provider),
        }
    }

    pub async fn sign(&self, account: &AccountConfig, user_op_hash: H256) -> Result<SignUserOpHashResult> {
        let result = match self {
            Signer::Standard(provider) => {
                let signature = provider
                    .request(RequestArguments::with_params(
                        "personal_sign",
                        vec![json!(user_op_hash), json!(account.owner_address)],
                    ))
                    .await?;
                let signature = signature
                    .as_str()
                    .ok_or_else(|| AaError::Signing("personal_sign returned no signature".to_string()))?
                    .parse::<Bytes>()
                    .map_err(|e| AaError::Signing(e.to_string()))?;
                SignUserOpHashResult { signature, passkey_verify_data: None }
            }
            Signer::Passkey(passkey) => {
                let message = if RAW_HASH_PASSKEY_CONTRACTS.contains(&account.name.as_str()) {
                    user_op_hash
                } else {
                    hash_message(user_op_hash.as_bytes())
                };
                debug!("Requesting passkey signature for {:?}", message);
                passkey.sign_message(message).await?
            }
        };

        if result.signature.is_empty() {
            return Err(AaError::Signing("empty signature".to_string()));
        }
        Ok(result)
    }

    pub async fn sign_user_operation(
        &self,
        account: &AccountConfig,
        bundle: &UserOpBundle,
    ) -> Result<SignedUserOperation> {
        let result = self.sign(account, bundle.user_op_hash).await?;
        Ok(SignedUserOperation {
            user_op: bundle.user_op.clone().with_signature(result.signature),
            signer_params: result.passkey_verify_data.map(SignerParams::Passkey),
        })
    }
}
