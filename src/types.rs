// src/types.rs
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single call to be executed by the smart account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub to: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<U256>,
    #[serde(default, alias = "gas", skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<U256>,
}

/// One transaction or a batch, as accepted by the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Transactions {
    Single(Transaction),
    Batch(Vec<Transaction>),
}

impl Transactions {
    pub fn into_vec(self) -> Vec<Transaction> {
        match self {
            Transactions::Single(tx) => vec![tx],
            Transactions::Batch(txs) => txs,
        }
    }
}

impl From<Transaction> for Transactions {
    fn from(tx: Transaction) -> Self {
        Transactions::Single(tx)
    }
}

impl From<Vec<Transaction>> for Transactions {
    fn from(txs: Vec<Transaction>) -> Self {
        Transactions::Batch(txs)
    }
}

/// User operation as built and priced by the backend.
///
/// Kept as the backend's own JSON object so that signing touches nothing but the
/// `signature` field: no quantity, address or null field is re-encoded on the way back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserOperation(Map<String, Value>);

impl UserOperation {
    pub const SIGNATURE: &'static str = "signature";

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn sender(&self) -> Option<Address> {
        self.0.get("sender")?.as_str()?.parse().ok()
    }

    pub fn signature(&self) -> Option<Bytes> {
        self.0.get(Self::SIGNATURE)?.as_str()?.parse().ok()
    }

    pub fn is_signed(&self) -> bool {
        self.signature().map_or(false, |signature| !signature.is_empty())
    }

    pub fn with_signature(mut self, signature: Bytes) -> Self {
        let encoded = format!("0x{}", hex::encode(&signature[..]));
        self.0.insert(Self::SIGNATURE.to_string(), Value::String(encoded));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOpBundle {
    pub user_op: UserOperation,
    pub user_op_hash: H256,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub chain_id: u64,
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(rename = "logoURI", default)]
    pub logo_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    pub token_info: TokenInfo,
    pub fee: String,
    pub balance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium_percentage: Option<String>,
}

/// A bundle priced through the verifying paymaster (sponsored or native fee).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyingPaymaster {
    #[serde(flatten)]
    pub bundle: UserOpBundle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_quote: Option<FeeQuote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPaymaster {
    pub token_paymaster_address: Address,
    pub fee_quotes: Vec<FeeQuote>,
}

/// Every way the backend offers to pay for a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuotesResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifying_paymaster_gasless: Option<VerifyingPaymaster>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifying_paymaster_native: Option<VerifyingPaymaster>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_paymaster: Option<TokenPaymaster>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<SessionKey>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Value>>,
}

impl FeeQuotesResponse {
    /// Sponsored bundle if the backend offered one, otherwise the native-fee bundle.
    pub fn gasless_or_native(&self) -> Option<&UserOpBundle> {
        self.verifying_paymaster_gasless
            .as_ref()
            .or(self.verifying_paymaster_native.as_ref())
            .map(|pm| &pm.bundle)
    }

    pub fn native(&self) -> Option<&UserOpBundle> {
        self.verifying_paymaster_native.as_ref().map(|pm| &pm.bundle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasskeyOption {
    pub credential_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passkey_option: Option<PasskeyOption>,
}

/// Identifies the account implementation and owner. Sent as the first parameter of every
/// backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    pub name: String,
    pub version: String,
    pub owner_address: Address,
    #[serde(default)]
    pub options: AccountOptions,
}

impl AccountConfig {
    /// Key under which the resolved smart account address is persisted.
    pub fn storage_key(&self) -> String {
        let owner = match &self.options.passkey_option {
            Some(passkey) => passkey.credential_id.clone(),
            None => format!("{:?}", self.owner_address),
        };
        format!("particle_{}_{}_{}", self.name, self.version, owner)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub is_deployed: bool,
    pub chain_id: u64,
    pub eoa_address: Address,
    pub factory_address: Address,
    pub entry_point_address: Address,
    pub smart_account_address: Address,
    pub owner: Address,
    pub index: u64,
    pub implementation_address: Address,
    pub implementation_version: String,
    pub fall_back_handler_address: Address,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passkey_credential_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passkey_publickey: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    pub valid_until: u64,
    pub valid_after: u64,
    pub session_validation_module: Address,
    pub session_key_data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionKeyOptions {
    pub valid_until: u64,
    pub valid_after: u64,
    pub session_validation_module: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key_data: Option<Bytes>,
    /// `[[abi types], [values]]`, encoded by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key_data_in_abi: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKeySignerParams {
    pub sessions: Vec<SessionKey>,
    pub target_session: SessionKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasskeyVerifyData {
    pub authenticator_data: String,
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
}

/// Extra data the backend needs to verify a signature that is not a plain ECDSA one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignerParams {
    SessionKey(SessionKeySignerParams),
    Passkey(PasskeyVerifyData),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUserOpHashResult {
    pub signature: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passkey_verify_data: Option<PasskeyVerifyData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOpParams {
    pub tx: Transactions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_quote: Option<FeeQuote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_paymaster_address: Option<Address>,
}

impl From<Transactions> for UserOpParams {
    fn from(tx: Transactions) -> Self {
        Self { tx, fee_quote: None, token_paymaster_address: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendTransactionParams {
    Bundle(UserOpBundle),
    Build(UserOpParams),
}

/// The fee payment picked for a fee selection that has no transaction attached yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_quote: Option<FeeQuote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_paymaster_address: Option<Address>,
}

/// What the host application answers to a pending send: either one of the offered bundles
/// or a fee selection to build a new one with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResolveTransactionParams {
    Bundle(UserOpBundle),
    Selection(FeeSelection),
}

impl ResolveTransactionParams {
    /// Attaches the original transaction to the host's answer.
    pub fn with_transaction(self, tx: Transactions) -> SendTransactionParams {
        match self {
            ResolveTransactionParams::Bundle(bundle) => SendTransactionParams::Bundle(bundle),
            ResolveTransactionParams::Selection(selection) => SendTransactionParams::Build(UserOpParams {
                tx,
                fee_quote: selection.fee_quote,
                token_paymaster_address: selection.token_paymaster_address,
            }),
        }
    }
}

/// Provider-shaped request, `{method, params}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Value>>,
}

impl RequestArguments {
    pub fn new(method: impl Into<String>) -> Self {
        Self { method: method.into(), params: None }
    }

    pub fn with_params(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self { method: method.into(), params: Some(params) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bundle_json() -> Value {
        json!({
            "userOp": {
                "sender": "0x8ba1f109551bd432803012645ac136ddd64dba72",
                "nonce": "0x1",
                "initCode": "0x",
                "callData": "0xb61d27f6",
                "callGasLimit": "0x5208",
                "verificationGasLimit": "0x186a0",
                "preVerificationGas": "0xb708",
                "maxFeePerGas": "0x3b9aca00",
                "maxPriorityFeePerGas": "0x3b9aca00",
                "paymasterAndData": "0x",
                "signature": "0x",
                "factory": null
            },
            "userOpHash": "0x1111111111111111111111111111111111111111111111111111111111111111"
        })
    }

    #[test]
    fn user_operation_keeps_unknown_fields() {
        let bundle: UserOpBundle = serde_json::from_value(bundle_json()).unwrap();
        assert!(!bundle.user_op.is_signed());
        assert_eq!(bundle.user_op.get("factory"), Some(&Value::Null));
        assert_eq!(bundle.user_op.sender(), Some("0x8ba1f109551bd432803012645ac136ddd64dba72".parse().unwrap()));

        let back = serde_json::to_value(&bundle).unwrap();
        assert_eq!(back, bundle_json());
    }

    #[test]
    fn setting_signature_leaves_other_fields_verbatim() {
        let raw = json!({
            "sender": "0x8ba1F109551bD432803012645Ac136ddd64DBA72",
            "nonce": "0x00",
            "initCode": null,
            "callData": "0xB61D27F6",
            "signature": "0x"
        });
        let user_op: UserOperation = serde_json::from_value(raw.clone()).unwrap();
        let signed = user_op.with_signature(Bytes::from(vec![0xab, 0xcd]));
        assert!(signed.is_signed());

        let mut expected = raw;
        expected["signature"] = json!("0xabcd");
        assert_eq!(serde_json::to_value(&signed).unwrap(), expected);
    }

    #[test]
    fn fee_quotes_fall_back_to_native() {
        let native: VerifyingPaymaster = serde_json::from_value(bundle_json()).unwrap();
        let quotes = FeeQuotesResponse {
            verifying_paymaster_native: Some(native.clone()),
            ..Default::default()
        };
        assert_eq!(quotes.gasless_or_native(), Some(&native.bundle));
        assert_eq!(quotes.native(), Some(&native.bundle));
        assert!(FeeQuotesResponse::default().gasless_or_native().is_none());
    }

    #[test]
    fn transaction_accepts_gas_alias() {
        let tx: Transaction = serde_json::from_value(json!({
            "from": "0x0000000000000000000000000000000000000001",
            "to": "0x0000000000000000000000000000000000000002",
            "gas": "0x5208",
            "value": "0x0"
        }))
        .unwrap();
        assert_eq!(tx.gas_limit, Some(U256::from(21000)));
        assert!(tx.data.is_none());
    }

    #[test]
    fn resolve_params_prefer_bundle() {
        let params: ResolveTransactionParams = serde_json::from_value(bundle_json()).unwrap();
        assert!(matches!(params, ResolveTransactionParams::Bundle(_)));

        let params: ResolveTransactionParams =
            serde_json::from_value(json!({ "tokenPaymasterAddress": "0x0000000000000000000000000000000000000003" }))
                .unwrap();
        let tx = Transaction::default();
        match params.with_transaction(tx.clone().into()) {
            SendTransactionParams::Build(p) => {
                assert_eq!(p.tx, Transactions::Single(tx));
                assert!(p.token_paymaster_address.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn storage_key_prefers_passkey_credential() {
        let mut config = AccountConfig {
            name: "BICONOMY".into(),
            version: "2.0.0".into(),
            owner_address: Address::repeat_byte(0xab),
            options: AccountOptions::default(),
        };
        assert_eq!(
            config.storage_key(),
            "particle_BICONOMY_2.0.0_0xabababababababababababababababababababab"
        );
        config.options.passkey_option =
            Some(PasskeyOption { credential_id: "cred-1".into(), public_key: None });
        assert_eq!(config.storage_key(), "particle_BICONOMY_2.0.0_cred-1");
    }
}
