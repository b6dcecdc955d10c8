#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aa_wallet_provider::cache::MemoryStore;
use aa_wallet_provider::config::{AaOptions, AccountContractConfig};
use aa_wallet_provider::types::{PasskeyOption, PasskeyVerifyData, RequestArguments, SignUserOpHashResult};
use aa_wallet_provider::{
    AaError, Backend, EthereumProvider, PasskeyCapability, ProviderEvent, Result, SmartAccount, SmartAccountConfig,
};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;

pub const GASLESS_HASH: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
pub const NATIVE_HASH: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";
pub const BUILT_HASH: &str = "0x3333333333333333333333333333333333333333333333333333333333333333";
pub const TX_HASH: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

pub fn owner() -> Address {
    Address::repeat_byte(0x0e)
}

pub fn smart_account_address() -> Address {
    Address::repeat_byte(0x5a)
}

#[derive(Debug, Clone)]
pub struct BackendCall {
    pub chain_id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

/// Backend answering from canned responses, recording every call.
pub struct MockBackend {
    responses: Mutex<HashMap<String, Result<Value>>>,
    calls: Mutex<Vec<BackendCall>>,
    delay: Duration,
}

impl MockBackend {
    pub fn new() -> Self {
        let backend = Self { responses: Mutex::new(HashMap::new()), calls: Mutex::new(vec![]), delay: Duration::ZERO };
        backend.respond("particle_aa_getFeeQuotes", Ok(fee_quotes(true)));
        backend.respond("particle_aa_createUserOp", Ok(user_op_bundle(0x03, BUILT_HASH)));
        backend.respond("particle_aa_sendUserOp", Ok(json!(TX_HASH)));
        backend.respond("particle_aa_getSmartAccount", Ok(json!([account_json()])));
        backend
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn respond(&self, method: &str, response: Result<Value>) {
        self.responses.lock().insert(method.to_string(), response);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<BackendCall> {
        self.calls().into_iter().filter(|c| c.method == method).collect()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn call(&self, chain_id: u64, method: &str, params: Vec<Value>) -> Result<Value> {
        self.calls.lock().push(BackendCall { chain_id, method: method.to_string(), params });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.responses
            .lock()
            .get(method)
            .cloned()
            .unwrap_or_else(|| Err(AaError::Backend { code: -32601, message: "method not found".into(), data: None }))
    }
}

pub struct MockPasskey;

#[async_trait]
impl PasskeyCapability for MockPasskey {
    async fn passkey_option(&self) -> Result<Option<PasskeyOption>> {
        Ok(Some(PasskeyOption { credential_id: "credential-1".into(), public_key: Some("0xpub".into()) }))
    }

    async fn sign_message(&self, _message: H256) -> Result<SignUserOpHashResult> {
        Ok(SignUserOpHashResult {
            signature: Bytes::from(vec![0x99; 64]),
            passkey_verify_data: Some(PasskeyVerifyData {
                authenticator_data: "0xauth".into(),
                client_data_json: "{\"type\":\"webauthn.get\"}".into(),
            }),
        })
    }
}

/// Injected provider stand-in: reports `owner`, signs with a fixed signature.
pub struct MockProvider {
    pub owner: Option<Address>,
    pub chain_id: u64,
    pub requests: Mutex<Vec<RequestArguments>>,
    pub events: broadcast::Sender<ProviderEvent>,
    pub passkey: Option<MockPasskey>,
}

impl MockProvider {
    pub fn new(owner: Option<Address>, chain_id: u64) -> Self {
        let (events, _) = broadcast::channel(16);
        Self { owner, chain_id, requests: Mutex::new(vec![]), events, passkey: None }
    }

    pub fn with_passkey(mut self) -> Self {
        self.passkey = Some(MockPasskey);
        self
    }

    pub fn methods(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.method.clone()).collect()
    }
}

#[async_trait]
impl EthereumProvider for MockProvider {
    async fn request(&self, args: RequestArguments) -> Result<Value> {
        self.requests.lock().push(args.clone());
        match args.method.as_str() {
            "eth_accounts" | "eth_requestAccounts" => Ok(json!(self.owner.into_iter().collect::<Vec<_>>())),
            "eth_chainId" => Ok(json!(format!("{:#x}", self.chain_id))),
            "personal_sign" => Ok(json!(format!("0x{}", "1b".repeat(65)))),
            "eth_blockNumber" => Ok(json!("0x10")),
            other => Err(AaError::Provider(format!("unsupported {other}"))),
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        Some(self.events.subscribe())
    }

    fn passkey(&self) -> Option<&dyn PasskeyCapability> {
        self.passkey.as_ref().map(|p| p as &dyn PasskeyCapability)
    }
}

pub fn config(chain_ids: &[u64]) -> SmartAccountConfig {
    let mut account_contracts = indexmap::IndexMap::new();
    account_contracts.insert(
        "SIMPLE".to_string(),
        vec![
            AccountContractConfig { version: "1.0.0".into(), chain_ids: chain_ids.to_vec() },
            AccountContractConfig { version: "2.0.0".into(), chain_ids: vec![] },
        ],
    );
    SmartAccountConfig {
        project_id: "project".into(),
        client_key: "client".into(),
        app_id: "app".into(),
        aa_options: AaOptions { account_contracts },
        rpc_url: None,
    }
}

pub fn smart_account(provider: Arc<MockProvider>, backend: Arc<MockBackend>) -> SmartAccount {
    SmartAccount::new(provider, backend, config(&[]), Arc::new(MemoryStore::new())).unwrap()
}

pub fn user_op_json(sender_byte: u8) -> Value {
    json!({
        "sender": format!("{:?}", Address::repeat_byte(sender_byte)),
        "nonce": "0x0",
        "initCode": "0x",
        "callData": "0xb61d27f6",
        "callGasLimit": "0x5208",
        "verificationGasLimit": "0x186a0",
        "preVerificationGas": "0xb708",
        "maxFeePerGas": "0x3b9aca00",
        "maxPriorityFeePerGas": "0x3b9aca00",
        "paymasterAndData": "0x",
        "signature": "0x"
    })
}

pub fn user_op_bundle(sender_byte: u8, hash: &str) -> Value {
    json!({ "userOp": user_op_json(sender_byte), "userOpHash": hash })
}

pub fn fee_quotes(with_gasless: bool) -> Value {
    let mut quotes = json!({
        "verifyingPaymasterNative": {
            "userOp": user_op_json(0x02),
            "userOpHash": NATIVE_HASH,
            "feeQuote": {
                "tokenInfo": {
                    "chainId": 1,
                    "address": "0x0000000000000000000000000000000000000000",
                    "name": "Ether",
                    "symbol": "ETH",
                    "decimals": 18,
                    "logoURI": ""
                },
                "fee": "21000000000000",
                "balance": "1000000000000000000"
            }
        },
        "tokenPaymaster": {
            "tokenPaymasterAddress": "0x00000000000000000000000000000000000000cc",
            "feeQuotes": []
        }
    });
    if with_gasless {
        quotes["verifyingPaymasterGasless"] = user_op_bundle(0x01, GASLESS_HASH);
    }
    quotes
}

pub fn account_json() -> Value {
    json!({
        "isDeployed": true,
        "chainId": 1,
        "eoaAddress": format!("{:?}", owner()),
        "factoryAddress": "0x00000000000000000000000000000000000000f1",
        "entryPointAddress": "0x5ff137d4b0fdcd49dca30c7cf57e578a026d2789",
        "smartAccountAddress": format!("{:?}", smart_account_address()),
        "owner": format!("{:?}", owner()),
        "index": 0,
        "implementationAddress": "0x00000000000000000000000000000000000000f2",
        "implementationVersion": "1.0.0",
        "fallBackHandlerAddress": "0x00000000000000000000000000000000000000f3",
        "version": "1.0.0"
    })
}

pub fn transaction() -> Value {
    json!({
        "from": format!("{:?}", owner()),
        "to": "0x00000000000000000000000000000000000000d0",
        "value": "0x1",
        "data": "0x"
    })
}
