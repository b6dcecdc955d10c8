// src/lib.rs
//! Routes provider-style requests through an account abstraction smart account.
//!
//! [`AaWrapProvider`] wraps an injected [`EthereumProvider`]: account queries answer with the
//! smart account address and `eth_sendTransaction` is priced, signed and relayed as a user
//! operation by the backend, optionally after the host application picks a fee option.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod router;
pub mod rpc;
pub mod signer;
pub mod smart_account;
pub mod types;

pub use cache::{AddressResolver, AddressStore, FileStore, MemoryStore};
pub use client::{Backend, HttpBackend};
pub use config::{AaOptions, AccountContract, AccountContractConfig, SmartAccountConfig};
pub use error::{AaError, Result};
pub use provider::{EthereumProvider, LocalWalletProvider, PasskeyCapability, ProviderEvent};
pub use router::{AaWrapProvider, SendTransactionMode, SendTransactionRequest};
pub use signer::{SignedUserOperation, Signer};
pub use smart_account::SmartAccount;
