// src/main.rs
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use aa_wallet_provider::cache::{AddressStore, FileStore, MemoryStore};
use aa_wallet_provider::rpc::{WalletRpcImpl, WalletRpcServer};
use aa_wallet_provider::{
    AaWrapProvider, LocalWalletProvider, SendTransactionMode, SendTransactionRequest, SmartAccount,
    SmartAccountConfig,
};
use clap::Parser;
use dotenv::dotenv;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, env = "AA_RPC_SERVER_ADDR", default_value = "127.0.0.1:8545")]
    rpc_server_addr: String,

    /// Owner key of the smart account.
    #[clap(short, long, env = "AA_PRIVATE_KEY")]
    private_key: String,

    #[clap(short, long, env = "AA_CHAIN_ID")]
    chain_id: u64,

    /// Node for methods the wallet does not answer itself.
    #[clap(short, long, env = "AA_ETH_RPC_URL")]
    eth_rpc_url: Option<String>,

    /// JSON file with project credentials and the account contract registry.
    #[clap(long, env = "AA_CONFIG")]
    config: PathBuf,

    /// 0 = user select, 1 = gasless, 2 = user paid native.
    #[clap(long, env = "AA_SEND_TX_MODE", default_value = "2", value_parser = parse_mode)]
    send_tx_mode: SendTransactionMode,

    /// Where resolved smart account addresses are kept between runs.
    #[clap(long, env = "AA_ADDRESS_STORE")]
    address_store: Option<PathBuf>,

    #[clap(long, env = "AA_LOG_LEVEL", default_value = "info")]
    log_level: Level,
}

fn parse_mode(raw: &str) -> Result<SendTransactionMode, String> {
    let value: u8 = raw.parse().map_err(|e| format!("{e}"))?;
    SendTransactionMode::try_from(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = SmartAccountConfig::from_file(&args.config)?;

    let mut wallet = LocalWalletProvider::new(&args.private_key, args.chain_id)?;
    if let Some(url) = &args.eth_rpc_url {
        wallet = wallet.with_rpc(url)?;
    }

    let store: Arc<dyn AddressStore> = match &args.address_store {
        Some(path) => Arc::new(FileStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    };

    let smart_account = SmartAccount::with_http_backend(Arc::new(wallet), config, store)?;
    let provider = Arc::new(AaWrapProvider::new(Arc::new(smart_account), args.send_tx_mode));

    tokio::spawn(log_send_transaction_requests(provider.on_request_send_transaction()));

    let server_addr: SocketAddr = args.rpc_server_addr.parse()?;
    info!("Starting smart account wallet RPC server on {}", server_addr);

    let server_handle = start_server(server_addr, WalletRpcImpl::new(provider)).await?;

    tokio::signal::ctrl_c().await?;
    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}

/// Logs every confirmation request until the router goes away. Returns how many were seen.
async fn log_send_transaction_requests(mut requests: broadcast::Receiver<SendTransactionRequest>) -> usize {
    let mut seen = 0;
    loop {
        match requests.recv().await {
            Ok(request) => {
                seen += 1;
                info!(
                    "Transaction {} awaits a fee choice (gasless: {}, token quotes: {})",
                    request.id,
                    request.fee_quotes.verifying_paymaster_gasless.is_some(),
                    request.fee_quotes.token_paymaster.as_ref().map_or(0, |t| t.fee_quotes.len()),
                );
            }
            Err(RecvError::Lagged(skipped)) => warn!("Skipped {} confirmation requests", skipped),
            Err(RecvError::Closed) => break,
        }
    }
    seen
}

async fn start_server(server_addr: SocketAddr, wallet_rpc: WalletRpcImpl) -> anyhow::Result<ServerHandle> {
    let server = ServerBuilder::default().build(server_addr).await?;

    let server_handle = server.start(wallet_rpc.into_rpc());

    Ok(server_handle)
}
