// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use ethers::types::{Address, Bytes, U256};
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use tokio::sync::Mutex;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use aa_entrypoint::rpc::{EntryPointRpcImpl, EntryPointRpcServer};
use aa_entrypoint::samples::{SimpleAccountFactory, SponsoringPaymaster};
use aa_entrypoint::EntryPoint;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, default_value = "127.0.0.1:8545")]
    rpc_server_addr: String,

    #[clap(short, long, default_value_t = 31337)]
    chain_id: u64,

    /// Base fee in wei applied to every submission.
    #[clap(short, long, default_value_t = 10_000_000_000)]
    base_fee: u64,

    /// Network priority fee in wei operations must at least match.
    #[clap(short, long, default_value_t = 1_000_000_000)]
    priority_fee: u64,

    /// Entry point address, hex encoded.
    #[clap(short, long, default_value = "0x0000000000000000000000000000000000004337")]
    entry_point: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command line arguments
    let args = Args::parse();
    let entry_point_addr: Address = args.entry_point.parse()?;

    // Build the entry point over a demo genesis: a registered account
    // factory and a funded, staked sponsoring paymaster.
    let mut entry_point = EntryPoint::new(
        entry_point_addr,
        args.chain_id,
        U256::from(args.base_fee),
        U256::from(args.priority_fee),
    );

    let factory_addr = Address::from_low_u64_be(0xfac7041);
    entry_point
        .world
        .register_factory(factory_addr, Box::new(SimpleAccountFactory));

    let paymaster_addr = Address::from_low_u64_be(0x9a13a57e1);
    entry_point.world.register_paymaster(
        paymaster_addr,
        Box::new(SponsoringPaymaster::new(Bytes::from_static(b"sponsored"))),
    );
    entry_point.world.fund(paymaster_addr, U256::exp10(19));
    entry_point.add_stake(paymaster_addr, U256::exp10(18) * U256::from(2))?;

    info!("Entry point at {entry_point_addr}");
    info!("Demo account factory at {factory_addr}");
    info!("Demo paymaster at {paymaster_addr} (voucher: \"sponsored\")");

    // Start the JSON-RPC server
    let server_addr: SocketAddr = args.rpc_server_addr.parse()?;
    info!("Starting entry point RPC server on {server_addr}");
    let server_handle = start_server(server_addr, Arc::new(Mutex::new(entry_point))).await?;

    // Keep the server running until Ctrl+C is pressed
    tokio::signal::ctrl_c().await?;
    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}

async fn start_server(
    server_addr: SocketAddr,
    entry_point: Arc<Mutex<EntryPoint>>,
) -> anyhow::Result<ServerHandle> {
    let server = ServerBuilder::default().build(server_addr).await?;
    let module = EntryPointRpcImpl::new(entry_point).into_rpc();
    let server_handle = server.start(module);

    Ok(server_handle)
}
