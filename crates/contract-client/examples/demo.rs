use clap::Parser;
use ethers::types::{Address, U256};
use simple_logger::SimpleLogger;

use pulse_contract_client::{RpcArgs, TokenAmount, WalletArgs};

#[derive(Parser)]
struct Cli {
    #[command(flatten)]
    rpc: RpcArgs,
    #[command(flatten)]
    wallet: WalletArgs,
    #[arg(long, default_value = "sensor-001")]
    device_id: String,
    #[arg(long, help = "Device owner. Defaults to the wallet address")]
    owner: Option<Address>,
    #[arg(long, default_value = "100", help = "Tokens staked on registration")]
    stake: String,
    #[arg(long, help = "Withdraw the stake at the end")]
    unstake: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;
    let cli: Cli = Cli::parse();

    let client = pulse_contract_client::get_client(&cli.rpc, &cli.wallet).await?;
    let device_id = cli.device_id.as_str();

    if cli.rpc.token_contract_addr.is_some() {
        println!("Token balance: {}", client.get_token_balance().await?);
    }

    let stake = TokenAmount::parse(&cli.stake, 18)?;
    client
        .register_device(device_id, cli.owner, stake.into())
        .await?;

    client
        .report_metric(device_id, "temperature", U256::from(25))
        .await?;
    client
        .report_metric(device_id, "uptime", U256::from(98))
        .await?;
    client.verify_device(device_id).await?;

    println!("Verified: {}", client.is_verified(device_id).await?);
    println!(
        "Temperature: {}",
        client.get_metric(device_id, "temperature").await?
    );
    println!("Incentives: {}", client.get_incentives(device_id).await?);
    println!("Staked: {}", client.get_staked_amount(device_id).await?);
    if cli.rpc.token_contract_addr.is_some() {
        println!("Token balance: {}", client.get_token_balance().await?);
    }

    client
        .get_device_list()
        .await?
        .iter()
        .for_each(|d| println!("{d}"));
    println!(
        "Device #0: {}",
        client.get_device_at_index(U256::zero()).await?
    );

    if cli.unstake {
        client.unstake_tokens(device_id).await?;
    }
    Ok(())
}
