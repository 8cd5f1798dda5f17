use clap::Parser;
use ethers::types::{Bytes, U256};
use simple_logger::SimpleLogger;

use pulse_contract_client::{RpcArgs, Session, TokenAmount, WalletArgs};

#[derive(Parser)]
struct Cli {
    #[command(flatten)]
    rpc: RpcArgs,
    #[arg(long, env, hide_env_values = true, help = "Contract owner private key")]
    owner_key: String,
    #[arg(long, env, hide_env_values = true, help = "Validator private key")]
    validator_key: String,
    #[arg(long, env, hide_env_values = true, help = "Device owner private key")]
    device_owner_key: String,
    #[arg(long, default_value = "sensor-malicious-001")]
    device_id: String,
    #[arg(long, default_value = "1", help = "Id of the misbehavior report to verify")]
    report_id: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;
    let cli: Cli = Cli::parse();
    let device_id = cli.device_id.as_str();

    let session = Session::connect(&cli.rpc).await?;
    let owner = session.initialize_wallet(&WalletArgs::from_key(cli.owner_key))?;
    let validator = session.initialize_wallet(&WalletArgs::from_key(cli.validator_key))?;
    let device_owner = session.initialize_wallet(&WalletArgs::from_key(cli.device_owner_key))?;
    let tokens = |amount: &str| TokenAmount::parse(amount, 18).map(U256::from);

    owner.set_slashing_percentage(U256::from(10)).await?;
    owner
        .register_validator(validator.address(), tokens("50")?)
        .await?;
    validator.stake_validator_tokens(tokens("100")?).await?;

    device_owner
        .register_device(device_id, Some(device_owner.address()), U256::zero())
        .await?;
    device_owner.stake_tokens(device_id, tokens("200")?).await?;
    device_owner
        .report_metric(device_id, "temperature", U256::from(25))
        .await?;
    device_owner
        .report_metric(device_id, "uptime", U256::from(95))
        .await?;

    println!("Before slashing:");
    println!("  incentives: {}", device_owner.get_incentives(device_id).await?);
    println!("  staked: {}", device_owner.get_staked_amount(device_id).await?);

    let proof = Bytes::from("Device reported an invalid temperature: 1000C".as_bytes().to_vec());
    validator
        .report_mal_behavior(device_id, "Invalid temperature", proof)
        .await?;
    owner.verify_report(cli.report_id.into(), true).await?;

    println!("After slashing:");
    println!("  incentives: {}", device_owner.get_incentives(device_id).await?);
    println!("  staked: {}", device_owner.get_staked_amount(device_id).await?);

    let info = validator.get_validator_info(validator.address()).await?;
    println!(
        "Validator {:?}: staked {}, active {}",
        info.address, info.staked, info.active
    );
    println!("Validator balance: {}", validator.get_token_balance().await?);
    Ok(())
}
