use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use clap::Args;
use lazy_static::lazy_static;

use crate::{Address, ClientError};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545/";

lazy_static! {
    static ref TESTNET_RPC_URL: String = std::env::var("TESTNET_RPC_URL")
        .unwrap_or("https://dream-rpc.somnia.network".to_string());
    static ref MAINNET_RPC_URL: String = std::env::var("MAINNET_RPC_URL")
        .unwrap_or("https://api.infra.mainnet.somnia.network".to_string());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Testnet,
    Mainnet,
}

impl Network {
    pub fn rpc_url(&self) -> &'static str {
        match self {
            Network::Testnet => &TESTNET_RPC_URL,
            Network::Mainnet => &MAINNET_RPC_URL,
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Testnet => 50312,
            Network::Mainnet => 5031,
        }
    }
}

impl FromStr for Network {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            _ => Err(ClientError::UnknownNetwork(s.to_string())),
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Testnet => f.write_str("testnet"),
            Network::Mainnet => f.write_str("mainnet"),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RpcArgs {
    #[arg(long, env, help = "Named network: testnet or mainnet")]
    pub network: Option<String>,
    #[arg(
        long,
        env,
        help = "Blockchain RPC URL. Overrides the named network's endpoint"
    )]
    pub rpc_url: Option<String>,
    #[arg(long, env, help = "DeviceRegistry contract address")]
    pub registry_contract_addr: Address,
    #[arg(
        long,
        env,
        help = "DeviceRegistry ABI JSON file. The bundled ABI is used if not provided"
    )]
    pub registry_abi_path: Option<PathBuf>,
    #[arg(long, env, help = "ERC-20 staking token address")]
    pub token_contract_addr: Option<Address>,
    #[arg(
        long,
        env,
        help = "ERC-20 ABI JSON file. The bundled ABI is used if not provided"
    )]
    pub token_abi_path: Option<PathBuf>,
}

/// Where to connect, resolved from [`RpcArgs`] without touching the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub rpc_url: String,
    pub network: Option<Network>,
}

impl RpcArgs {
    pub fn with_rpc_url(rpc_url: impl Into<String>, registry_contract_addr: Address) -> Self {
        Self {
            network: None,
            rpc_url: Some(rpc_url.into()),
            registry_contract_addr,
            registry_abi_path: None,
            token_contract_addr: None,
            token_abi_path: None,
        }
    }

    pub fn with_network(network: impl Into<String>, registry_contract_addr: Address) -> Self {
        Self {
            network: Some(network.into()),
            rpc_url: None,
            registry_contract_addr,
            registry_abi_path: None,
            token_contract_addr: None,
            token_abi_path: None,
        }
    }

    pub fn registry_abi(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_abi_path = Some(path.into());
        self
    }

    pub fn token(mut self, addr: Address, abi_path: Option<PathBuf>) -> Self {
        self.token_contract_addr = Some(addr);
        self.token_abi_path = abi_path;
        self
    }

    pub fn endpoint(&self) -> Result<Endpoint, ClientError> {
        let network = self
            .network
            .as_deref()
            .map(Network::from_str)
            .transpose()?;
        let rpc_url = match (&self.rpc_url, network) {
            (Some(url), _) => url.clone(),
            (None, Some(network)) => network.rpc_url().to_string(),
            (None, None) => {
                log::warn!("Neither network nor RPC URL provided. Using {DEFAULT_RPC_URL}");
                DEFAULT_RPC_URL.to_string()
            }
        };
        Ok(Endpoint { rpc_url, network })
    }
}

/// Signing identity. Deliberately not `Debug`.
#[derive(Args, Clone, Default)]
pub struct WalletArgs {
    #[arg(long, env, help = "Hex-encoded private key", hide_env_values = true)]
    pub wallet_key: Option<String>,
    #[arg(long, env, help = "Path to an encrypted JSON keystore")]
    pub keystore_path: Option<PathBuf>,
    #[arg(
        long,
        env,
        help = "Keystore password",
        default_value = "",
        hide_env_values = true
    )]
    pub keystore_password: String,
}

impl WalletArgs {
    pub fn from_key(key: impl Into<String>) -> Self {
        Self {
            wallet_key: Some(key.into()),
            ..Default::default()
        }
    }
}
