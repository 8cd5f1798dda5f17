mod amount;
mod cli;
mod client;
mod contracts;
mod error;
mod signature;
mod transport;

pub use ethers::types::{Address, Bytes, H256, U256};

pub use amount::{TokenAmount, DEFAULT_DECIMALS};
pub use cli::{Endpoint, Network, RpcArgs, WalletArgs};
pub use client::{
    get_client, ApprovedReceipt, Client, RegistryClient, Session, TxReceipt, ValidatorInfo,
};
pub use contracts::{
    load_abi, ContractHandle, ContractKind, ContractSet, EthersRemote, RemoteContract,
    DEVICE_REGISTRY_ABI, ERC20_ABI,
};
pub use error::ClientError;
pub use signature::{metric_digest, sign_metric};
