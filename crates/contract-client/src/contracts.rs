use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::{Abi, Function, Token};
use ethers::prelude::{
    BlockId, BlockNumber, Middleware, TransactionReceipt, TransactionRequest, H256, U64,
};
use ethers::types::transaction::eip2718::TypedTransaction;
use lazy_static::lazy_static;

use crate::cli::RpcArgs;
use crate::client::TxReceipt;
use crate::{Address, ClientError};

lazy_static! {
    pub static ref DEVICE_REGISTRY_ABI: Abi =
        serde_json::from_str(include_str!("../abi/DeviceRegistry.json"))
            .expect("Invalid bundled DeviceRegistry ABI");
    pub static ref ERC20_ABI: Abi =
        serde_json::from_str(include_str!("../abi/IERC20.json")).expect("Invalid bundled ERC-20 ABI");
}

/// Load an ABI from a JSON file. Both a bare ABI array and a build artifact
/// with an `abi` field are accepted.
pub fn load_abi(path: &Path) -> Result<Abi, ClientError> {
    let invalid = |reason: String| ClientError::InvalidAbi {
        path: path.to_path_buf(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let mut json: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
    if let Some(abi) = json.get_mut("abi") {
        json = abi.take();
    }
    serde_json::from_value(json).map_err(|e| invalid(e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    Registry,
    Token,
}

impl Display for ContractKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractKind::Registry => f.write_str("DeviceRegistry"),
            ContractKind::Token => f.write_str("ERC20"),
        }
    }
}

/// Address and interface of one remote contract
#[derive(Debug, Clone)]
pub struct ContractHandle {
    pub address: Address,
    pub abi: Abi,
}

impl ContractHandle {
    pub fn new(address: Address, abi: Abi) -> Self {
        Self { address, abi }
    }

    fn function(&self, method: &str) -> Result<&Function, ClientError> {
        Ok(self.abi.function(method)?)
    }
}

/// Registry handle plus the optional staking token handle
#[derive(Debug, Clone)]
pub struct ContractSet {
    pub registry: ContractHandle,
    pub token: Option<ContractHandle>,
}

impl ContractSet {
    /// Build handles from the configured addresses, using the bundled ABIs
    /// unless a file is given
    pub fn load(args: &RpcArgs) -> Result<Self, ClientError> {
        let registry_abi = match &args.registry_abi_path {
            Some(path) => load_abi(path)?,
            None => DEVICE_REGISTRY_ABI.clone(),
        };
        let token = match (args.token_contract_addr, &args.token_abi_path) {
            (Some(addr), Some(path)) => Some(ContractHandle::new(addr, load_abi(path)?)),
            (Some(addr), None) => Some(ContractHandle::new(addr, ERC20_ABI.clone())),
            (None, Some(path)) => {
                log::warn!("Token ABI {path:?} provided without a token address. Ignoring");
                None
            }
            (None, None) => None,
        };
        Ok(Self {
            registry: ContractHandle::new(args.registry_contract_addr, registry_abi),
            token,
        })
    }

    pub fn get(&self, kind: ContractKind) -> Result<&ContractHandle, ClientError> {
        match kind {
            ContractKind::Registry => Ok(&self.registry),
            ContractKind::Token => self.token.as_ref().ok_or(ClientError::TokenNotConfigured),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

/// The contract as an opaque remote service: read-only queries and signed submissions.
/// All business rules are evaluated on chain.
#[async_trait]
pub trait RemoteContract: Send + Sync {
    /// Address that signs submissions
    fn sender(&self) -> Address;

    /// Address of the given contract, if configured
    fn contract_address(&self, kind: ContractKind) -> Result<Address, ClientError>;

    /// Whether a token contract is configured
    fn has_token(&self) -> bool;

    /// `eth_call` the method and return the decoded outputs
    async fn read(
        &self,
        kind: ContractKind,
        method: &str,
        args: Vec<Token>,
    ) -> Result<Vec<Token>, ClientError>;

    /// Send a signed transaction and wait until it is included
    async fn submit(
        &self,
        kind: ContractKind,
        method: &str,
        args: Vec<Token>,
    ) -> Result<TxReceipt, ClientError>;
}

/// [`RemoteContract`] backed by an ethers middleware stack
pub struct EthersRemote<M: Middleware> {
    client: Arc<M>,
    sender: Address,
    contracts: ContractSet,
}

impl<M: Middleware + 'static> EthersRemote<M> {
    pub fn new(client: Arc<M>, sender: Address, contracts: ContractSet) -> Self {
        Self {
            client,
            sender,
            contracts,
        }
    }

    fn transaction(
        &self,
        kind: ContractKind,
        method: &str,
        args: &[Token],
    ) -> Result<(&Function, TypedTransaction), ClientError> {
        let contract = self.contracts.get(kind)?;
        let function = contract.function(method)?;
        let data = function.encode_input(args)?;
        let tx = TransactionRequest::new()
            .from(self.sender)
            .to(contract.address)
            .data(data);
        Ok((function, tx.into()))
    }

    /// Re-run a reverted transaction as a call on top of its parent block
    /// to recover the revert reason. Returns `None` if the node does not report it.
    async fn replay_revert_reason(
        &self,
        tx: &TypedTransaction,
        block: Option<U64>,
    ) -> Option<String> {
        match self.client.call(tx, parent_block(block)).await {
            Ok(_) => None,
            Err(e) => match ClientError::from_middleware(e) {
                ClientError::Reverted { reason, .. } => reason,
                _ => None,
            },
        }
    }

    /// Outcome of an included transaction: its receipt, or the revert
    async fn settle(
        &self,
        tx: &TypedTransaction,
        tx_hash: H256,
        receipt: Option<TransactionReceipt>,
    ) -> Result<TxReceipt, ClientError> {
        let receipt = receipt.ok_or(ClientError::TxReceiptMissing)?;
        log::debug!("Tx receipt: {receipt:?}");

        if receipt.status == Some(U64::zero()) {
            let reason = self.replay_revert_reason(tx, receipt.block_number).await;
            return Err(ClientError::Reverted {
                reason,
                tx_hash: Some(tx_hash),
            });
        }
        Ok(receipt.into())
    }
}

#[async_trait]
impl<M: Middleware + 'static> RemoteContract for EthersRemote<M> {
    fn sender(&self) -> Address {
        self.sender
    }

    fn contract_address(&self, kind: ContractKind) -> Result<Address, ClientError> {
        Ok(self.contracts.get(kind)?.address)
    }

    fn has_token(&self) -> bool {
        self.contracts.has_token()
    }

    async fn read(
        &self,
        kind: ContractKind,
        method: &str,
        args: Vec<Token>,
    ) -> Result<Vec<Token>, ClientError> {
        let (function, tx) = self.transaction(kind, method, &args)?;
        log::trace!("Calling {kind}.{method} with {args:?}");
        let output = self
            .client
            .call(&tx, None)
            .await
            .map_err(ClientError::from_middleware)?;
        Ok(function.decode_output(&output)?)
    }

    async fn submit(
        &self,
        kind: ContractKind,
        method: &str,
        args: Vec<Token>,
    ) -> Result<TxReceipt, ClientError> {
        let (_, tx) = self.transaction(kind, method, &args)?;
        log::trace!("Sending {kind}.{method} with {args:?}");
        let pending_tx = self
            .client
            .send_transaction(tx.clone(), None)
            .await
            .map_err(ClientError::from_middleware)?;
        let tx_hash = *pending_tx;
        log::debug!("{kind}.{method} submitted: {tx_hash:?}");
        let receipt = pending_tx.await?;
        self.settle(&tx, tx_hash, receipt).await
    }
}

fn parent_block(block: Option<U64>) -> Option<BlockId> {
    block.map(|b| BlockId::Number(BlockNumber::Number(b.saturating_sub(U64::one()))))
}
