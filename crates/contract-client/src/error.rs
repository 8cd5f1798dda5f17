use std::path::PathBuf;

use ethers::abi::{self, InvalidOutputType, ParamType};
use ethers::prelude::{Bytes, MiddlewareError, H256};
use ethers::signers::WalletError;

use crate::client::TxReceipt;

const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

// Revert messages produced by owner/validator gated functions
const UNAUTHORIZED_PATTERNS: &[&str] = &[
    "caller is not the owner",
    "only owner",
    "not authorized",
    "unauthorized",
    "not a validator",
    "only validator",
    "not the device owner",
    "not device owner",
];

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Unknown network: {0:?} (expected \"testnet\" or \"mainnet\")")]
    UnknownNetwork(String),
    #[error("Invalid RPC URL: {0:?}")]
    InvalidRpcUrl(#[from] url::ParseError),
    #[error("Unsupported RPC protocol")]
    InvalidProtocol,
    #[error("Invalid ABI in {path:?}: {reason}")]
    InvalidAbi { path: PathBuf, reason: String },
    #[error("ABI error: {0}")]
    Abi(#[from] abi::Error),
    #[error("Token contract address not configured")]
    TokenNotConfigured,
    #[error("Either wallet key or keystore path must be provided")]
    WalletMissing,
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
    #[error("RPC provider error: {0}")]
    Provider(#[from] ethers::providers::ProviderError),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Transaction receipt missing")]
    TxReceiptMissing,
    #[error("Transaction reverted: {}", reason.as_deref().unwrap_or("no reason given"))]
    Reverted {
        reason: Option<String>,
        tx_hash: Option<H256>,
    },
    #[error("Approval {:?} was included but the following call failed: {source}", approval.tx_hash)]
    ApprovedButFailed {
        approval: TxReceipt,
        source: Box<ClientError>,
    },
    #[error("Cannot decode contract output: {0}")]
    Decode(#[from] InvalidOutputType),
}

impl ClientError {
    /// Local setup problem, detected before anything was sent
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownNetwork(_)
                | Self::InvalidRpcUrl(_)
                | Self::InvalidProtocol
                | Self::InvalidAbi { .. }
                | Self::Abi(_)
                | Self::TokenNotConfigured
                | Self::WalletMissing
                | Self::Wallet(_)
        )
    }

    /// The request never made it into a block
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::Transport(_) | Self::TxReceiptMissing
        )
    }

    /// The contract executed the call and reverted
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::Reverted { .. } => true,
            Self::ApprovedButFailed { source, .. } => source.is_rejection(),
            _ => false,
        }
    }

    /// A revert caused by calling a role-gated function with the wrong identity
    pub fn is_unauthorized(&self) -> bool {
        let Some(reason) = self.revert_reason() else {
            return false;
        };
        let reason = reason.to_lowercase();
        UNAUTHORIZED_PATTERNS.iter().any(|p| reason.contains(p))
    }

    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::Reverted { reason, .. } => reason.as_deref(),
            Self::ApprovedButFailed { source, .. } => source.revert_reason(),
            _ => None,
        }
    }

    /// Classify an error returned by the middleware stack.
    /// Anything carrying revert data or a revert message is a contract rejection,
    /// everything else happened before inclusion.
    pub(crate) fn from_middleware<E: MiddlewareError>(err: E) -> Self {
        if let Some(response) = err.as_error_response() {
            // ethers reports an empty payload for any message mentioning "revert"
            let data = response.as_revert_data().filter(|data| !data.is_empty());
            if let Some(data) = data {
                return Self::Reverted {
                    reason: decode_revert_reason(&data),
                    tx_hash: None,
                };
            }
            if let Some(reason) = revert_message(&response.message) {
                return Self::Reverted {
                    reason,
                    tx_hash: None,
                };
            }
            if response.is_revert() {
                return Self::Reverted {
                    reason: None,
                    tx_hash: None,
                };
            }
        }
        Self::Transport(err.to_string())
    }
}

// Hardhat's wording extends ganache's and must be matched first
const REVERT_PREFIXES: &[&str] = &[
    "execution reverted",
    "VM Exception while processing transaction: reverted with reason string",
    "VM Exception while processing transaction: revert",
];

/// Reason from a node's revert message: geth "execution reverted: X",
/// ganache "VM Exception while processing transaction: revert X",
/// hardhat "... reverted with reason string 'X'"
fn revert_message(message: &str) -> Option<Option<String>> {
    let rest = REVERT_PREFIXES
        .iter()
        .find_map(|prefix| message.find(prefix).map(|i| &message[i + prefix.len()..]))?;
    let reason = rest.trim_start_matches(':').trim().trim_matches('\'');
    Some((!reason.is_empty()).then(|| reason.to_string()))
}

/// Decode `Error(string)` and `Panic(uint256)` payloads. Custom errors are reported by selector.
pub(crate) fn decode_revert_reason(data: &Bytes) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    let (selector, payload) = data.split_at(4);
    if selector == ERROR_STRING_SELECTOR {
        return abi::decode(&[ParamType::String], payload)
            .ok()?
            .pop()?
            .into_string();
    }
    if selector == PANIC_SELECTOR {
        let code = abi::decode(&[ParamType::Uint(256)], payload)
            .ok()?
            .pop()?
            .into_uint()?;
        return Some(format!("panic code {code:#x}"));
    }
    Some(format!("custom error {}", Bytes::from(selector.to_vec())))
}
