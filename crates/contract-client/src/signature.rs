use ethers::abi::{encode, Token};
use ethers::prelude::{LocalWallet, Signature, H256, U256};
use ethers::utils::{hash_message, keccak256};

use crate::ClientError;

/// `keccak256(abi.encodePacked(deviceId, metricName, value, chainId))`
///
/// Strings are packed as raw bytes, both integers as full 32 byte big-endian words.
/// The chain id is part of the preimage so a signed report cannot be replayed on another network.
pub fn metric_digest(device_id: &str, metric_name: &str, value: U256, chain_id: u64) -> H256 {
    let mut preimage = Vec::with_capacity(device_id.len() + metric_name.len() + 64);
    preimage.extend_from_slice(device_id.as_bytes());
    preimage.extend_from_slice(metric_name.as_bytes());
    preimage.extend(encode(&[Token::Uint(value), Token::Uint(chain_id.into())]));
    keccak256(preimage).into()
}

/// Sign the digest as an EIP-191 personal message, which is what `ecrecover` on the
/// contract side expects after applying `toEthSignedMessageHash`.
pub fn sign_metric(wallet: &LocalWallet, digest: H256) -> Result<Signature, ClientError> {
    Ok(wallet.sign_hash(hash_message(digest))?)
}
