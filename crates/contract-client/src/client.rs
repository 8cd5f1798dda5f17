use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::{Detokenize, Token, Tokenize};
use ethers::prelude::gas_oracle::{GasOracleMiddleware, ProviderOracle};
use ethers::prelude::{
    Bytes, JsonRpcClient, LocalWallet, MiddlewareBuilder, Signer, TransactionReceipt,
    H256,
};
use ethers::providers::Provider;

use crate::amount::{TokenAmount, DEFAULT_DECIMALS};
use crate::cli::{Endpoint, RpcArgs, WalletArgs};
use crate::contracts::{ContractKind, ContractSet, EthersRemote, RemoteContract};
use crate::signature::{metric_digest, sign_metric};
use crate::transport::Transport;
use crate::{Address, ClientError, U256};

/// Confirmation of an included transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

impl From<TransactionReceipt> for TxReceipt {
    fn from(receipt: TransactionReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|b| b.as_u64()),
            gas_used: receipt.gas_used,
        }
    }
}

/// Result of an approve-then-act operation.
///
/// The two transactions are not atomic. If the second one fails the approval stays in place
/// and the error is [`ClientError::ApprovedButFailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedReceipt {
    /// `None` when nothing had to be approved
    pub approval: Option<TxReceipt>,
    pub receipt: TxReceipt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorInfo {
    pub address: Address,
    pub min_stake: TokenAmount,
    pub staked: TokenAmount,
    pub active: bool,
}

/// One method per DeviceRegistry entry point.
///
/// Reads are passthrough `eth_call`s and are never cached. Submissions wait until the
/// transaction is included. Authorization, staking and slashing rules live in the contract;
/// a call made with the wrong role comes back as a [`ClientError::Reverted`].
#[async_trait]
pub trait Client: Send + Sync {
    /// Address of the signing wallet
    fn address(&self) -> Address;

    /// Chain id the client is connected to
    fn chain_id(&self) -> u64;

    /// Register a device. `owner` defaults to the wallet address.
    /// A non-zero stake is approved on the token contract first.
    async fn register_device(
        &self,
        device_id: &str,
        owner: Option<Address>,
        stake_amount: U256,
    ) -> Result<ApprovedReceipt, ClientError>;

    /// Report a metric value, signed over (device, metric, value, chain id)
    async fn report_metric(
        &self,
        device_id: &str,
        metric_name: &str,
        value: U256,
    ) -> Result<TxReceipt, ClientError>;

    async fn verify_device(&self, device_id: &str) -> Result<TxReceipt, ClientError>;

    async fn is_verified(&self, device_id: &str) -> Result<bool, ClientError>;

    /// Latest reported value of the metric
    async fn get_metric(&self, device_id: &str, metric_name: &str) -> Result<U256, ClientError>;

    /// All registered device ids
    async fn get_device_list(&self) -> Result<Vec<String>, ClientError>;

    async fn get_device_at_index(&self, index: U256) -> Result<String, ClientError>;

    /// Accumulated incentives, scaled by the token's decimals
    async fn get_incentives(&self, device_id: &str) -> Result<TokenAmount, ClientError>;

    /// Tokens staked for the device, scaled by the token's decimals
    async fn get_staked_amount(&self, device_id: &str) -> Result<TokenAmount, ClientError>;

    /// Approve `amount` and stake it for the device
    async fn stake_tokens(
        &self,
        device_id: &str,
        amount: U256,
    ) -> Result<ApprovedReceipt, ClientError>;

    async fn unstake_tokens(&self, device_id: &str) -> Result<TxReceipt, ClientError>;

    /// Token balance of the wallet
    async fn get_token_balance(&self) -> Result<TokenAmount, ClientError>;

    /// Owner only
    async fn register_validator(
        &self,
        validator: Address,
        min_stake: U256,
    ) -> Result<TxReceipt, ClientError>;

    /// Approve `amount` and stake it as the calling validator
    async fn stake_validator_tokens(&self, amount: U256) -> Result<ApprovedReceipt, ClientError>;

    async fn unstake_validator_tokens(&self) -> Result<TxReceipt, ClientError>;

    /// Validator only. `proof` is passed to the contract as opaque bytes.
    async fn report_mal_behavior(
        &self,
        device_id: &str,
        reason: &str,
        proof: Bytes,
    ) -> Result<TxReceipt, ClientError>;

    /// Owner only. A valid report triggers slashing on chain.
    async fn verify_report(&self, report_id: U256, is_valid: bool)
        -> Result<TxReceipt, ClientError>;

    /// Owner only
    async fn set_slashing_percentage(&self, percentage: U256) -> Result<TxReceipt, ClientError>;

    async fn get_validator_info(&self, validator: Address) -> Result<ValidatorInfo, ClientError>;
}

/// Connected to a network but without a signing identity yet
pub struct Session {
    transport: Transport,
    endpoint: Endpoint,
    contracts: ContractSet,
    chain_id: u64,
}

impl Session {
    /// Resolve the endpoint, load ABIs and connect.
    /// Configuration errors are reported before the provider is created.
    pub async fn connect(rpc_args: &RpcArgs) -> Result<Self, ClientError> {
        let endpoint = rpc_args.endpoint()?;
        let contracts = ContractSet::load(rpc_args)?;
        let transport = Transport::connect(&endpoint.rpc_url).await?;
        let chain_id = transport.chain_id().await?;

        if let Some(network) = endpoint.network {
            if network.chain_id() != chain_id {
                log::warn!(
                    "{} reports chain id {chain_id}, expected {} for {network}",
                    endpoint.rpc_url,
                    network.chain_id()
                );
            }
        }
        log::info!("Connected to {} (chain id {chain_id})", endpoint.rpc_url);

        Ok(Self {
            transport,
            endpoint,
            contracts,
            chain_id,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Bind a signing identity. One session can serve several identities.
    pub fn initialize_wallet(&self, wallet_args: &WalletArgs) -> Result<Box<dyn Client>, ClientError> {
        let wallet = get_wallet(wallet_args, self.chain_id)?;
        log::info!("Wallet initialized: {:?}", wallet.address());
        let contracts = self.contracts.clone();
        match &self.transport {
            Transport::Http(provider) => Ok(Box::new(signed_client(
                provider.clone(),
                wallet,
                contracts,
                self.chain_id,
            ))),
            Transport::Ws(provider) => Ok(Box::new(signed_client(
                provider.clone(),
                wallet,
                contracts,
                self.chain_id,
            ))),
        }
    }
}

pub async fn get_client(
    rpc_args: &RpcArgs,
    wallet_args: &WalletArgs,
) -> Result<Box<dyn Client>, ClientError> {
    Session::connect(rpc_args)
        .await?
        .initialize_wallet(wallet_args)
}

fn get_wallet(wallet_args: &WalletArgs, chain_id: u64) -> Result<LocalWallet, ClientError> {
    if let Some(key) = &wallet_args.wallet_key {
        return Ok(LocalWallet::from_str(key.trim_start_matches("0x"))?.with_chain_id(chain_id));
    }
    match &wallet_args.keystore_path {
        None => Err(ClientError::WalletMissing),
        Some(path) => Ok(
            LocalWallet::decrypt_keystore(path, &wallet_args.keystore_password)?
                .with_chain_id(chain_id),
        ),
    }
}

type SignedMiddleware<T> = ethers::prelude::NonceManagerMiddleware<
    ethers::prelude::SignerMiddleware<
        GasOracleMiddleware<Provider<T>, ProviderOracle<Provider<T>>>,
        LocalWallet,
    >,
>;

fn signed_client<T: JsonRpcClient + Clone + 'static>(
    provider: Provider<T>,
    wallet: LocalWallet,
    contracts: ContractSet,
    chain_id: u64,
) -> RegistryClient<EthersRemote<SignedMiddleware<T>>> {
    let address = wallet.address();
    let gas_oracle = ProviderOracle::new(provider.clone());
    let middleware = provider
        .wrap_into(|p| GasOracleMiddleware::new(p, gas_oracle))
        .with_signer(wallet.clone())
        .nonce_manager(address);
    let remote = EthersRemote::new(Arc::new(middleware), address, contracts);
    RegistryClient::new(remote, wallet, chain_id)
}

/// [`Client`] implementation over any [`RemoteContract`]
pub struct RegistryClient<R: RemoteContract> {
    remote: R,
    wallet: LocalWallet,
    chain_id: u64,
}

impl<R: RemoteContract> RegistryClient<R> {
    pub fn new(remote: R, wallet: LocalWallet, chain_id: u64) -> Self {
        Self {
            remote,
            wallet,
            chain_id,
        }
    }

    async fn read<D: Detokenize>(
        &self,
        kind: ContractKind,
        method: &str,
        args: Vec<Token>,
    ) -> Result<D, ClientError> {
        let output = self.remote.read(kind, method, args).await?;
        Ok(D::from_tokens(output)?)
    }

    async fn submit(&self, method: &str, args: Vec<Token>) -> Result<TxReceipt, ClientError> {
        self.remote.submit(ContractKind::Registry, method, args).await
    }

    async fn approve(&self, amount: U256) -> Result<TxReceipt, ClientError> {
        if !self.remote.has_token() {
            return Err(ClientError::TokenNotConfigured);
        }
        let spender = self.remote.contract_address(ContractKind::Registry)?;
        let receipt = self
            .remote
            .submit(ContractKind::Token, "approve", (spender, amount).into_tokens())
            .await?;
        log::info!("Approved {amount} tokens for {spender:?}: {:?}", receipt.tx_hash);
        Ok(receipt)
    }

    /// Approve `amount` (if non-zero), then submit the call that spends it
    async fn approve_then_submit(
        &self,
        amount: U256,
        method: &str,
        args: Vec<Token>,
    ) -> Result<ApprovedReceipt, ClientError> {
        let approval = if amount.is_zero() {
            None
        } else {
            Some(self.approve(amount).await?)
        };
        match (self.submit(method, args).await, approval) {
            (Ok(receipt), approval) => Ok(ApprovedReceipt { approval, receipt }),
            (Err(e), Some(approval)) => {
                log::warn!("{method} failed after approval {:?}: {e}", approval.tx_hash);
                Err(ClientError::ApprovedButFailed {
                    approval,
                    source: Box::new(e),
                })
            }
            (Err(e), None) => Err(e),
        }
    }

    async fn decimals(&self) -> Result<u32, ClientError> {
        if !self.remote.has_token() {
            log::debug!("No token contract configured, assuming {DEFAULT_DECIMALS} decimals");
            return Ok(DEFAULT_DECIMALS);
        }
        let decimals: u8 = self.read(ContractKind::Token, "decimals", vec![]).await?;
        Ok(decimals.into())
    }

    async fn token_amount(&self, raw: U256) -> Result<TokenAmount, ClientError> {
        Ok(TokenAmount::new(raw, self.decimals().await?))
    }
}

#[async_trait]
impl<R: RemoteContract> Client for RegistryClient<R> {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn register_device(
        &self,
        device_id: &str,
        owner: Option<Address>,
        stake_amount: U256,
    ) -> Result<ApprovedReceipt, ClientError> {
        let owner = owner.unwrap_or_else(|| self.address());
        let args = (device_id.to_string(), owner, stake_amount).into_tokens();
        let result = self
            .approve_then_submit(stake_amount, "registerDevice", args)
            .await?;
        log::info!(
            "Device {device_id} registered for {owner:?} with stake {stake_amount}: {:?}",
            result.receipt.tx_hash
        );
        Ok(result)
    }

    async fn report_metric(
        &self,
        device_id: &str,
        metric_name: &str,
        value: U256,
    ) -> Result<TxReceipt, ClientError> {
        let digest = metric_digest(device_id, metric_name, value, self.chain_id);
        let signature = sign_metric(&self.wallet, digest)?;
        let args = (
            device_id.to_string(),
            metric_name.to_string(),
            value,
            Bytes::from(signature.to_vec()),
        )
            .into_tokens();
        let receipt = self.submit("reportMetric", args).await?;
        log::info!(
            "Metric {metric_name}={value} reported for device {device_id}: {:?}",
            receipt.tx_hash
        );
        Ok(receipt)
    }

    async fn verify_device(&self, device_id: &str) -> Result<TxReceipt, ClientError> {
        let receipt = self
            .submit("verifyDevice", device_id.to_string().into_tokens())
            .await?;
        log::info!("Device {device_id} verified: {:?}", receipt.tx_hash);
        Ok(receipt)
    }

    async fn is_verified(&self, device_id: &str) -> Result<bool, ClientError> {
        let verified = self
            .read(
                ContractKind::Registry,
                "isVerified",
                device_id.to_string().into_tokens(),
            )
            .await?;
        log::debug!("Device {device_id} verified status: {verified}");
        Ok(verified)
    }

    async fn get_metric(&self, device_id: &str, metric_name: &str) -> Result<U256, ClientError> {
        let value = self
            .read(
                ContractKind::Registry,
                "getMetric",
                (device_id.to_string(), metric_name.to_string()).into_tokens(),
            )
            .await?;
        log::debug!("Metric {metric_name} for device {device_id}: {value}");
        Ok(value)
    }

    async fn get_device_list(&self) -> Result<Vec<String>, ClientError> {
        self.read(ContractKind::Registry, "getDeviceList", vec![])
            .await
    }

    async fn get_device_at_index(&self, index: U256) -> Result<String, ClientError> {
        self.read(ContractKind::Registry, "getDeviceAtIndex", index.into_tokens())
            .await
    }

    async fn get_incentives(&self, device_id: &str) -> Result<TokenAmount, ClientError> {
        let raw = self
            .read(
                ContractKind::Registry,
                "getIncentives",
                device_id.to_string().into_tokens(),
            )
            .await?;
        let incentives = self.token_amount(raw).await?;
        log::debug!("Incentives for device {device_id}: {incentives}");
        Ok(incentives)
    }

    async fn get_staked_amount(&self, device_id: &str) -> Result<TokenAmount, ClientError> {
        let raw = self
            .read(
                ContractKind::Registry,
                "getStakedAmount",
                device_id.to_string().into_tokens(),
            )
            .await?;
        let staked = self.token_amount(raw).await?;
        log::debug!("Staked for device {device_id}: {staked}");
        Ok(staked)
    }

    async fn stake_tokens(
        &self,
        device_id: &str,
        amount: U256,
    ) -> Result<ApprovedReceipt, ClientError> {
        let args = (device_id.to_string(), amount).into_tokens();
        let result = self.approve_then_submit(amount, "stakeTokens", args).await?;
        log::info!(
            "Staked {amount} for device {device_id}: {:?}",
            result.receipt.tx_hash
        );
        Ok(result)
    }

    async fn unstake_tokens(&self, device_id: &str) -> Result<TxReceipt, ClientError> {
        let receipt = self
            .submit("unstakeTokens", device_id.to_string().into_tokens())
            .await?;
        log::info!("Unstaked tokens of device {device_id}: {:?}", receipt.tx_hash);
        Ok(receipt)
    }

    async fn get_token_balance(&self) -> Result<TokenAmount, ClientError> {
        if !self.remote.has_token() {
            return Err(ClientError::TokenNotConfigured);
        }
        let raw = self
            .read(ContractKind::Token, "balanceOf", self.address().into_tokens())
            .await?;
        let balance = self.token_amount(raw).await?;
        log::debug!("Token balance of {:?}: {balance}", self.address());
        Ok(balance)
    }

    async fn register_validator(
        &self,
        validator: Address,
        min_stake: U256,
    ) -> Result<TxReceipt, ClientError> {
        let receipt = self
            .submit("registerValidator", (validator, min_stake).into_tokens())
            .await?;
        log::info!(
            "Validator {validator:?} registered with min stake {min_stake}: {:?}",
            receipt.tx_hash
        );
        Ok(receipt)
    }

    async fn stake_validator_tokens(&self, amount: U256) -> Result<ApprovedReceipt, ClientError> {
        let result = self
            .approve_then_submit(amount, "stakeValidatorTokens", amount.into_tokens())
            .await?;
        log::info!(
            "Validator {:?} staked {amount}: {:?}",
            self.address(),
            result.receipt.tx_hash
        );
        Ok(result)
    }

    async fn unstake_validator_tokens(&self) -> Result<TxReceipt, ClientError> {
        let receipt = self.submit("unstakeValidatorTokens", vec![]).await?;
        log::info!("Validator {:?} unstaked: {:?}", self.address(), receipt.tx_hash);
        Ok(receipt)
    }

    async fn report_mal_behavior(
        &self,
        device_id: &str,
        reason: &str,
        proof: Bytes,
    ) -> Result<TxReceipt, ClientError> {
        let args = (device_id.to_string(), reason.to_string(), proof).into_tokens();
        let receipt = self.submit("reportMalBehavior", args).await?;
        log::info!(
            "Misbehavior of device {device_id} reported ({reason}): {:?}",
            receipt.tx_hash
        );
        Ok(receipt)
    }

    async fn verify_report(
        &self,
        report_id: U256,
        is_valid: bool,
    ) -> Result<TxReceipt, ClientError> {
        let receipt = self
            .submit("verifyReport", (report_id, is_valid).into_tokens())
            .await?;
        log::info!(
            "Report {report_id} marked {}: {:?}",
            if is_valid { "valid" } else { "invalid" },
            receipt.tx_hash
        );
        Ok(receipt)
    }

    async fn set_slashing_percentage(&self, percentage: U256) -> Result<TxReceipt, ClientError> {
        let receipt = self
            .submit("setSlashingPercentage", percentage.into_tokens())
            .await?;
        log::info!("Slashing percentage set to {percentage}%: {:?}", receipt.tx_hash);
        Ok(receipt)
    }

    async fn get_validator_info(&self, validator: Address) -> Result<ValidatorInfo, ClientError> {
        let (min_stake, staked, active): (U256, U256, bool) = self
            .read(
                ContractKind::Registry,
                "getValidatorInfo",
                validator.into_tokens(),
            )
            .await?;
        let decimals = self.decimals().await?;
        Ok(ValidatorInfo {
            address: validator,
            min_stake: TokenAmount::new(min_stake, decimals),
            staked: TokenAmount::new(staked, decimals),
            active,
        })
    }
}
