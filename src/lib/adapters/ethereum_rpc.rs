use alloy::{
    network::EthereumWallet,
    primitives::{
        Address,
        B256,
        U256,
    },
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
    rpc::types::Filter,
    signers::local::PrivateKeySigner,
    sol,
    sol_types::{
        SolEvent,
        decode_revert_reason,
    },
    transports::http::reqwest::Url,
};

use crate::{
    domain::{
        commitment::Commitment,
        deposit_log::DepositEvent,
        proof::WithdrawCallArgs,
    },
    ports::ledger::{
        Ledger,
        LedgerError,
        RevertReason,
        TxReceipt,
    },
};

/// Maximum block range per log query (avoids RPC limits).
const BATCH_SIZE: u64 = 500;

// Generate contract bindings using Alloy's sol! macro
sol! {
    #[sol(rpc)]
    interface ITornado {
        event Deposit(bytes32 indexed commitment, uint32 leafIndex, uint256 timestamp);

        function denomination() external view returns (uint256);
        function isKnownRoot(bytes32 _root) external view returns (bool);
        function isSpent(bytes32 _nullifierHash) external view returns (bool);

        function deposit(bytes32 _commitment) external payable;

        function withdraw(
            bytes calldata _proof,
            bytes32 _root,
            bytes32 _nullifierHash,
            address _recipient,
            address _relayer,
            uint256 _fee,
            uint256 _refund
        ) external payable;
    }
}

/// Ethereum RPC adapter for a single Tornado instance.
pub struct EthereumRpc {
    provider: DynProvider,
    instance: Address,
    signer_address: Option<Address>,
}

impl EthereumRpc {
    /// Create a new EthereumRpc instance.
    ///
    /// # Arguments
    /// * `rpc_url` - The HTTP RPC endpoint URL
    /// * `private_key` - Signing key; `None` gives a read-only adapter
    /// * `instance` - The Tornado instance contract address
    pub fn new(
        rpc_url: &str,
        private_key: Option<&str>,
        instance: Address,
    ) -> Result<Self, LedgerError> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| LedgerError::Rpc(format!("Invalid RPC URL: {}", e)))?;

        let (provider, signer_address) = match private_key {
            Some(key) => {
                let signer: PrivateKeySigner = key
                    .parse()
                    .map_err(|e| LedgerError::Signer(format!("Invalid private key: {}", e)))?;
                let address = signer.address();
                let wallet = EthereumWallet::from(signer);
                (
                    DynProvider::new(ProviderBuilder::new().wallet(wallet).connect_http(url)),
                    Some(address),
                )
            }
            None => (DynProvider::new(ProviderBuilder::new().connect_http(url)), None),
        };

        Ok(Self {
            provider,
            instance,
            signer_address,
        })
    }

    /// Get the signer's address, if any.
    pub fn signer_address(&self) -> Option<Address> {
        self.signer_address
    }

    pub fn instance_address(&self) -> Address {
        self.instance
    }

    /// Native-currency balance of `address`.
    pub async fn balance(&self, address: Address) -> Result<U256, LedgerError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| LedgerError::Rpc(format!("balance of {address}: {e}")))
    }

    /// Read the instance's denomination.
    pub async fn denomination(&self) -> Result<U256, LedgerError> {
        let tornado = ITornado::new(self.instance, &self.provider);
        tornado.denomination().call().await.map_err(contract_error)
    }

    fn require_signer(&self) -> Result<(), LedgerError> {
        self.signer_address.map(|_| ()).ok_or(LedgerError::ReadOnly)
    }

    /// Helper to convert alloy transaction receipt to our TxReceipt type.
    fn convert_receipt(receipt: &alloy::rpc::types::TransactionReceipt) -> TxReceipt {
        TxReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number.unwrap_or(0),
            gas_used: receipt.gas_used,
            success: receipt.status(),
        }
    }

    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<DepositEvent>, LedgerError> {
        let filter = Filter::new()
            .address(self.instance)
            .event_signature(ITornado::Deposit::SIGNATURE_HASH)
            .from_block(from)
            .to_block(to);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| LedgerError::Rpc(format!("Deposit query: {e}")))?;

        logs.iter()
            .map(|log| {
                let event = log
                    .log_decode::<ITornado::Deposit>()
                    .map_err(|e| LedgerError::InvalidResponse(format!("Deposit decode: {e}")))?;
                Ok(DepositEvent {
                    commitment: Commitment(event.inner.commitment),
                    leaf_index: event.inner.leafIndex,
                    timestamp: event.inner.timestamp.saturating_to(),
                    block_number: log.block_number.unwrap_or(from),
                })
            })
            .collect()
    }
}

/// Strip the node's and the decoder's prefixes, leaving the `require` message.
fn clean_revert_message(message: &str) -> &str {
    let message = message.trim();
    let message = message.strip_prefix("execution reverted").unwrap_or(message);
    let message = message.trim_start_matches(':').trim_start();
    message.strip_prefix("revert: ").unwrap_or(message)
}

/// Map a contract call error, recovering the revert reason when there is one.
fn contract_error(err: alloy::contract::Error) -> LedgerError {
    if let alloy::contract::Error::TransportError(transport) = &err {
        if let Some(payload) = transport.as_error_resp() {
            let decoded = payload
                .as_revert_data()
                .and_then(|data| decode_revert_reason(&data));
            let is_revert = decoded.is_some() || payload.message.contains("revert");
            if is_revert {
                let message = decoded.unwrap_or_else(|| payload.message.to_string());
                return LedgerError::Reverted(RevertReason::new(clean_revert_message(&message)));
            }
        }
    }
    LedgerError::Rpc(err.to_string())
}

impl Ledger for EthereumRpc {
    async fn get_deposit_events(
        &self,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<DepositEvent>, LedgerError> {
        let head = match to_block {
            Some(block) => block,
            None => self
                .provider
                .get_block_number()
                .await
                .map_err(|e| LedgerError::Rpc(format!("block number: {e}")))?,
        };

        let mut events = Vec::new();
        let mut from = from_block;
        while from <= head {
            let to = head.min(from + BATCH_SIZE - 1);
            let batch = self.fetch_range(from, to).await?;
            tracing::debug!(from, to, count = batch.len(), "fetched deposit events");
            events.extend(batch);
            from = to + 1;
        }

        Ok(events)
    }

    async fn is_known_root(&self, root: B256) -> Result<bool, LedgerError> {
        let tornado = ITornado::new(self.instance, &self.provider);
        tornado.isKnownRoot(root).call().await.map_err(contract_error)
    }

    async fn is_spent(&self, nullifier_hash: B256) -> Result<bool, LedgerError> {
        let tornado = ITornado::new(self.instance, &self.provider);
        tornado
            .isSpent(nullifier_hash)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn submit_deposit(
        &self,
        commitment: Commitment,
        value: U256,
    ) -> Result<TxReceipt, LedgerError> {
        self.require_signer()?;
        let tornado = ITornado::new(self.instance, &self.provider);

        let receipt = tornado
            .deposit(commitment.0)
            .value(value)
            .send()
            .await
            .map_err(contract_error)?
            .get_receipt()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        if !receipt.status() {
            return Err(LedgerError::Reverted(RevertReason::new("Deposit reverted")));
        }

        Ok(Self::convert_receipt(&receipt))
    }

    async fn submit_withdrawal(
        &self,
        args: &WithdrawCallArgs,
        value: U256,
    ) -> Result<TxReceipt, LedgerError> {
        self.require_signer()?;
        let tornado = ITornado::new(self.instance, &self.provider);

        let receipt = tornado
            .withdraw(
                args.proof.clone(),
                args.root,
                args.nullifier_hash,
                args.recipient,
                args.relayer,
                args.fee,
                args.refund,
            )
            .value(value)
            .send()
            .await
            .map_err(contract_error)?
            .get_receipt()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        if !receipt.status() {
            return Err(LedgerError::Reverted(RevertReason::new("Withdraw reverted")));
        }

        Ok(Self::convert_receipt(&receipt))
    }
}
