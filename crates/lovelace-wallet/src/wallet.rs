//! Wallet composition: account keys, ledger queries and the payment flow.
//!
//! The [`Wallet`] ties one CIP-1852 account to a [`LedgerQuery`]. Whether
//! that query service is a live HTTP backend or an offline snapshot is
//! decided by whoever constructs the wallet; the payment flow is the same.

use std::sync::Arc;
use tracing::{debug, info};

use lovelace_core::address::{Address, Network};
use lovelace_core::error::TransactionError;
use lovelace_core::traits::LedgerQuery;
use lovelace_core::types::{Transaction, TxOut};

use crate::builder::{FeeReport, TransactionBuilder};
use crate::coin_selection::{CoinSelection, CoinSelector};
use crate::error::WalletError;
use crate::keys::{AccountKey, ExtendedPrivateKey};
use crate::mnemonic::root_key_from_mnemonic;

/// Slots added to the current tip to form the TTL.
pub const DEFAULT_TTL_OFFSET: u64 = 300;

/// A single payment to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    /// Recipient address.
    pub to: Address,
    /// Amount in lovelace.
    pub amount: u64,
    /// Optional transaction message.
    pub message: Option<String>,
    /// Slots between the current tip and the TTL.
    pub ttl_offset: u64,
    /// Spend from the base address (payment + stake) instead of the
    /// enterprise address.
    pub use_base_address: bool,
}

impl PaymentRequest {
    pub fn new(to: Address, amount: u64) -> Self {
        Self {
            to,
            amount,
            message: None,
            ttl_offset: DEFAULT_TTL_OFFSET,
            use_base_address: false,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_ttl_offset(mut self, slots: u64) -> Self {
        self.ttl_offset = slots;
        self
    }

    pub fn from_base_address(mut self) -> Self {
        self.use_base_address = true;
        self
    }
}

/// Outcome of [`Wallet::pay`].
#[derive(Debug, Clone)]
pub struct Payment {
    pub transaction: Transaction,
    pub sender: Address,
    pub selection: CoinSelection,
    pub fee_report: FeeReport,
}

/// HD wallet account bound to a ledger query service.
pub struct Wallet {
    account: AccountKey,
    network: Network,
    address_index: u32,
    ledger: Arc<dyn LedgerQuery>,
}

impl Wallet {
    pub fn new(account: AccountKey, network: Network, ledger: Arc<dyn LedgerQuery>) -> Self {
        Self { account, network, address_index: 0, ledger }
    }

    /// Derive account `account` from a root key.
    pub fn from_root(
        root: &ExtendedPrivateKey,
        account: u32,
        network: Network,
        ledger: Arc<dyn LedgerQuery>,
    ) -> Result<Self, WalletError> {
        Ok(Self::new(AccountKey::from_root(root, account)?, network, ledger))
    }

    /// Derive account `account` from a BIP-39 phrase.
    pub fn from_mnemonic(
        phrase: &str,
        passphrase: &str,
        account: u32,
        network: Network,
        ledger: Arc<dyn LedgerQuery>,
    ) -> Result<Self, WalletError> {
        let root = root_key_from_mnemonic(phrase, passphrase)?;
        Self::from_root(&root, account, network, ledger)
    }

    /// Use payment key `index` instead of 0.
    pub fn with_address_index(mut self, index: u32) -> Self {
        self.address_index = index;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn account(&self) -> &AccountKey {
        &self.account
    }

    pub fn address_index(&self) -> u32 {
        self.address_index
    }

    /// Address funds are spent from and change returns to.
    pub fn sender_address(&self, base: bool) -> Result<Address, WalletError> {
        if base {
            self.account.base_address(self.network, self.address_index)
        } else {
            self.account.enterprise_address(self.network, self.address_index)
        }
    }

    /// Total lovelace held at the sender address.
    pub async fn balance(&self, base: bool) -> Result<u64, WalletError> {
        let address = self.sender_address(base)?;
        let utxos = self.ledger.utxos(&address).await?;
        utxos
            .iter()
            .try_fold(0u64, |acc, u| acc.checked_add(u.amount))
            .ok_or(WalletError::Transaction(TransactionError::ValueOverflow))
    }

    /// Build and sign a payment.
    ///
    /// Queries parameters, tip and UTXOs, spends the first UTXO that covers
    /// the amount plus the sender's change floor and a fee estimate, returns change to
    /// the sender and signs with the payment key. Nothing is submitted.
    pub async fn pay(&self, request: &PaymentRequest) -> Result<Payment, WalletError> {
        let sender = self.sender_address(request.use_base_address)?;
        let payment_key = self.account.payment_key(self.address_index)?;

        let params = Arc::new(self.ledger.protocol_parameters().await?);
        let tip = self.ledger.tip().await?;
        let utxos = self.ledger.utxos(&sender).await?;
        debug!(%sender, utxos = utxos.len(), tip = tip.slot, "ledger state fetched");

        let target = CoinSelector::target_for(request.amount, &sender, &params)?;
        let selection = CoinSelector::first_covering(&utxos, target)?;
        let ttl = tip
            .slot
            .checked_add(request.ttl_offset)
            .ok_or(WalletError::Transaction(TransactionError::ValueOverflow))?;

        let mut builder = TransactionBuilder::new(params);
        builder.with_tip(tip.slot);
        builder
            .add_input(selection.selected.clone())?
            .add_output(TxOut::new(request.to, request.amount))?
            .set_ttl(ttl)?;
        if let Some(message) = &request.message {
            builder.set_message(message)?;
        }
        builder.add_change_if_needed(&sender)?;
        builder.sign(&[&payment_key])?;
        let transaction = builder.build()?;

        let fee_report = builder
            .fee_report()
            .cloned()
            .ok_or_else(|| WalletError::InvalidState("balanced without a fee report".into()))?;
        info!(
            tx_hash = %transaction.id()?,
            to = %request.to,
            amount = request.amount,
            fee = fee_report.fee,
            ttl,
            "payment built"
        );
        Ok(Payment { transaction, sender, selection, fee_report })
    }
}
