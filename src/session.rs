//! Wallet session manager
//!
//! A [`WalletSession`] is an explicit, caller-owned handle: construct one at
//! startup and pass it around, there is no global instance. At most one set
//! of unlocked key material lives in memory per session, guarded by a single
//! mutex that is held across every mutating operation including its network
//! awaits. Two concurrent `send_transaction` calls therefore execute one
//! after the other and cannot race on the nonce.

use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cipher;
use crate::config::{Config, NetworkConfig};
use crate::error::{Error, Result};
use crate::keys::{self, KeyMaterial};
use crate::provider::{JsonRpcProvider, LedgerRpc};
use crate::store::{EncryptedWalletRecord, FileStore, WalletStore};
use crate::tx::{self, TransactionIntent, TransactionRequest};
use crate::units;

/// Result of creating a wallet. The recovery phrase appears here and
/// nowhere else; show it to the user once and drop it.
#[derive(Debug)]
pub struct NewWallet {
    pub record: EncryptedWalletRecord,
    pub recovery_phrase: String,
}

/// A confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransaction {
    pub hash: String,
    pub block_number: Option<u64>,
}

/// The wallet session: orchestrates key management, the cipher envelope,
/// persistence, and the network provider.
pub struct WalletSession<P, S> {
    provider: P,
    store: S,
    network: &'static NetworkConfig,
    confirmation_timeout: Duration,
    key: Mutex<Option<KeyMaterial>>,
}

impl WalletSession<JsonRpcProvider, FileStore> {
    /// Connect a session using the configured endpoints and file store
    pub async fn connect(config: &Config) -> Result<Self> {
        let (primary, fallback) = config.resolve_endpoints()?;
        let provider = JsonRpcProvider::connect(
            &primary,
            fallback.as_deref(),
            config.request_timeout(),
            config.poll_interval(),
        )
        .await?;
        if provider.chain_id() != config.chain_id {
            warn!(
                configured = config.chain_id,
                reported = provider.chain_id(),
                "connected node reports a different chain id"
            );
        }
        Self::new(provider, FileStore::new(&config.store.path), config)
    }
}

impl<P: LedgerRpc, S: WalletStore> WalletSession<P, S> {
    /// Build a session from explicit parts (used directly by tests and
    /// embedders with custom providers or stores)
    pub fn new(provider: P, store: S, config: &Config) -> Result<Self> {
        let network = config.network()?;
        Ok(Self {
            provider,
            store,
            network,
            confirmation_timeout: config.confirmation_timeout(),
            key: Mutex::new(None),
        })
    }

    /// Generate a new wallet: fresh key pair, private key encrypted under
    /// `password`, record persisted (replacing any existing one), key held
    /// in memory. Returns the record and the recovery phrase.
    pub async fn create_wallet(&self, password: &str) -> Result<NewWallet> {
        let mut slot = self.key.lock().await;
        let (material, recovery_phrase) = KeyMaterial::generate()?;
        let record = self.persist(&material, password).await?;
        info!(
            address = %keys::format_address(material.address()),
            "created new wallet"
        );
        *slot = Some(material);
        Ok(NewWallet {
            record,
            recovery_phrase,
        })
    }

    /// Import a wallet from a recovery phrase or a raw private key and
    /// persist it encrypted under `password`
    pub async fn import_wallet(&self, secret: &str, password: &str) -> Result<EncryptedWalletRecord> {
        let mut slot = self.key.lock().await;
        let material = if looks_like_private_key(secret) {
            KeyMaterial::from_private_key(secret)?
        } else {
            KeyMaterial::from_phrase(secret)?
        };
        let record = self.persist(&material, password).await?;
        info!(
            address = %keys::format_address(material.address()),
            "imported wallet"
        );
        *slot = Some(material);
        Ok(record)
    }

    async fn persist(
        &self,
        material: &KeyMaterial,
        password: &str,
    ) -> Result<EncryptedWalletRecord> {
        let envelope = cipher::seal(&material.private_key_hex(), password)?;
        let record = EncryptedWalletRecord {
            address: material.address().to_string(),
            encrypted_private_key: envelope,
        };
        self.store.save(&record).await?;
        Ok(record)
    }

    /// Unlock the persisted wallet with `password`, returning its address.
    ///
    /// Fails with [`Error::NoWallet`] when nothing is persisted and
    /// [`Error::UnlockFailed`] on a wrong password or corrupted record; the
    /// two credential cases are indistinguishable on purpose.
    pub async fn unlock_wallet(&self, password: &str) -> Result<String> {
        let mut slot = self.key.lock().await;
        let record = self.store.load().await?.ok_or(Error::NoWallet)?;
        let plaintext = cipher::open(&record.encrypted_private_key, password)
            .map_err(|_| Error::UnlockFailed)?;
        // A decrypted-but-unparseable key means the record is corrupt;
        // report it exactly like a wrong password
        let material =
            KeyMaterial::from_private_key(&plaintext).map_err(|_| Error::UnlockFailed)?;
        if material.address() != record.address {
            warn!("stored address does not match decrypted key; trusting the key");
        }
        let address = material.address().to_string();
        info!(address = %keys::format_address(&address), "wallet unlocked");
        *slot = Some(material);
        Ok(address)
    }

    /// Discard in-memory key material. Idempotent: locking a locked wallet
    /// is a no-op.
    pub async fn lock_wallet(&self) {
        let mut slot = self.key.lock().await;
        if slot.take().is_some() {
            info!("wallet locked");
        }
    }

    /// Lock the session and delete the persisted record.
    ///
    /// Destructive and irreversible: without the recovery phrase or a key
    /// backup the funds are gone. Callers must confirm with the user first.
    pub async fn disconnect_wallet(&self) -> Result<()> {
        let mut slot = self.key.lock().await;
        slot.take();
        self.store.delete().await?;
        info!("wallet disconnected and record deleted");
        Ok(())
    }

    /// Whether key material is currently held in memory
    pub async fn is_unlocked(&self) -> bool {
        self.key.lock().await.is_some()
    }

    /// The unlocked wallet's address, if any
    pub async fn address(&self) -> Option<String> {
        self.key
            .lock()
            .await
            .as_ref()
            .map(|k| k.address().to_string())
    }

    /// Current balance of the unlocked wallet, formatted in whole currency
    /// units
    pub async fn balance(&self) -> Result<String> {
        let slot = self.key.lock().await;
        let material = slot.as_ref().ok_or(Error::WalletLocked)?;
        let wei = self.provider.get_balance(material.address()).await?;
        Ok(units::format_units(wei, self.network.decimals))
    }

    /// Send `amount` (decimal string, whole currency units) to `to`.
    ///
    /// Validates the recipient and amount, checks the balance, fills nonce
    /// and gas price from the provider, signs, broadcasts, and waits for
    /// inclusion. Failures before broadcast come back as
    /// [`Error::TransactionFailed`] and are safe to retry; failures after
    /// broadcast come back as [`Error::ConfirmationTimeout`] /
    /// [`Error::ConfirmationUncertain`] and warrant a block-explorer check
    /// first. The persisted record is never touched.
    pub async fn send_transaction(&self, to: &str, amount: &str) -> Result<SentTransaction> {
        // Held for the whole operation: no second send can interleave
        let slot = self.key.lock().await;
        let material = slot.as_ref().ok_or(Error::WalletLocked)?;

        let to_bytes = keys::parse_address(to)?;
        let value = units::parse_units(amount, self.network.decimals)?;
        if value == 0 {
            return Err(Error::InvalidAmount("amount must be greater than zero".into()));
        }

        let balance = self
            .provider
            .get_balance(material.address())
            .await
            .map_err(pre_broadcast)?;
        if balance < value {
            return Err(Error::InsufficientBalance {
                available: units::format_units(balance, self.network.decimals),
                required: units::format_units(value, self.network.decimals),
            });
        }

        let nonce = self
            .provider
            .transaction_count(material.address())
            .await
            .map_err(pre_broadcast)?;
        let gas_price = self.provider.gas_price().await.map_err(pre_broadcast)?;

        let request = TransactionRequest {
            to: to_bytes,
            value,
            nonce,
            gas_price,
            gas_limit: self.network.gas_limits.transfer,
            data: Vec::new(),
            chain_id: self.provider.chain_id(),
        };
        let raw = tx::sign(material, &request)?;

        let hash = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(pre_broadcast)?;
        info!(
            %hash,
            to = %keys::format_address(to),
            amount,
            "transaction broadcast, awaiting confirmation"
        );

        // From here on the transaction may already be on chain; failures
        // must not look retryable
        let receipt = match self
            .provider
            .wait_for_confirmation(&hash, self.confirmation_timeout)
            .await
        {
            Ok(receipt) => receipt,
            Err(e @ Error::ConfirmationTimeout { .. }) => return Err(e),
            Err(e) => {
                return Err(Error::ConfirmationUncertain {
                    hash,
                    reason: e.to_string(),
                })
            }
        };
        if !receipt.succeeded() {
            return Err(Error::TransactionReverted { hash });
        }

        let block_number = receipt.block_number_u64();
        info!(%hash, block = ?block_number, "transaction confirmed");
        Ok(SentTransaction { hash, block_number })
    }

    /// [`send_transaction`](Self::send_transaction) with the recipient and
    /// amount bundled as an intent
    pub async fn send(&self, intent: &TransactionIntent) -> Result<SentTransaction> {
        self.send_transaction(&intent.to, &intent.amount).await
    }

    /// Sign an arbitrary message with the unlocked key (EIP-191)
    pub async fn sign_message(&self, message: &str) -> Result<String> {
        let slot = self.key.lock().await;
        let material = slot.as_ref().ok_or(Error::WalletLocked)?;
        material.sign_message(message)
    }

    /// Sign a fully resolved transaction without broadcasting it, returning
    /// the raw bytes as hex
    pub async fn sign_transaction(&self, request: &TransactionRequest) -> Result<String> {
        let slot = self.key.lock().await;
        let material = slot.as_ref().ok_or(Error::WalletLocked)?;
        let raw = tx::sign(material, request)?;
        Ok(format!("0x{}", hex::encode(raw)))
    }
}

/// Nothing left the wallet yet; the caller can retry safely
fn pre_broadcast(err: Error) -> Error {
    Error::TransactionFailed(err.to_string())
}

/// A 64-digit hex string (with or without `0x`) is a raw private key;
/// everything else is treated as a recovery phrase
fn looks_like_private_key(secret: &str) -> bool {
    let s = secret.trim();
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    stripped.len() == 64 && stripped.chars().all(|c| c.is_ascii_hexdigit())
}
