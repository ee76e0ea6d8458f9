//! RadhaSphere Wallet Core
//!
//! Self-custodial key management and transaction signing: key-pair
//! generation and import, password-based envelope encryption of the private
//! key, an encrypted on-disk wallet record, and a JSON-RPC provider adapter
//! with a single-fallback connect policy, orchestrated by a mutex-guarded
//! [`session::WalletSession`].
//!
//! # WARNING
//! - This library handles real private keys. A lost password plus a lost
//!   recovery phrase means lost funds.
//! - `disconnect_wallet` deletes the encrypted record irreversibly; confirm
//!   with the user before calling it.
//! - Key material lives in memory while a session is unlocked. Lock the
//!   session when idle.

pub mod cipher;
pub mod config;
pub mod error;
pub mod keys;
pub mod provider;
pub mod session;
pub mod store;
pub mod tx;
pub mod units;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use keys::KeyMaterial;
pub use provider::{JsonRpcProvider, LedgerRpc, TransactionReceipt};
pub use session::{NewWallet, SentTransaction, WalletSession};
pub use store::{EncryptedWalletRecord, FileStore, MemoryStore, WalletStore};
pub use tx::{TransactionIntent, TransactionRequest};
