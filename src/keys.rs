//! Key-pair provider: generation, import, and address derivation
//!
//! A wallet key is a secp256k1 signing key plus its derived EIP-55
//! checksummed address. Generation follows the BIP-39/BIP-44 convention
//! (12-word English phrase, path `m/44'/60'/0'/0/0`) so a phrase written
//! down here restores the same account in any standard wallet.

use std::fmt;

use bip32::{DerivationPath, XPrv};
use bip39::{Language, Mnemonic};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// BIP-44 derivation path for the first external account
pub const DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// An in-memory asymmetric key pair plus its derived public address.
///
/// Exists only while a wallet is unlocked. The signing key's scalar is wiped
/// on drop; the struct is never serializable and `Debug` shows only the
/// address.
pub struct KeyMaterial {
    signing_key: SigningKey,
    address: String,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("address", &self.address)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

impl KeyMaterial {
    /// Generate a fresh random key pair and its recovery phrase.
    ///
    /// 16 bytes of OS entropy become a 12-word phrase; the key is derived
    /// from the phrase, not the raw entropy, so the returned phrase always
    /// restores exactly this account.
    pub fn generate() -> Result<(Self, String)> {
        let mut entropy = Zeroizing::new([0u8; 16]);
        OsRng
            .try_fill_bytes(entropy.as_mut_slice())
            .map_err(|e| Error::EntropyUnavailable(e.to_string()))?;
        let mnemonic = Mnemonic::from_entropy(entropy.as_slice())
            .map_err(|e| Error::EntropyUnavailable(e.to_string()))?;
        let material = Self::from_mnemonic(&mnemonic)?;
        Ok((material, mnemonic.to_string()))
    }

    /// Deterministically derive the key pair from a recovery phrase
    pub fn from_phrase(phrase: &str) -> Result<Self> {
        let mnemonic = Mnemonic::parse_in(Language::English, phrase.trim())
            .map_err(|e| Error::InvalidRecoveryPhrase(e.to_string()))?;
        Self::from_mnemonic(&mnemonic)
    }

    fn from_mnemonic(mnemonic: &Mnemonic) -> Result<Self> {
        let seed = Zeroizing::new(mnemonic.to_seed(""));
        let path: DerivationPath = DERIVATION_PATH
            .parse()
            .map_err(|e| Error::Internal(format!("bad derivation path constant: {e}")))?;
        let xprv = XPrv::derive_from_path(&seed[..], &path)
            .map_err(|e| Error::InvalidRecoveryPhrase(e.to_string()))?;
        let signing_key = SigningKey::from_bytes(&xprv.private_key().to_bytes())
            .map_err(|e| Error::InvalidRecoveryPhrase(e.to_string()))?;
        Ok(Self::from_signing_key(signing_key))
    }

    /// Import a key pair from a raw hex private key (`0x`-prefixed or bare)
    pub fn from_private_key(hex_key: &str) -> Result<Self> {
        let trimmed = hex_key.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if stripped.len() != 64 {
            return Err(Error::InvalidPrivateKey(
                "expected 32 hex-encoded bytes".into(),
            ));
        }
        let bytes = Zeroizing::new(
            hex::decode(stripped)
                .map_err(|_| Error::InvalidPrivateKey("not valid hex".into()))?,
        );
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|_| Error::InvalidPrivateKey("value outside the curve order".into()))?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = derive_address(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// The EIP-55 checksummed public address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The raw private key as `0x`-prefixed hex, for envelope encryption
    pub fn private_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("0x{}", hex::encode(self.signing_key.to_bytes())))
    }

    /// Sign an arbitrary message under the EIP-191 personal-message prefix.
    /// Returns the 65-byte `r || s || v` signature as hex, `v` in {27, 28}.
    pub fn sign_message(&self, message: &str) -> Result<String> {
        let digest = hash_message(message.as_bytes());
        let (signature, recovery_id) = self.sign_prehash(&digest)?;
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(signature.to_bytes().as_slice());
        out[64] = 27 + recovery_id.to_byte();
        Ok(format!("0x{}", hex::encode(out)))
    }

    /// Produce a low-S recoverable signature over a 32-byte digest
    pub(crate) fn sign_prehash(&self, digest: &[u8; 32]) -> Result<(Signature, RecoveryId)> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|e| Error::Internal(format!("signing failed: {e}")))?;
        // Ethereum only accepts low-S; normalizing flips the recovered point's parity
        match signature.normalize_s() {
            Some(normalized) => Ok((
                normalized,
                RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()),
            )),
            None => Ok((signature, recovery_id)),
        }
    }
}

/// Derive the EIP-55 checksummed address from a public key: Keccak-256 of
/// the uncompressed point (tag byte dropped), last 20 bytes.
pub fn derive_address(verifying_key: &VerifyingKey) -> String {
    let point = verifying_key.to_encoded_point(false);
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    to_checksum_address(&digest[12..])
}

/// Apply EIP-55 mixed-case checksum encoding to 20 address bytes
pub fn to_checksum_address(bytes: &[u8]) -> String {
    let lower = hex::encode(bytes);
    let digest = Keccak256::digest(lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (digest[i / 2] >> (4 * (1 - i % 2))) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse and validate an address string into its 20 raw bytes.
///
/// Requires the `0x` prefix and 40 hex digits. Mixed-case input must carry a
/// valid EIP-55 checksum; uniformly-cased input is accepted as unchecked.
pub fn parse_address(address: &str) -> Result<[u8; 20]> {
    let s = address.trim();
    let stripped = s
        .strip_prefix("0x")
        .ok_or_else(|| Error::InvalidAddress(format!("missing 0x prefix: '{s}'")))?;
    if stripped.len() != 40 || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidAddress(format!(
            "expected 40 hex digits: '{s}'"
        )));
    }
    let mut bytes = [0u8; 20];
    hex::decode_to_slice(stripped, &mut bytes)
        .map_err(|_| Error::InvalidAddress(format!("not valid hex: '{s}'")))?;

    let has_upper = stripped.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = stripped.chars().any(|c| c.is_ascii_lowercase());
    if has_upper && has_lower && to_checksum_address(&bytes) != format!("0x{stripped}") {
        return Err(Error::InvalidAddress(format!("checksum mismatch: '{s}'")));
    }
    Ok(bytes)
}

/// Shorten an address for display: `0x1234…` + last four characters.
/// Presentation code calls this instead of re-slicing the string itself.
pub fn format_address(address: &str) -> String {
    if !address.is_ascii() || address.len() < 10 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

/// EIP-191 personal-message digest:
/// `keccak256("\x19Ethereum Signed Message:\n" + len(message) + message)`
pub fn hash_message(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n");
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}
