//! # cryptr-crypto
//!
//! Kryptografische Bausteine des Relays.
//!
//! ## Module
//! - `seed` - Prozessweiter, oeffentlicher Zufalls-Seed (SeedAuthority)
//! - `derivation` - Deterministische Ableitung `(seed, id, zeit) -> Secret`
//! - `aead` - AES-GCM Verschluesselung mit `nonce || ciphertext`
//! - `types` - `ClientSecret`
//! - `error` - Fehlertypen
//!
//! Die Ableitung ist bewusst schwach (nur Minute/Sekunde als Zeitanteil) und
//! existiert aus Kompatibilitaetsgruenden. Sie ist kein Ersatz fuer ein
//! echtes Key-Agreement-Protokoll.

pub mod aead;
pub mod derivation;
pub mod error;
pub mod seed;
pub mod types;

// Bequeme Re-Exports
pub use aead::{decrypt, encrypt, NONCE_LAENGE};
pub use derivation::{derive_secret, SECRET_LAENGE};
pub use error::{CryptoError, CryptoResult};
pub use seed::{generate_seed, Seed, MIN_SEED_LAENGE, STANDARD_SEED_LAENGE};
pub use types::ClientSecret;
