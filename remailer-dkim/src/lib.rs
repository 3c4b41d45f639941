//! DKIM for outbound mail.
//!
//! Covers the whole key lifecycle: generating RSA or Ed25519 key pairs,
//! persisting them as PEM, publishing the public half as a DNS TXT record,
//! and signing assembled messages with one or more configured selectors.

pub mod canonicalization;
pub mod error;
pub mod keygen;
pub mod selector;
pub mod signer;
pub mod txt;
pub mod writer;

pub use error::{DkimError, Result};
pub use keygen::{Algorithm, KeyPair, generate};
pub use selector::{SelectorConfig, SigningKey, default_headers};
pub use signer::DkimSigner;
pub use txt::txt_record;
pub use writer::write_key_pair;
