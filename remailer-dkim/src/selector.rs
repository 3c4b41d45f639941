use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use ed25519_dalek::{KEYPAIR_LENGTH, SECRET_KEY_LENGTH, Signer as _, SigningKey as Ed25519Key};
use rsa::{
    RsaPrivateKey,
    pkcs1::DecodeRsaPrivateKey,
    pkcs1v15,
    pkcs8::DecodePrivateKey,
    signature::{SignatureEncoding, Signer as _},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    Algorithm, DkimError, Result,
    keygen::ED25519_PRIVATE_TAG,
};

const DEFAULT_HASH: &str = "sha256";

fn default_hash() -> String {
    DEFAULT_HASH.to_string()
}

/// Header fields signed when a selector names none.
pub fn default_headers() -> Vec<String> {
    ["from", "to", "subject", "date", "message-id", "content-type"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// One signing identity, as configured under the `dkim` processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SelectorConfig {
    pub selector: String,
    pub domain: String,
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default = "default_hash")]
    pub hash: String,
    #[serde(default)]
    pub header_relaxed: bool,
    #[serde(default)]
    pub body_relaxed: bool,
    #[serde(default = "default_headers")]
    pub headers: Vec<String>,
    #[serde(default, with = "humantime_serde")]
    pub expiration: Option<Duration>,
    pub private_key_file: PathBuf,
    #[serde(default)]
    pub seal_headers: bool,
}

/// A loaded private key.
pub enum SigningKey {
    Rsa(Box<pkcs1v15::SigningKey<Sha256>>),
    Ed25519(Box<Ed25519Key>),
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsa(_) => f.write_str("SigningKey::Rsa(..)"),
            Self::Ed25519(_) => f.write_str("SigningKey::Ed25519(..)"),
        }
    }
}

impl SigningKey {
    /// Parse a PEM encoded private key for `algorithm`.
    ///
    /// RSA keys may be PKCS#1 or PKCS#8. Ed25519 keys may hold the 64 byte
    /// keypair or only the 32 byte seed.
    pub fn from_pem(algorithm: Algorithm, pem: &str) -> Result<Self> {
        match algorithm {
            Algorithm::Rsa => {
                let key = match RsaPrivateKey::from_pkcs1_pem(pem) {
                    Ok(key) => key,
                    Err(pkcs1_err) => {
                        RsaPrivateKey::from_pkcs8_pem(pem).map_err(|_| pkcs1_err)?
                    }
                };
                Ok(Self::Rsa(Box::new(pkcs1v15::SigningKey::<Sha256>::new(key))))
            }
            Algorithm::Ed25519 => {
                let block = pem::parse(pem)?;
                if block.tag() != ED25519_PRIVATE_TAG {
                    return Err(DkimError::PemTag {
                        expected: ED25519_PRIVATE_TAG,
                        found: block.tag().to_string(),
                    });
                }

                let contents = block.contents();
                let key = match contents.len() {
                    KEYPAIR_LENGTH => {
                        let mut bytes = [0_u8; KEYPAIR_LENGTH];
                        bytes.copy_from_slice(contents);
                        Ed25519Key::from_keypair_bytes(&bytes)
                            .map_err(|_| DkimError::Ed25519Length(contents.len()))?
                    }
                    SECRET_KEY_LENGTH => {
                        let mut seed = [0_u8; SECRET_KEY_LENGTH];
                        seed.copy_from_slice(contents);
                        Ed25519Key::from_bytes(&seed)
                    }
                    other => return Err(DkimError::Ed25519Length(other)),
                };
                Ok(Self::Ed25519(Box::new(key)))
            }
        }
    }

    pub const fn algorithm(&self) -> Algorithm {
        match self {
            Self::Rsa(_) => Algorithm::Rsa,
            Self::Ed25519(_) => Algorithm::Ed25519,
        }
    }

    /// Sign `data`. Ed25519 signs its SHA-256 digest (RFC 8463).
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Rsa(key) => key
                .try_sign(data)
                .map(|signature| signature.to_vec())
                .map_err(|err| DkimError::Signing(err.to_string())),
            Self::Ed25519(key) => Ok(key.sign(&Sha256::digest(data)).to_bytes().to_vec()),
        }
    }
}

/// A selector with its key loaded.
#[derive(Debug)]
pub struct Selector {
    pub config: SelectorConfig,
    pub key: SigningKey,
}

impl Selector {
    pub fn load(config: SelectorConfig) -> Result<Self> {
        if !config.hash.eq_ignore_ascii_case(DEFAULT_HASH) {
            return Err(DkimError::UnsupportedHash(config.hash));
        }
        if !config
            .headers
            .iter()
            .any(|name| name.trim().eq_ignore_ascii_case("from"))
        {
            return Err(DkimError::MissingFrom(config.selector));
        }

        let path = resolve_key_path(&config.private_key_file);
        let pem = std::fs::read_to_string(&path).map_err(|source| DkimError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;

        let key = SigningKey::from_pem(config.algorithm, &pem)?;

        tracing::debug!(
            selector = %config.selector,
            domain = %config.domain,
            algorithm = %config.algorithm,
            "Loaded DKIM selector"
        );

        Ok(Self { config, key })
    }
}

/// Expand a leading `~/` against `HOME`. `./` and other relative paths are
/// resolved against the working directory when opened.
pub fn resolve_key_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(rest);
    }

    path.to_path_buf()
}
