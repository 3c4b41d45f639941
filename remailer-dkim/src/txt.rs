use base64::{Engine, engine::general_purpose::STANDARD};
use rsa::{RsaPublicKey, pkcs1::DecodeRsaPublicKey};

use crate::{Algorithm, DkimError, Result};

/// Render the DNS TXT record publishing `public_pem` under
/// `<selector>._domainkey.<domain>`.
///
/// The key material is checked before it is published: RSA keys must be
/// PKCS#1 and Ed25519 keys exactly 32 bytes.
pub fn txt_record(
    domain: &str,
    selector: &str,
    algorithm: Algorithm,
    public_pem: &str,
) -> Result<String> {
    let block = pem::parse(public_pem)?;
    let der = block.contents();

    match algorithm {
        Algorithm::Rsa => {
            RsaPublicKey::from_pkcs1_der(der)?;
        }
        Algorithm::Ed25519 => {
            if der.len() != ed25519_dalek::PUBLIC_KEY_LENGTH {
                return Err(DkimError::Ed25519Length(der.len()));
            }
        }
    }

    Ok(format!(
        "{selector}._domainkey.{domain} IN TXT \"v=DKIM1; k={algorithm}; p={}\"",
        STANDARD.encode(der)
    ))
}
