use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use base64::{Engine, engine::general_purpose::STANDARD};
use remailer_common::{Mail, lifecycle};
use sha2::{Digest, Sha256};

use crate::{DkimError, Result, SelectorConfig, canonicalization, selector::Selector};

const SIGNATURE_HEADER: &str = "DKIM-Signature";
const DEFAULT_CATCHALL_SEPARATOR: &str = "+";

/// Signs assembled mail with every selector whose domain matches the sender.
///
/// Selectors are loaded once on construction and never change afterwards.
#[derive(Debug)]
pub struct DkimSigner {
    selectors: Vec<Selector>,
    catchall_separator: String,
}

impl DkimSigner {
    /// Load every selector's key.
    ///
    /// # Errors
    /// Fails on the first selector whose key cannot be read or parsed, or
    /// whose hash is not sha256.
    pub fn new(selectors: Vec<SelectorConfig>) -> Result<Self> {
        let selectors = selectors
            .into_iter()
            .map(Selector::load)
            .collect::<Result<Vec<_>>>()?;

        lifecycle!(level = INFO, "Loaded {} DKIM selector(s)", selectors.len());

        Ok(Self {
            selectors,
            catchall_separator: DEFAULT_CATCHALL_SEPARATOR.to_string(),
        })
    }

    #[must_use]
    pub fn with_catchall_separator(mut self, separator: impl Into<String>) -> Self {
        self.catchall_separator = separator.into();
        self
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// Sign `mail` at the current time. Returns the number of signatures added.
    pub fn sign(&self, mail: &mut Mail) -> Result<usize> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        self.sign_at(mail, now)
    }

    /// Sign `mail` as though it were `timestamp` seconds since the epoch.
    ///
    /// Each `DKIM-Signature` field is prepended to `mail.headers` and appended
    /// to `mail.dkim_headers`. A sender without a matching selector is left
    /// untouched.
    pub fn sign_at(&self, mail: &mut Mail, timestamp: u64) -> Result<usize> {
        let Some(from) = mail.from.as_ref() else {
            return Err(DkimError::Signing("mail has no From address".to_string()));
        };
        let sender_domain = from.domain_ascii();
        let local_part = self.canonical_local_part(&from.local_part);

        let mut signed = 0;
        for selector in &self.selectors {
            if !selector
                .config
                .domain
                .eq_ignore_ascii_case(&sender_domain)
            {
                continue;
            }

            let field = signature_field(selector, mail, &local_part, timestamp)?;
            tracing::debug!(
                unit = %mail.id,
                selector = %selector.config.selector,
                domain = %selector.config.domain,
                "Signed mail"
            );

            let mut headers = field.clone().into_bytes();
            headers.extend_from_slice(&mail.headers);
            mail.headers = headers;
            mail.dkim_headers.extend_from_slice(field.as_bytes());
            signed += 1;
        }

        if signed == 0 {
            tracing::debug!(
                unit = %mail.id,
                domain = %sender_domain,
                "No DKIM selector for sender"
            );
        }

        Ok(signed)
    }

    /// Lowercase the local part and drop any catch-all suffix.
    fn canonical_local_part(&self, local_part: &str) -> String {
        let local_part = local_part.to_lowercase();
        match local_part.split_once(self.catchall_separator.as_str()) {
            Some((base, _)) if !self.catchall_separator.is_empty() => base.to_string(),
            _ => local_part,
        }
    }
}

/// Build the complete `DKIM-Signature` field, CRLF terminated.
fn signature_field(
    selector: &Selector,
    mail: &Mail,
    local_part: &str,
    timestamp: u64,
) -> Result<String> {
    let config = &selector.config;
    let header_canon = if config.header_relaxed { "relaxed" } else { "simple" };
    let body_canon = if config.body_relaxed { "relaxed" } else { "simple" };

    let body_hash = STANDARD.encode(Sha256::digest(canonicalization::body(
        &mail.body,
        config.body_relaxed,
    )));

    let (mut hashed, mut names) = select_headers(mail, &config.headers, config.header_relaxed);
    if config.seal_headers {
        let mut sealed = Vec::new();
        for name in &names {
            if !sealed.contains(name) {
                sealed.push(name.clone());
            }
        }
        names.extend(sealed);
    }

    let mut value = format!(
        "v=1; a={}; c={header_canon}/{body_canon}; d={}; s={}; t={timestamp}; ",
        selector.key.algorithm().signing_name(),
        config.domain,
        config.selector,
    );
    if let Some(expiration) = config.expiration {
        value.push_str(&format!("x={}; ", timestamp + expiration.as_secs()));
    }
    value.push_str(&format!(
        "i={local_part}@{}; h={}; bh={body_hash}; b=",
        config.domain,
        names.join(":"),
    ));

    let mut unsigned = canonicalization::header(
        SIGNATURE_HEADER,
        value.as_bytes(),
        config.header_relaxed,
    );
    unsigned.truncate(unsigned.len() - 2);
    hashed.extend_from_slice(&unsigned);

    let signature = STANDARD.encode(selector.key.sign(&hashed)?);
    Ok(format!("{SIGNATURE_HEADER}: {value}{signature}\r\n"))
}

/// Canonicalize the configured headers present in `mail`, taking repeated
/// names from the last instance upwards. Returns the hash input and the
/// names that were included.
fn select_headers(mail: &Mail, wanted: &[String], relaxed: bool) -> (Vec<u8>, Vec<String>) {
    let mut hashed = Vec::new();
    let mut names = Vec::new();
    let mut consumed: HashMap<String, usize> = HashMap::new();

    for name in wanted {
        let lower = name.trim().to_ascii_lowercase();
        let instances: Vec<(&str, &[u8])> = mail
            .headers_map
            .iter()
            .filter(|(candidate, _)| candidate.eq_ignore_ascii_case(&lower))
            .collect();

        let used = consumed.entry(lower.clone()).or_default();
        let Some(&(original, value)) = instances
            .len()
            .checked_sub(*used + 1)
            .and_then(|index| instances.get(index))
        else {
            continue;
        };
        *used += 1;

        hashed.extend(canonicalization::header(original, value, relaxed));
        names.push(lower);
    }

    (hashed, names)
}
