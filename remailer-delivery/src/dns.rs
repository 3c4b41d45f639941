//! MX resolution with a process-lifetime cache.
//!
//! Answers are cached in a `DashMap` keyed by the ASCII form of the domain and
//! never expire; a long running server picks up DNS changes on restart.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use hickory_resolver::{
    TokioResolver, name_server::TokioConnectionProvider, proto::rr::RecordType,
};
use remailer_common::ErrorKind;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("No mail servers found for domain: {0}")]
    NoMailServers(String),

    #[error("DNS lookup failed for {domain}: {source}")]
    LookupFailed {
        domain: String,
        source: hickory_resolver::ResolveError,
    },

    #[error("Invalid domain {domain}: {reason}")]
    InvalidDomain { domain: String, reason: String },
}

impl DnsError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NoMailServers(_) | Self::LookupFailed { .. } => ErrorKind::DnsLookup,
            Self::InvalidDomain { .. } => ErrorKind::MxRecord,
        }
    }
}

/// The raw answer to one MX query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MxAnswer {
    /// Owner name of the MX records, after any CNAME.
    pub owner: Option<String>,
    /// `(preference, exchange)` in answer order.
    pub records: Vec<(u16, String)>,
}

/// A single MX query round-trip.
#[async_trait]
pub trait MxLookup: Send + Sync + Debug {
    /// Query MX records for `domain`. A name without MX records answers with
    /// an empty record list rather than an error.
    async fn lookup_mx(&self, domain: &str) -> Result<MxAnswer, DnsError>;
}

/// `MxLookup` backed by the system resolver configuration.
#[derive(Debug)]
pub struct HickoryLookup {
    resolver: TokioResolver,
}

impl HickoryLookup {
    /// # Errors
    ///
    /// Returns an error if the system DNS configuration cannot be loaded.
    pub fn new() -> Result<Self, hickory_resolver::ResolveError> {
        let resolver = TokioResolver::builder(TokioConnectionProvider::default())?.build();
        Ok(Self { resolver })
    }
}

#[async_trait]
impl MxLookup for HickoryLookup {
    async fn lookup_mx(&self, domain: &str) -> Result<MxAnswer, DnsError> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => {
                let owner = lookup
                    .as_lookup()
                    .records()
                    .iter()
                    .find(|record| record.record_type() == RecordType::MX)
                    .map(|record| record.name().to_utf8());

                let records = lookup
                    .iter()
                    .map(|mx| (mx.preference(), mx.exchange().to_utf8()))
                    .collect();

                Ok(MxAnswer { owner, records })
            }
            Err(err) if err.is_no_records_found() => Ok(MxAnswer::default()),
            Err(source) => {
                warn!("MX lookup failed for {domain}: {source}");
                Err(DnsError::LookupFailed {
                    domain: domain.to_string(),
                    source,
                })
            }
        }
    }
}

/// Resolved mail exchangers for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MxRecord {
    /// The queried domain in A-label form.
    pub domain: String,
    /// Owner name of the answer, differing from `domain` after a CNAME.
    pub next_hop: String,
    /// Exchange host names by ascending preference.
    pub hosts: Vec<String>,
    /// `(preference, exchange)` as answered.
    pub records: Vec<(u16, String)>,
}

/// Caching MX resolver.
#[derive(Debug)]
pub struct DnsResolver {
    lookup: Arc<dyn MxLookup>,
    cache: DashMap<String, Arc<MxRecord>>,
}

impl DnsResolver {
    pub fn new(lookup: Arc<dyn MxLookup>) -> Self {
        Self {
            lookup,
            cache: DashMap::new(),
        }
    }

    /// A resolver using the system configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the system DNS configuration cannot be loaded.
    pub fn system() -> Result<Self, hickory_resolver::ResolveError> {
        Ok(Self::new(Arc::new(HickoryLookup::new()?)))
    }

    /// Number of cached domains.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Resolve the MX hosts for `domain`, answering from the cache when
    /// possible.
    ///
    /// # Errors
    ///
    /// * `DnsError::InvalidDomain` when the name has no ASCII form.
    /// * `DnsError::LookupFailed` when the resolver errors.
    /// * `DnsError::NoMailServers` when the answer holds no exchanges.
    pub async fn lookup_mx(&self, domain: &str) -> Result<Arc<MxRecord>, DnsError> {
        let ascii = idna::domain_to_ascii(domain.trim_end_matches('.')).map_err(|err| {
            DnsError::InvalidDomain {
                domain: domain.to_string(),
                reason: err.to_string(),
            }
        })?;

        if let Some(cached) = self.cache.get(&ascii) {
            debug!("Cache hit for {ascii}, {} host(s)", cached.hosts.len());
            return Ok(Arc::clone(&cached));
        }

        let answer = self.lookup.lookup_mx(&ascii).await?;

        let mut records = answer.records;
        records.sort_by_key(|(preference, _)| *preference);

        let hosts: Vec<String> = records
            .iter()
            .map(|(_, exchange)| exchange.trim_end_matches('.').to_string())
            .filter(|host| !host.is_empty())
            .collect();

        if hosts.is_empty() {
            return Err(DnsError::NoMailServers(ascii));
        }

        let record = Arc::new(MxRecord {
            next_hop: answer.owner.map_or_else(
                || ascii.clone(),
                |owner| owner.trim_end_matches('.').to_string(),
            ),
            domain: ascii.clone(),
            hosts,
            records,
        });

        debug!(
            "Resolved {} MX host(s) for {ascii} via {}",
            record.hosts.len(),
            record.next_hop
        );
        self.cache.insert(ascii, Arc::clone(&record));
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, Default)]
    struct Counting {
        calls: AtomicUsize,
        answer: MxAnswer,
    }

    #[async_trait]
    impl MxLookup for Counting {
        async fn lookup_mx(&self, _domain: &str) -> Result<MxAnswer, DnsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    fn counting(records: &[(u16, &str)]) -> Arc<Counting> {
        Arc::new(Counting {
            calls: AtomicUsize::new(0),
            answer: MxAnswer {
                owner: Some("mail.example.com.".to_string()),
                records: records
                    .iter()
                    .map(|(preference, host)| (*preference, (*host).to_string()))
                    .collect(),
            },
        })
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let lookup = counting(&[(20, "mx2.example.com."), (10, "mx1.example.com.")]);
        let resolver = DnsResolver::new(Arc::clone(&lookup) as Arc<dyn MxLookup>);

        let first = resolver.lookup_mx("example.com").await.unwrap();
        let second = resolver.lookup_mx("example.com").await.unwrap();

        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.hosts, vec!["mx1.example.com", "mx2.example.com"]);
        assert_eq!(first.next_hop, "mail.example.com");
        assert_eq!(resolver.cached(), 1);
    }

    #[tokio::test]
    async fn unicode_domains_share_the_ascii_cache_entry() {
        let lookup = counting(&[(10, "mx.xn--bcher-kva.example.")]);
        let resolver = DnsResolver::new(Arc::clone(&lookup) as Arc<dyn MxLookup>);

        let unicode = resolver.lookup_mx("bücher.example").await.unwrap();
        resolver.lookup_mx("xn--bcher-kva.example").await.unwrap();

        assert_eq!(unicode.domain, "xn--bcher-kva.example");
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_answer_is_no_mail_servers() {
        let resolver = DnsResolver::new(counting(&[]));
        let err = resolver.lookup_mx("example.com").await.unwrap_err();

        assert!(matches!(err, DnsError::NoMailServers(ref domain) if domain == "example.com"));
        assert_eq!(err.kind(), ErrorKind::DnsLookup);
        assert_eq!(resolver.cached(), 0);
    }

    #[tokio::test]
    #[ignore = "Requires network access"]
    async fn gmail_has_mx_hosts() {
        let resolver = DnsResolver::system().unwrap();
        let record = resolver.lookup_mx("gmail.com").await.unwrap();

        assert!(!record.hosts.is_empty());
        assert!(record.records.windows(2).all(|w| w[0].0 <= w[1].0));
    }
}
