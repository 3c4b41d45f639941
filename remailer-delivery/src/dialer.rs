//! Outbound connections, either direct or through a SOCKS5 proxy.

use std::time::Duration;

use rand::{rngs::OsRng, seq::SliceRandom};
use remailer_common::ErrorKind;
use remailer_smtp::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DialError {
    #[error("Connecting to {addr} timed out after {after:?}")]
    Timeout { addr: String, after: Duration },

    #[error("Failed to connect to {addr}: {source}")]
    Io {
        addr: String,
        source: std::io::Error,
    },

    #[error("SOCKS5 proxy {proxy} failed to reach {addr}: {source}")]
    Socks {
        proxy: String,
        addr: String,
        source: tokio_socks::Error,
    },
}

impl DialError {
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::SmtpConnection
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAuth {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DialerConfig {
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// `host:port` of a SOCKS5 proxy. Empty or absent dials directly.
    #[serde(default)]
    pub socks5: Option<String>,

    #[serde(default)]
    pub auth: Option<ProxyAuth>,

    #[serde(default = "default_port")]
    pub port: u16,
}

const fn default_timeout() -> Duration {
    Duration::from_secs(50)
}

const fn default_port() -> u16 {
    25
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            socks5: None,
            auth: None,
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialMode {
    Direct,
    Socks5 {
        proxy: String,
        auth: Option<ProxyAuth>,
    },
}

#[derive(Debug, Clone)]
pub struct Dialer {
    mode: DialMode,
    timeout: Duration,
    port: u16,
}

impl Dialer {
    pub fn from_config(config: &DialerConfig) -> Self {
        let mode = match config.socks5.as_deref().map(str::trim) {
            Some(proxy) if !proxy.is_empty() => DialMode::Socks5 {
                proxy: proxy.to_string(),
                auth: config.auth.clone(),
            },
            _ => DialMode::Direct,
        };

        Self {
            mode,
            timeout: config.timeout,
            port: config.port,
        }
    }

    pub const fn mode(&self) -> &DialMode {
        &self.mode
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Open a stream to `host` on the configured port.
    ///
    /// # Errors
    ///
    /// Returns a `DialError` when the connection fails or does not complete
    /// within the configured timeout.
    pub async fn dial(&self, host: &str) -> Result<BoxStream, DialError> {
        let host = host.trim_end_matches('.');
        let addr = format!("{host}:{}", self.port);
        debug!(%addr, mode = ?self.mode, "Dialing");

        let connect = async {
            match &self.mode {
                DialMode::Direct => TcpStream::connect((host, self.port))
                    .await
                    .map(|stream| Box::new(stream) as BoxStream)
                    .map_err(|source| DialError::Io {
                        addr: addr.clone(),
                        source,
                    }),
                DialMode::Socks5 { proxy, auth } => {
                    let target = (host, self.port);
                    let stream = match auth {
                        Some(auth) => {
                            Socks5Stream::connect_with_password(
                                proxy.as_str(),
                                target,
                                &auth.user,
                                &auth.password,
                            )
                            .await
                        }
                        None => Socks5Stream::connect(proxy.as_str(), target).await,
                    };

                    stream
                        .map(|stream| Box::new(stream) as BoxStream)
                        .map_err(|source| DialError::Socks {
                            proxy: proxy.clone(),
                            addr: addr.clone(),
                            source,
                        })
                }
            }
        };

        tokio::time::timeout(self.timeout, connect)
            .await
            .map_err(|_| DialError::Timeout {
                addr: addr.clone(),
                after: self.timeout,
            })?
    }
}

/// Pick one host uniformly at random.
pub fn choose_host(hosts: &[String]) -> Option<&String> {
    hosts.choose(&mut OsRng)
}
