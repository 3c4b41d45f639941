//! One SMTP conversation with one mail exchanger.
//!
//! A session delivers a single message to every recipient that shares the
//! exchanger's domain:
//! - greeting, then EHLO (HELO when EHLO is refused)
//! - opportunistic STARTTLS, reconnecting in plaintext when it fails
//! - MAIL FROM, one RCPT TO per recipient, DATA and the message
//! - QUIT, whose outcome does not affect delivery
//!
//! Every step runs under its own timeout from [`SmtpTimeouts`].

use std::{future::Future, sync::Arc, time::Duration};

use remailer_smtp::{Response, SmtpClient};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Errors, Responses, dialer::Dialer, error::DeliveryError};

/// Per-step timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SmtpTimeouts {
    #[serde(default = "default_greeting_timeout")]
    pub greeting_secs: u64,

    #[serde(default = "default_ehlo_timeout")]
    pub ehlo_secs: u64,

    #[serde(default = "default_starttls_timeout")]
    pub starttls_secs: u64,

    #[serde(default = "default_mail_from_timeout")]
    pub mail_from_secs: u64,

    #[serde(default = "default_rcpt_to_timeout")]
    pub rcpt_to_secs: u64,

    #[serde(default = "default_data_timeout")]
    pub data_secs: u64,

    #[serde(default = "default_quit_timeout")]
    pub quit_secs: u64,
}

const fn default_greeting_timeout() -> u64 {
    30
}

const fn default_ehlo_timeout() -> u64 {
    30
}

const fn default_starttls_timeout() -> u64 {
    30
}

const fn default_mail_from_timeout() -> u64 {
    30
}

const fn default_rcpt_to_timeout() -> u64 {
    30
}

const fn default_data_timeout() -> u64 {
    120
}

const fn default_quit_timeout() -> u64 {
    10
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            greeting_secs: default_greeting_timeout(),
            ehlo_secs: default_ehlo_timeout(),
            starttls_secs: default_starttls_timeout(),
            mail_from_secs: default_mail_from_timeout(),
            rcpt_to_secs: default_rcpt_to_timeout(),
            data_secs: default_data_timeout(),
            quit_secs: default_quit_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SmtpConfig {
    /// Name announced in EHLO/HELO.
    #[serde(default = "default_helo_name")]
    pub helo_name: String,

    #[serde(default)]
    pub timeouts: SmtpTimeouts,
}

fn default_helo_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            helo_name: default_helo_name(),
            timeouts: SmtpTimeouts::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TlsOutcome {
    Upgraded,
    Skipped,
    RetryWithoutTls,
}

/// What to deliver in one session.
#[derive(Debug, Clone, Copy)]
pub struct Envelope<'a> {
    pub from: &'a str,
    pub recipients: &'a [String],
    pub data: &'a [u8],
}

pub struct Session<'a> {
    dialer: &'a Dialer,
    config: &'a SmtpConfig,
    host: &'a str,
}

async fn timed<T, F>(step: &'static str, secs: u64, future: F) -> Result<T, DeliveryError>
where
    F: Future<Output = remailer_smtp::Result<T>>,
{
    let after = Duration::from_secs(secs);
    tokio::time::timeout(after, future)
        .await
        .map_err(|_| DeliveryError::Timeout { step, after })?
        .map_err(DeliveryError::from)
}

impl<'a> Session<'a> {
    pub const fn new(dialer: &'a Dialer, config: &'a SmtpConfig, host: &'a str) -> Self {
        Self {
            dialer,
            config,
            host,
        }
    }

    /// Run the conversation.
    ///
    /// Replies are appended to `responses` as they arrive. Recipients refused
    /// at RCPT, or whose message is refused after the final `.`, are recorded
    /// in `errors`, so both keep what happened
    /// before a failure. An `Err` is a failure that ends the session; the
    /// caller decides which recipients it applies to.
    ///
    /// # Errors
    ///
    /// Returns an error when dialing, a timeout, a transport failure, or a
    /// refused EHLO/HELO, MAIL FROM or DATA ends the session.
    pub async fn deliver(
        &self,
        envelope: Envelope<'_>,
        responses: &mut Responses,
        errors: &mut Errors,
    ) -> Result<(), DeliveryError> {
        let mut client = self.connect_and_greet().await?;

        if self.negotiate_tls(&mut client).await? == TlsOutcome::RetryWithoutTls {
            info!(host = self.host, "Reconnecting without STARTTLS");
            drop(client);
            client = self.connect_and_greet().await?;
            self.hello(&mut client).await?;
        }

        let timeouts = &self.config.timeouts;

        let response = timed(
            "MAIL FROM",
            timeouts.mail_from_secs,
            client.mail_from(envelope.from),
        )
        .await?;
        if !response.is_success() {
            return Err(DeliveryError::Rejected {
                step: "MAIL FROM",
                response,
            });
        }

        let mut accepted = Vec::with_capacity(envelope.recipients.len());
        for rcpt in envelope.recipients {
            let response = timed("RCPT TO", timeouts.rcpt_to_secs, client.rcpt_to(rcpt)).await?;
            responses
                .entry(rcpt.clone())
                .or_default()
                .push(response.clone());

            if response.is_success() {
                accepted.push(rcpt);
            } else {
                debug!(host = self.host, %rcpt, %response, "Recipient rejected");
                errors.insert(
                    rcpt.clone(),
                    Arc::new(DeliveryError::Rejected {
                        step: "RCPT TO",
                        response,
                    }),
                );
            }
        }

        if accepted.is_empty() {
            self.quit(&mut client).await;
            return Ok(());
        }

        let response = timed("DATA", timeouts.data_secs, client.data()).await?;
        if response.code != 354 {
            return Err(DeliveryError::Rejected {
                step: "DATA",
                response,
            });
        }

        let response = timed(
            "message data",
            timeouts.data_secs,
            client.send_data(envelope.data),
        )
        .await?;
        let rejected = !response.is_success();
        if rejected {
            warn!(host = self.host, %response, "Message rejected after DATA");
        }

        for rcpt in accepted {
            responses
                .entry(rcpt.clone())
                .or_default()
                .push(response.clone());
            if rejected {
                errors.insert(
                    rcpt.clone(),
                    Arc::new(DeliveryError::Rejected {
                        step: "DATA",
                        response: response.clone(),
                    }),
                );
            }
        }

        self.quit(&mut client).await;
        Ok(())
    }

    async fn connect_and_greet(&self) -> Result<SmtpClient, DeliveryError> {
        let stream = self.dialer.dial(self.host).await?;
        let mut client = SmtpClient::from_stream(stream, self.host.trim_end_matches('.'));

        let greeting = timed(
            "greeting",
            self.config.timeouts.greeting_secs,
            client.read_greeting(),
        )
        .await?;
        if !greeting.is_success() {
            return Err(DeliveryError::Rejected {
                step: "greeting",
                response: greeting,
            });
        }

        Ok(client)
    }

    /// EHLO, falling back to HELO when the server refuses EHLO permanently.
    async fn hello(&self, client: &mut SmtpClient) -> Result<Response, DeliveryError> {
        let name = self.config.helo_name.as_str();
        let secs = self.config.timeouts.ehlo_secs;

        let response = timed("EHLO", secs, client.ehlo(name)).await?;
        if response.is_success() {
            return Ok(response);
        }

        if response.is_permanent_error() {
            debug!(host = self.host, %response, "EHLO refused, trying HELO");
            let response = timed("HELO", secs, client.helo(name)).await?;
            if response.is_success() {
                return Ok(response);
            }
            return Err(DeliveryError::Rejected {
                step: "HELO",
                response,
            });
        }

        Err(DeliveryError::Rejected {
            step: "EHLO",
            response,
        })
    }

    async fn negotiate_tls(&self, client: &mut SmtpClient) -> Result<TlsOutcome, DeliveryError> {
        let hello = self.hello(client).await?;
        if !hello.has_extension("STARTTLS") {
            return Ok(TlsOutcome::Skipped);
        }

        match timed(
            "STARTTLS",
            self.config.timeouts.starttls_secs,
            client.starttls(),
        )
        .await
        {
            Ok(response) if response.is_success() => {}
            Ok(response) => {
                info!(host = self.host, %response, "STARTTLS refused");
                return Ok(TlsOutcome::RetryWithoutTls);
            }
            Err(err) => {
                info!(host = self.host, error = %err, "STARTTLS failed");
                return Ok(TlsOutcome::RetryWithoutTls);
            }
        }

        self.hello(client).await?;
        debug!(host = self.host, "TLS negotiated via STARTTLS");
        Ok(TlsOutcome::Upgraded)
    }

    async fn quit(&self, client: &mut SmtpClient) {
        if let Err(err) = timed("QUIT", self.config.timeouts.quit_secs, client.quit()).await {
            warn!(host = self.host, error = %err, "QUIT failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn timeouts_default_and_partial_override() {
        let timeouts: SmtpTimeouts = serde_yaml::from_str("data-secs: 5").unwrap();
        assert_eq!(timeouts.data_secs, 5);
        assert_eq!(timeouts.ehlo_secs, 30);
        assert_eq!(timeouts.quit_secs, 10);
    }

    #[test]
    fn helo_name_can_be_configured() {
        let config: SmtpConfig = serde_yaml::from_str("helo-name: relay.example.com").unwrap();
        assert_eq!(config.helo_name, "relay.example.com");
        assert_eq!(config.timeouts, SmtpTimeouts::default());
    }
}
