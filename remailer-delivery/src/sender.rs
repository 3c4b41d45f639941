use std::{collections::BTreeMap, sync::Arc};

use remailer_common::{Mail, lifecycle};
use tracing::{info, warn};

use crate::{
    Errors, Responses,
    dialer::{Dialer, choose_host},
    dns::DnsResolver,
    error::DeliveryError,
    session::{Envelope, Session, SmtpConfig},
};

/// Delivers assembled mail, one SMTP session per recipient domain.
#[derive(Debug)]
pub struct Sender {
    resolver: Arc<DnsResolver>,
    dialer: Dialer,
    smtp: SmtpConfig,
}

impl Sender {
    pub const fn new(resolver: Arc<DnsResolver>, dialer: Dialer, smtp: SmtpConfig) -> Self {
        Self {
            resolver,
            dialer,
            smtp,
        }
    }

    pub const fn resolver(&self) -> &Arc<DnsResolver> {
        &self.resolver
    }

    /// Send `mail.final_body` to every recipient in `mail.to`.
    ///
    /// Never fails as a whole: each recipient ends up with the replies it got
    /// in `Responses`, and with an entry in `Errors` when something stopped
    /// its delivery.
    pub async fn send_mail(&self, mail: &Mail) -> (Responses, Errors) {
        let mut responses = Responses::new();
        let mut errors = Errors::new();

        let mut by_domain: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for rcpt in mail.to.iter() {
            by_domain
                .entry(rcpt.domain_ascii())
                .or_default()
                .push(rcpt.addr_spec());
        }

        let Some(from) = mail.from.as_ref().map(remailer_common::Address::addr_spec) else {
            let err = Arc::new(DeliveryError::MissingSender);
            for rcpt in by_domain.into_values().flatten() {
                errors.insert(rcpt, Arc::clone(&err));
            }
            return (responses, errors);
        };

        for (domain, recipients) in by_domain {
            lifecycle!(
                level = DEBUG,
                unit = %mail.id,
                %domain,
                recipients = recipients.len(),
                "Delivering"
            );

            let envelope = Envelope {
                from: &from,
                recipients: &recipients,
                data: &mail.final_body,
            };

            if let Err(err) = self
                .deliver_domain(&domain, envelope, &mut responses, &mut errors)
                .await
            {
                warn!(unit = %mail.id, %domain, error = %err, "Delivery failed");
                let err = Arc::new(err);
                for rcpt in recipients {
                    errors.entry(rcpt).or_insert_with(|| Arc::clone(&err));
                }
            }
        }

        info!(
            unit = %mail.id,
            recipients = mail.to.len(),
            failed = errors.len(),
            "Mail sent"
        );

        (responses, errors)
    }

    async fn deliver_domain(
        &self,
        domain: &str,
        envelope: Envelope<'_>,
        responses: &mut Responses,
        errors: &mut Errors,
    ) -> Result<(), DeliveryError> {
        let record = self.resolver.lookup_mx(domain).await?;
        let host =
            choose_host(&record.hosts).ok_or_else(|| DeliveryError::NoHost(domain.to_string()))?;

        Session::new(&self.dialer, &self.smtp, host)
            .deliver(envelope, responses, errors)
            .await
    }
}
