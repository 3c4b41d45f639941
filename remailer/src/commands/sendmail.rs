use std::sync::Arc;

use anyhow::Context as _;
use remailer_common::{Address, AddressList, Mail};
use remailer_delivery::{Dialer, DnsResolver, Sender};
use remailer_pipeline::ProcessorChain;

use crate::{cli::SendmailArgs, config::Config};

/// Assemble a mail from command line arguments, ready for the processor
/// chain.
pub fn build_mail(config: &Config, args: &SendmailArgs, body: Vec<u8>) -> anyhow::Result<Mail> {
    let from = args
        .from
        .as_deref()
        .or(config.read_file.default_from.as_deref())
        .context("no sender: pass --from or set read-file.default-from")?;

    let mut mail = Mail::new(format!("sendmail-{}", std::process::id()));
    mail.from = Some(Address::parse(from).with_context(|| format!("invalid sender {from}"))?);

    let to = args.to.join(", ");
    mail.to = AddressList::parse(&to).with_context(|| format!("invalid recipients {to}"))?;
    mail.subject = args.subject.clone().into_bytes();
    mail.message_id = Mail::generate_message_id();
    mail.body = body;

    Ok(mail)
}

/// Send one message through the configured processors and print the
/// outcome for every recipient.
pub async fn sendmail(config: &Config, args: SendmailArgs) -> anyhow::Result<()> {
    let body = match (&args.body, &args.body_file) {
        (Some(body), _) => body.clone().into_bytes(),
        (None, Some(path)) => tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => Vec::new(),
    };

    let mut mail = build_mail(config, &args, body)?;
    ProcessorChain::from_config(&config.processor_configs())?.run(&mut mail)?;

    let sender = Sender::new(
        Arc::new(DnsResolver::system()?),
        Dialer::from_config(&config.dialer),
        config.smtp.clone(),
    );
    let (responses, errors) = sender.send_mail(&mail).await;

    for rcpt in mail.recipients() {
        for response in responses.get(&rcpt).into_iter().flatten() {
            println!("{rcpt}: {response}");
        }
        if let Some(error) = errors.get(&rcpt) {
            println!("{rcpt}: error: {error}");
        }
    }

    if !errors.is_empty() {
        anyhow::bail!(
            "delivery failed for {} of {} recipient(s)",
            errors.len(),
            mail.to.len()
        );
    }

    Ok(())
}
