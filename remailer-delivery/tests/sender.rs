#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use remailer_common::{Address, AddressList, ErrorKind, Mail};
use remailer_delivery::{
    DeliveryError, Dialer, DialerConfig, DnsError, DnsResolver, MxAnswer, MxLookup, Sender,
    SmtpConfig, SmtpTimeouts,
};
use support::mock_server::{MockSmtpServer, SmtpCommand};

/// Answers every MX query with the given exchanges.
#[derive(Debug)]
struct StaticLookup(Vec<(u16, String)>);

#[async_trait]
impl MxLookup for StaticLookup {
    async fn lookup_mx(&self, _domain: &str) -> Result<MxAnswer, DnsError> {
        Ok(MxAnswer {
            owner: None,
            records: self.0.clone(),
        })
    }
}

fn sender_for(server: &MockSmtpServer) -> Sender {
    sender_with(server.port(), vec![(10, "127.0.0.1".to_string())])
}

fn sender_with(port: u16, records: Vec<(u16, String)>) -> Sender {
    let resolver = Arc::new(DnsResolver::new(Arc::new(StaticLookup(records))));
    let dialer = Dialer::from_config(&DialerConfig {
        port,
        ..DialerConfig::default()
    });
    let smtp = SmtpConfig {
        helo_name: "relay.test".to_string(),
        timeouts: SmtpTimeouts {
            data_secs: 5,
            ..SmtpTimeouts::default()
        },
    };
    Sender::new(resolver, dialer, smtp)
}

fn mail(to: &str) -> Mail {
    let mut mail = Mail::new("0001");
    mail.from = Some(Address::parse("Sender <sender@example.com>").unwrap());
    mail.to = AddressList::parse(to).unwrap();
    mail.final_body = b"Subject: hi\r\n\r\n.dot\r\nbody\r\n\r\n".to_vec();
    mail
}

#[tokio::test]
async fn delivers_and_records_per_recipient_outcomes() {
    let server = MockSmtpServer::builder()
        .with_rejected_recipient("gone@example.org")
        .build()
        .await
        .unwrap();
    let sender = sender_for(&server);

    let (responses, errors) = sender
        .send_mail(&mail("ok@example.org, gone@example.org"))
        .await;

    let codes = |rcpt: &str| -> Vec<u16> { responses[rcpt].iter().map(|r| r.code).collect() };
    assert_eq!(codes("ok@example.org"), vec![250, 250]);
    assert_eq!(codes("gone@example.org"), vec![550]);

    assert_eq!(errors.len(), 1);
    let rejected = &errors["gone@example.org"];
    assert_eq!(rejected.kind(), ErrorKind::MailDelivery);
    assert_eq!(rejected.response().map(|r| r.code), Some(550));

    assert_eq!(
        server.commands().await,
        vec![
            SmtpCommand::Ehlo("relay.test".to_string()),
            SmtpCommand::MailFrom("FROM:<sender@example.com>".to_string()),
            SmtpCommand::RcptTo("TO:<ok@example.org>".to_string()),
            SmtpCommand::RcptTo("TO:<gone@example.org>".to_string()),
            SmtpCommand::Data,
            SmtpCommand::MessageContent(b"Subject: hi\r\n\r\n..dot\r\nbody\r\n\r\n".to_vec()),
            SmtpCommand::Quit,
        ]
    );
    server.shutdown();
}

#[tokio::test]
async fn message_refused_after_data_fails_accepted_recipients() {
    let server = MockSmtpServer::builder()
        .with_rejected_recipient("gone@example.org")
        .with_data_end_response(554, "5.7.1 Message refused")
        .build()
        .await
        .unwrap();

    let (responses, errors) = sender_for(&server)
        .send_mail(&mail("ok@example.org, gone@example.org"))
        .await;

    let codes: Vec<u16> = responses["ok@example.org"].iter().map(|r| r.code).collect();
    assert_eq!(codes, vec![250, 554]);

    assert_eq!(errors.len(), 2);
    let refused = &errors["ok@example.org"];
    assert_eq!(refused.kind(), ErrorKind::MailDelivery);
    assert_eq!(refused.response().map(|r| r.code), Some(554));
    assert!(refused.to_string().contains("DATA"), "{refused}");
    assert_eq!(
        errors["gone@example.org"].response().map(|r| r.code),
        Some(550)
    );
    server.shutdown();
}

#[tokio::test]
async fn falls_back_to_helo() {
    let server = MockSmtpServer::builder()
        .with_ehlo_response(502, &["5.5.1 EHLO not supported"])
        .build()
        .await
        .unwrap();

    let (responses, errors) = sender_for(&server).send_mail(&mail("a@example.org")).await;

    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(responses["a@example.org"].len(), 2);

    let commands = server.commands().await;
    assert_eq!(commands[0], SmtpCommand::Ehlo("relay.test".to_string()));
    assert_eq!(commands[1], SmtpCommand::Helo("relay.test".to_string()));
    server.shutdown();
}

#[tokio::test]
async fn refused_starttls_reconnects_in_plaintext() {
    let server = MockSmtpServer::builder()
        .with_ehlo_response(250, &["mock.example", "STARTTLS", "8BITMIME"])
        .with_starttls_response(454, "4.7.0 TLS not available")
        .build()
        .await
        .unwrap();

    let (responses, errors) = sender_for(&server).send_mail(&mail("a@example.org")).await;

    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(responses["a@example.org"].last().unwrap().code, 250);
    assert_eq!(server.connections(), 2);
    assert_eq!(server.messages().await.len(), 1);
    server.shutdown();
}

#[tokio::test]
async fn rejected_sender_fails_every_recipient() {
    let server = MockSmtpServer::builder()
        .with_mail_from_response(553, "5.7.1 Sender not allowed")
        .build()
        .await
        .unwrap();

    let (responses, errors) = sender_for(&server)
        .send_mail(&mail("a@example.org, b@example.org"))
        .await;

    assert!(responses.is_empty());
    assert_eq!(errors.len(), 2);
    for error in errors.values() {
        assert!(matches!(
            error.as_ref(),
            DeliveryError::Rejected { step: "MAIL FROM", .. }
        ));
    }
    server.shutdown();
}

#[tokio::test]
async fn dropped_connection_keeps_partial_responses() {
    // Greeting, EHLO, MAIL FROM and RCPT TO are answered, then the server
    // hangs up instead of answering DATA.
    let server = MockSmtpServer::builder()
        .with_network_error_after_commands(3)
        .build()
        .await
        .unwrap();

    let (responses, errors) = sender_for(&server).send_mail(&mail("a@example.org")).await;

    assert_eq!(responses["a@example.org"].len(), 1);
    assert_eq!(errors["a@example.org"].kind(), ErrorKind::MailDelivery);
    server.shutdown();
}

#[tokio::test]
async fn domain_without_mx_is_a_dns_error() {
    let sender = sender_with(25, Vec::new());

    let (responses, errors) = sender.send_mail(&mail("a@nowhere.example")).await;

    assert!(responses.is_empty());
    assert!(matches!(
        errors["a@nowhere.example"].as_ref(),
        DeliveryError::Dns(DnsError::NoMailServers(_))
    ));
    assert_eq!(errors["a@nowhere.example"].kind(), ErrorKind::DnsLookup);
}

#[tokio::test]
async fn missing_sender_is_a_validation_error() {
    let sender = sender_with(25, vec![(10, "127.0.0.1".to_string())]);
    let mut mail = mail("a@example.org");
    mail.from = None;

    let (_, errors) = sender.send_mail(&mail).await;

    assert_eq!(errors["a@example.org"].kind(), ErrorKind::MailValidation);
}
