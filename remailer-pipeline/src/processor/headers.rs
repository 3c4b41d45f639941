use chrono::Utc;
use remailer_common::Mail;
use serde::Deserialize;
use serde_yaml::Value;

use super::Processor;
use crate::{
    Result,
    stage::{Stage, parse_args},
};

/// RFC 1123 with a numeric zone, as used in the `Date` field.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

const STRUCTURED: [&str; 6] = ["Content-Type", "Date", "From", "Message-ID", "Subject", "To"];

fn is_structured(name: &str) -> bool {
    STRUCTURED
        .iter()
        .any(|structured| structured.eq_ignore_ascii_case(name))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BodyHeadersArgs {
    date: Option<String>,
}

/// Fills `mail.headers_map`: control file headers first, then headers found
/// in the body, then the structured fields, which replace earlier headers of
/// the same name.
///
/// Control file fields the structured fields own are left to them.
#[derive(Debug, Default)]
pub struct BodyHeaders {
    date: Option<String>,
}

impl BodyHeaders {
    pub const NAME: &'static str = "bodyHeaders";

    /// Use `date` instead of the current time.
    pub fn with_date(date: impl Into<String>) -> Self {
        Self {
            date: Some(date.into()),
        }
    }
}

impl Stage for BodyHeaders {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self, args: &Value) -> Result<()> {
        self.date = parse_args::<BodyHeadersArgs>(Self::NAME, args)?.date;
        Ok(())
    }
}

impl Processor for BodyHeaders {
    fn process(&self, mail: &mut Mail) -> Result<()> {
        for (name, value) in mail.control_headers.iter() {
            if !is_structured(name) {
                mail.headers_map.insert(name, value);
            }
        }

        for (name, value) in mail.body_headers.iter() {
            mail.headers_map.insert(name, value);
        }

        if !mail.content_type.is_empty() {
            mail.headers_map
                .insert("Content-Type", mail.content_type.clone());
        }

        let date = self
            .date
            .clone()
            .unwrap_or_else(|| Utc::now().format(DATE_FORMAT).to_string());
        mail.headers_map.insert("Date", date);

        if let Some(from) = &mail.from {
            mail.headers_map.insert("From", from.header_value());
        }

        if !mail.message_id.is_empty() {
            let message_id = mail.message_id_header();
            mail.headers_map.insert("Message-ID", message_id);
        }

        mail.headers_map.insert("Subject", mail.subject.clone());

        if !mail.to.is_empty() {
            mail.headers_map.insert("To", mail.to.header_value());
        }

        Ok(())
    }
}

/// Serialises `headers_map` into the `headers` block, ending in a blank line.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeHeaders;

impl MergeHeaders {
    pub const NAME: &'static str = "mergeHeaders";
}

impl Stage for MergeHeaders {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}

impl Processor for MergeHeaders {
    fn process(&self, mail: &mut Mail) -> Result<()> {
        let mut headers = Vec::new();
        for (name, value) in mail.headers_map.iter() {
            headers.extend_from_slice(name.as_bytes());
            headers.extend_from_slice(b": ");
            headers.extend_from_slice(value);
            headers.extend_from_slice(b"\r\n");
        }
        headers.extend_from_slice(b"\r\n");

        mail.headers = headers;
        Ok(())
    }
}

/// `final_body = headers + body + CRLF CRLF`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeBody;

impl MergeBody {
    pub const NAME: &'static str = "mergeBody";
}

impl Stage for MergeBody {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}

impl Processor for MergeBody {
    fn process(&self, mail: &mut Mail) -> Result<()> {
        let mut final_body = Vec::with_capacity(mail.headers.len() + mail.body.len() + 4);
        final_body.extend_from_slice(&mail.headers);
        final_body.extend_from_slice(&mail.body);
        final_body.extend_from_slice(b"\r\n\r\n");

        mail.final_body = final_body;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use remailer_common::{Address, AddressList};

    use super::*;

    fn mail() -> Mail {
        let mut mail = Mail::new("001");
        mail.from = Some(Address::parse("Sender <sender@example.com>").unwrap());
        mail.to = AddressList::parse("a@example.org, b@example.org").unwrap();
        mail.subject = b"Greetings".to_vec();
        mail.message_id = b"<fixed@example.com>".to_vec();
        mail.body = b"Hello".to_vec();
        mail
    }

    #[test]
    fn structured_fields_follow_body_headers() {
        let mut mail = mail();
        mail.body_headers.insert("X-Campaign", "spring");
        mail.body_headers.insert("Subject", "from the body");

        BodyHeaders::with_date("Tue, 14 Nov 2023 22:13:20 +0000")
            .process(&mut mail)
            .unwrap();

        let names: Vec<&str> = mail.headers_map.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["X-Campaign", "Subject", "Date", "From", "Message-ID", "To"]
        );
        assert_eq!(mail.headers_map.get("Subject"), Some(&b"Greetings"[..]));
        assert!(mail.headers_map.get("Content-Type").is_none());
        assert_eq!(
            mail.headers_map.get("To"),
            Some(&b"a@example.org, b@example.org"[..])
        );
    }

    #[test]
    fn control_file_headers_are_kept() {
        let mut mail = mail();
        mail.control_headers.insert("Reply-To", "help@example.com");
        mail.control_headers.insert("subject", "lower case duplicate");
        mail.control_headers.insert("X-Campaign", "spring");
        mail.body_headers.insert("X-Campaign", "summer");

        BodyHeaders::with_date("Tue, 14 Nov 2023 22:13:20 +0000")
            .process(&mut mail)
            .unwrap();

        let names: Vec<&str> = mail.headers_map.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["Reply-To", "X-Campaign", "Date", "From", "Message-ID", "Subject", "To"]
        );
        assert_eq!(
            mail.headers_map.get("Reply-To"),
            Some(&b"help@example.com"[..])
        );
        assert_eq!(mail.headers_map.get("X-Campaign"), Some(&b"summer"[..]));
    }

    #[test]
    fn generated_date_is_rfc1123z() {
        let mut mail = mail();
        BodyHeaders::default().process(&mut mail).unwrap();

        let date = String::from_utf8(mail.headers_map.get("Date").unwrap().to_vec()).unwrap();
        assert!(chrono::DateTime::parse_from_rfc2822(&date).is_ok(), "{date}");
        assert!(date.ends_with("+0000"));
    }

    #[test]
    fn merge_headers_and_body() {
        let mut mail = mail();
        mail.headers_map.insert("From", "sender@example.com");
        mail.headers_map.insert("Subject", "Greetings");

        MergeHeaders.process(&mut mail).unwrap();
        assert_eq!(
            mail.headers,
            b"From: sender@example.com\r\nSubject: Greetings\r\n\r\n"
        );

        MergeBody.process(&mut mail).unwrap();
        assert_eq!(
            mail.final_body.len(),
            mail.headers.len() + mail.body.len() + 4
        );
        assert!(mail.final_body.ends_with(b"Hello\r\n\r\n"));
    }
}
