use async_trait::async_trait;
use remailer_common::{FileStatus, Mail};
use remailer_spool::FileUnit;
use serde::Deserialize;
use serde_yaml::Value;

use super::Transformer;
use crate::{
    Result, crlf,
    stage::{Stage, parse_args},
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HeadersArgs {
    prefix: String,
}

/// Parses the control file into `mail.metadata` and `mail.control_headers`.
///
/// Lines are `Name: value`. Lines starting with whitespace continue the
/// previous field. With a `prefix` such as sendmail's `H??`, prefixed names
/// are stored both as written and with the prefix removed, and only prefixed
/// lines count as header fields.
#[derive(Debug, Default)]
pub struct Headers {
    prefix: String,
}

impl Headers {
    pub const NAME: &'static str = "headers";

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Parse `control` into `metadata`.
    pub fn parse_into(&self, control: &[u8], mail: &mut Mail) {
        let normalised = crlf(control);
        let mut current: Vec<String> = Vec::new();
        let mut current_header: Option<String> = None;

        for line in normalised.split(|&byte| byte == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.trim_ascii().is_empty() {
                continue;
            }

            if line[0] == b' ' || line[0] == b'\t' {
                let continuation = line.trim_ascii_end();
                for key in &current {
                    if let Some(value) = mail.metadata.get_mut(key) {
                        value.extend_from_slice(continuation);
                    }
                }
                if let Some(name) = &current_header {
                    mail.control_headers.append(name, continuation);
                }
                continue;
            }

            let Some(colon) = line.iter().position(|&byte| byte == b':') else {
                tracing::debug!(unit = %mail.id, "Ignoring control line without a field name");
                current.clear();
                current_header = None;
                continue;
            };

            let key = String::from_utf8_lossy(line[..colon].trim_ascii()).into_owned();
            let value = line[colon + 1..].trim_ascii().to_vec();

            current.clear();
            current_header = None;
            if self.prefix.is_empty() {
                mail.control_headers.insert(key.clone(), value.clone());
                current_header = Some(key.clone());
            } else if let Some(stripped) = key.strip_prefix(self.prefix.as_str()) {
                let stripped = stripped.trim().to_string();
                mail.metadata.insert(stripped.clone(), value.clone());
                mail.control_headers.insert(stripped.clone(), value.clone());
                current_header = Some(stripped.clone());
                current.push(stripped);
            }
            mail.metadata.insert(key.clone(), value);
            current.push(key);
        }
    }
}

impl Stage for Headers {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self, args: &Value) -> Result<()> {
        let args: HeadersArgs = parse_args(Self::NAME, args)?;
        self.prefix = args.prefix;
        Ok(())
    }
}

#[async_trait]
impl Transformer for Headers {
    async fn transform(&self, unit: &mut FileUnit, mut mail: Mail) -> Result<Mail> {
        let control = unit.read_control().await?;
        unit.set_status(FileStatus::HeadersRead).await?;

        self.parse_into(&control, &mut mail);
        unit.set_status(FileStatus::HeadersParse).await?;

        tracing::debug!(unit = %unit.id, fields = mail.metadata.len(), "Parsed control file");
        Ok(mail)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(prefix: &str, control: &[u8]) -> Mail {
        let mut mail = Mail::new("001");
        Headers::with_prefix(prefix).parse_into(control, &mut mail);
        mail
    }

    fn value<'a>(mail: &'a Mail, key: &str) -> &'a [u8] {
        mail.metadata.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    #[test]
    fn plain_fields() {
        let mail = parse(
            "",
            b"From: sender@example.com\nTo:  recipient@example.com \r\nSubject: test\n",
        );
        assert_eq!(value(&mail, "From"), b"sender@example.com");
        assert_eq!(value(&mail, "To"), b"recipient@example.com");
        assert_eq!(value(&mail, "Subject"), b"test");
        assert_eq!(mail.metadata.len(), 3);
    }

    #[test]
    fn prefixed_fields_are_stored_twice() {
        let mail = parse("H??", b"V8\nH??From: a@example.com\nH??Subject: hi\n");
        assert_eq!(value(&mail, "H??From"), b"a@example.com");
        assert_eq!(value(&mail, "From"), b"a@example.com");
        assert_eq!(value(&mail, "Subject"), b"hi");
        assert!(!mail.metadata.contains_key("V8"));
    }

    #[test]
    fn continuation_lines_are_unfolded() {
        let mail = parse(
            "H??",
            b"H??Subject: first\n\tsecond  \n third\nH??To: b@example.com\n",
        );
        assert_eq!(value(&mail, "Subject"), b"first\tsecond third");
        assert_eq!(value(&mail, "H??Subject"), b"first\tsecond third");
        assert_eq!(value(&mail, "To"), b"b@example.com");
    }

    #[test]
    fn only_prefixed_lines_are_header_fields() {
        let mail = parse(
            "H??",
            b"V8\nMDeferred: Connection refused\nH??Reply-To: help@example.com\nH??X-Campaign: spring\n\tsale\n",
        );
        let fields: Vec<(&str, &[u8])> = mail.control_headers.iter().collect();
        assert_eq!(
            fields,
            vec![
                ("Reply-To", &b"help@example.com"[..]),
                ("X-Campaign", &b"spring\tsale"[..]),
            ]
        );
        assert_eq!(value(&mail, "MDeferred"), b"Connection refused");
    }

    #[test]
    fn keys_are_case_sensitive() {
        let mail = parse("", b"from: lower@example.com\nFrom: upper@example.com\n");
        assert_eq!(value(&mail, "from"), b"lower@example.com");
        assert_eq!(value(&mail, "From"), b"upper@example.com");
    }

    #[test]
    fn values_keep_later_colons() {
        let mail = parse("", b"Date: Tue, 14 Nov 2023 22:13:20 +0000\n");
        assert_eq!(value(&mail, "Date"), b"Tue, 14 Nov 2023 22:13:20 +0000");
    }
}
