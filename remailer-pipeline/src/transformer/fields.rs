//! Transformers that lift individual control file fields into [`Mail`].

use async_trait::async_trait;
use remailer_common::{Address, AddressList, Mail};
use remailer_spool::FileUnit;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::Transformer;
use crate::{
    PipelineError, Result,
    stage::{Stage, parse_args},
};

/// Where an address comes from first.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressMode {
    /// The configured default, falling back to the control file.
    Default,
    /// The control file, falling back to the configured default.
    #[default]
    Headers,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AddressArgs {
    mode: AddressMode,
    default: String,
}

fn metadata_str<'a>(mail: &'a Mail, key: &str) -> Option<std::borrow::Cow<'a, str>> {
    mail.metadata
        .get(key)
        .filter(|value| !value.is_empty())
        .map(|value| String::from_utf8_lossy(value))
}

/// Try each candidate source in order, returning the first that parses.
///
/// When every present source fails to parse, the last parse error is
/// reported. When no source is present at all, the field is missing.
fn resolve<T, E>(
    field: &'static str,
    candidates: [Option<&str>; 2],
    parse: impl Fn(&str) -> std::result::Result<T, E>,
    wrap: impl Fn(E) -> PipelineError,
) -> Result<T> {
    let mut last_error = None;

    for candidate in candidates.into_iter().flatten() {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            continue;
        }
        match parse(candidate) {
            Ok(value) => return Ok(value),
            Err(err) => last_error = Some(wrap(err)),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        PipelineError::MailValidation(format!("no {field} address in headers or configuration"))
    }))
}

/// Resolves `mail.from` from the `From` field or a configured default.
#[derive(Debug, Default)]
pub struct HeaderFrom {
    mode: AddressMode,
    default: String,
}

impl HeaderFrom {
    pub const NAME: &'static str = "header_from";

    pub fn new(mode: AddressMode, default: impl Into<String>) -> Self {
        Self {
            mode,
            default: default.into(),
        }
    }

    pub fn resolve(&self, mail: &Mail) -> Result<Address> {
        let header = metadata_str(mail, "From");
        let header = header.as_deref();
        let default = Some(self.default.as_str());

        let candidates = match self.mode {
            AddressMode::Headers => [header, default],
            AddressMode::Default => [default, header],
        };

        resolve("From", candidates, Address::parse, |source| {
            PipelineError::Address {
                field: "From",
                source,
            }
        })
    }
}

impl Stage for HeaderFrom {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self, args: &Value) -> Result<()> {
        let args: AddressArgs = parse_args(Self::NAME, args)?;
        self.mode = args.mode;
        self.default = args.default;
        Ok(())
    }
}

#[async_trait]
impl Transformer for HeaderFrom {
    async fn transform(&self, _unit: &mut FileUnit, mut mail: Mail) -> Result<Mail> {
        mail.from = Some(self.resolve(&mail)?);
        Ok(mail)
    }
}

/// Resolves `mail.to` from the `To` field or a configured default. Every
/// address of a comma separated list becomes a recipient.
#[derive(Debug, Default)]
pub struct HeaderTo {
    mode: AddressMode,
    default: String,
}

impl HeaderTo {
    pub const NAME: &'static str = "header_to";

    pub fn new(mode: AddressMode, default: impl Into<String>) -> Self {
        Self {
            mode,
            default: default.into(),
        }
    }

    pub fn resolve(&self, mail: &Mail) -> Result<AddressList> {
        let header = metadata_str(mail, "To");
        let header = header.as_deref();
        let default = Some(self.default.as_str());

        let candidates = match self.mode {
            AddressMode::Headers => [header, default],
            AddressMode::Default => [default, header],
        };

        resolve("To", candidates, AddressList::parse, |source| {
            PipelineError::Address { field: "To", source }
        })
    }
}

impl Stage for HeaderTo {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self, args: &Value) -> Result<()> {
        let args: AddressArgs = parse_args(Self::NAME, args)?;
        self.mode = args.mode;
        self.default = args.default;
        Ok(())
    }
}

#[async_trait]
impl Transformer for HeaderTo {
    async fn transform(&self, _unit: &mut FileUnit, mut mail: Mail) -> Result<Mail> {
        mail.to = self.resolve(&mail)?;
        Ok(mail)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LiteralArgs {
    default: String,
}

/// Copies the `Subject` field, or the configured default.
#[derive(Debug, Default)]
pub struct HeaderSubject {
    default: String,
}

impl HeaderSubject {
    pub const NAME: &'static str = "header_subject";
}

impl Stage for HeaderSubject {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self, args: &Value) -> Result<()> {
        self.default = parse_args::<LiteralArgs>(Self::NAME, args)?.default;
        Ok(())
    }
}

#[async_trait]
impl Transformer for HeaderSubject {
    async fn transform(&self, _unit: &mut FileUnit, mut mail: Mail) -> Result<Mail> {
        mail.subject = mail
            .metadata
            .get("Subject")
            .cloned()
            .unwrap_or_else(|| self.default.as_bytes().to_vec());
        Ok(mail)
    }
}

/// Copies the `Content-Type` field, or the configured default which is
/// empty unless set.
#[derive(Debug, Default)]
pub struct HeaderContentType {
    default: String,
}

impl HeaderContentType {
    pub const NAME: &'static str = "header_contenttype";
}

impl Stage for HeaderContentType {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self, args: &Value) -> Result<()> {
        self.default = parse_args::<LiteralArgs>(Self::NAME, args)?.default;
        Ok(())
    }
}

#[async_trait]
impl Transformer for HeaderContentType {
    async fn transform(&self, _unit: &mut FileUnit, mut mail: Mail) -> Result<Mail> {
        mail.content_type = mail
            .metadata
            .get("Content-Type")
            .cloned()
            .unwrap_or_else(|| self.default.as_bytes().to_vec());
        Ok(mail)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageIdMode {
    #[default]
    Headers,
    Default,
    Uuid,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MessageIdArgs {
    mode: MessageIdMode,
    default: String,
}

/// Sets `mail.message_id`. Whenever no usable value exists, a fresh UUIDv7
/// is generated as 16 raw bytes.
#[derive(Debug, Default)]
pub struct HeaderMessageId {
    mode: MessageIdMode,
    default: String,
}

impl HeaderMessageId {
    pub const NAME: &'static str = "header_msgid";

    pub fn new(mode: MessageIdMode, default: impl Into<String>) -> Self {
        Self {
            mode,
            default: default.into(),
        }
    }

    pub fn resolve(&self, mail: &Mail) -> Vec<u8> {
        let found = match self.mode {
            MessageIdMode::Uuid => None,
            MessageIdMode::Headers => mail
                .metadata
                .get("Message-ID")
                .filter(|value| !value.is_empty())
                .cloned(),
            MessageIdMode::Default => {
                Some(self.default.as_bytes().to_vec()).filter(|value| !value.is_empty())
            }
        };

        found.unwrap_or_else(Mail::generate_message_id)
    }
}

impl Stage for HeaderMessageId {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self, args: &Value) -> Result<()> {
        let args: MessageIdArgs = parse_args(Self::NAME, args)?;
        self.mode = args.mode;
        self.default = args.default;
        Ok(())
    }
}

#[async_trait]
impl Transformer for HeaderMessageId {
    async fn transform(&self, _unit: &mut FileUnit, mut mail: Mail) -> Result<Mail> {
        mail.message_id = self.resolve(&mail);
        Ok(mail)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use remailer_common::ErrorKind;

    use super::*;

    fn mail(fields: &[(&str, &str)]) -> Mail {
        let mut mail = Mail::new("001");
        for (key, value) in fields {
            mail.metadata
                .insert((*key).to_string(), value.as_bytes().to_vec());
        }
        mail
    }

    #[test]
    fn from_modes() {
        let mail = mail(&[("From", "sender@example.com")]);

        let headers = HeaderFrom::new(AddressMode::Headers, "defaultFrom@example.com");
        assert_eq!(headers.resolve(&mail).unwrap().addr_spec(), "sender@example.com");

        let default = HeaderFrom::new(AddressMode::Default, "defaultFrom@example.com");
        assert_eq!(
            default.resolve(&mail).unwrap().addr_spec(),
            "defaultFrom@example.com"
        );
    }

    #[test]
    fn from_falls_back() {
        let empty = mail(&[]);
        let headers = HeaderFrom::new(AddressMode::Headers, "d@example.com");
        assert_eq!(headers.resolve(&empty).unwrap().addr_spec(), "d@example.com");

        let with_header = mail(&[("From", "Jane Doe <jane@example.com>")]);
        let default = HeaderFrom::new(AddressMode::Default, "");
        let from = default.resolve(&with_header).unwrap();
        assert_eq!(from.addr_spec(), "jane@example.com");
        assert_eq!(from.display_name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn from_missing_everywhere_is_a_validation_error() {
        let err = HeaderFrom::new(AddressMode::Headers, "")
            .resolve(&mail(&[]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MailValidation);
        assert_eq!(
            err.to_string(),
            "Mail validation failed: no From address in headers or configuration"
        );
    }

    #[test]
    fn from_unparseable_is_a_validation_error() {
        let err = HeaderFrom::new(AddressMode::Headers, "")
            .resolve(&mail(&[("From", "not an address")]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Address { field: "From", .. }));
        assert_eq!(err.kind(), ErrorKind::MailValidation);
    }

    #[test]
    fn to_lists() {
        let to = HeaderTo::default()
            .resolve(&mail(&[("To", "a@example.com, B <b@example.org>")]))
            .unwrap();
        let recipients: Vec<String> = to.iter().map(Address::addr_spec).collect();
        assert_eq!(recipients, vec!["a@example.com", "b@example.org"]);
    }

    #[test]
    fn message_id_modes() {
        let with_header = mail(&[("Message-ID", "<id@example.com>")]);

        let headers = HeaderMessageId::new(MessageIdMode::Headers, "");
        assert_eq!(headers.resolve(&with_header), b"<id@example.com>");
        assert_eq!(headers.resolve(&mail(&[])).len(), 16);

        let default = HeaderMessageId::new(MessageIdMode::Default, "<fixed@example.com>");
        assert_eq!(default.resolve(&with_header), b"<fixed@example.com>");
        assert_eq!(HeaderMessageId::new(MessageIdMode::Default, "").resolve(&with_header).len(), 16);

        let uuid = HeaderMessageId::new(MessageIdMode::Uuid, "").resolve(&with_header);
        let parsed = uuid::Uuid::from_slice(&uuid).unwrap();
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }
}
