//! Strict mailbox parser for header and envelope addresses.
//!
//! Accepted forms:
//!
//! ```text
//! addr-spec      = Local-part "@" Domain
//! angle-addr     = "<" addr-spec ">"
//! name-addr      = [display-name] angle-addr
//!
//! Local-part     = Dot-string / Quoted-string
//! Dot-string     = Atom *("." Atom)
//! Domain         = sub-domain *("." sub-domain) / address-literal
//! sub-domain     = Let-dig [Ldh-str]          ; U-labels allowed (RFC 6531)
//! ```
//!
//! Limits follow RFC 5321 section 4.5.3.1: 64 octets of local-part and 255
//! octets of domain.

use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AddressError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,
    #[error("Local-part exceeds 64 octets")]
    LocalPartTooLong,
    #[error("Domain exceeds 255 octets")]
    DomainTooLong,
    #[error("Missing closing angle bracket '>'")]
    MissingCloseBracket,
    #[error("Missing '@' separator in mailbox")]
    MissingAtSign,
    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
    #[error("Invalid address literal: {0}")]
    InvalidAddressLiteral(String),
    #[error("Unclosed quoted string")]
    UnclosedQuotedString,
    #[error("Invalid quoted string: {0}")]
    InvalidQuotedString(String),
    #[error("Unexpected trailing input: {0}")]
    TrailingInput(String),
}

/// A parsed `local-part@domain` with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Mailbox {
    pub display_name: Option<String>,
    pub local_part: String,
    pub domain: String,
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

/// Parse a single header address: `user@host`, `<user@host>` or
/// `Display Name <user@host>`.
pub fn parse_address(input: &str) -> Result<Mailbox> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }

    match find_unquoted(trimmed, '<') {
        Some(open) => {
            let rest = &trimmed[open + 1..];
            let close = find_unquoted(rest, '>').ok_or(AddressError::MissingCloseBracket)?;

            let trailing = rest[close + 1..].trim();
            if !trailing.is_empty() {
                return Err(AddressError::TrailingInput(trailing.to_string()));
            }

            let mut mailbox = parse_addr_spec(&rest[..close])?;
            mailbox.display_name = parse_display_name(&trimmed[..open]);
            Ok(mailbox)
        }
        None => parse_addr_spec(trimmed),
    }
}

/// Split a header value on commas that are outside quotes and angle brackets,
/// then parse every element.
pub fn parse_address_list(input: &str) -> Result<Vec<Mailbox>> {
    let mut mailboxes = Vec::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, ch) in input.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                push_element(&input[start..i], &mut mailboxes)?;
                start = i + 1;
            }
            _ => {}
        }
    }
    push_element(&input[start..], &mut mailboxes)?;

    if mailboxes.is_empty() {
        return Err(AddressError::Empty);
    }

    Ok(mailboxes)
}

fn push_element(element: &str, mailboxes: &mut Vec<Mailbox>) -> Result<()> {
    if !element.trim().is_empty() {
        mailboxes.push(parse_address(element)?);
    }
    Ok(())
}

fn parse_display_name(input: &str) -> Option<String> {
    let name = input.trim();
    if name.is_empty() {
        return None;
    }

    let unquoted = name
        .strip_prefix('"')
        .and_then(|n| n.strip_suffix('"'))
        .map_or_else(|| name.to_string(), |n| n.replace("\\\"", "\""));

    Some(unquoted)
}

/// Parse a bare `local-part@domain`.
pub fn parse_addr_spec(input: &str) -> Result<Mailbox> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AddressError::Empty);
    }

    let at_pos = find_unquoted_at(input)?;
    let local_part = &input[..at_pos];
    let domain = &input[at_pos + 1..];

    if local_part.len() > 64 {
        return Err(AddressError::LocalPartTooLong);
    }
    if domain.len() > 255 {
        return Err(AddressError::DomainTooLong);
    }

    Ok(Mailbox {
        display_name: None,
        local_part: parse_local_part(local_part)?,
        domain: parse_domain_or_address_literal(domain)?,
    })
}

fn find_unquoted(input: &str, target: char) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, ch) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' && in_quotes {
            escaped = true;
        } else if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch == target && !in_quotes {
            return Some(i);
        }
    }

    None
}

/// The last `@` outside quotes and brackets separates local-part and domain.
fn find_unquoted_at(input: &str) -> Result<usize> {
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut escaped = false;
    let mut at = None;

    for (i, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' if !in_brackets => in_quotes = !in_quotes,
            '[' if !in_quotes => in_brackets = true,
            ']' if !in_quotes => in_brackets = false,
            '@' if !in_quotes && !in_brackets => at = Some(i),
            _ => {}
        }
    }

    at.ok_or(AddressError::MissingAtSign)
}

fn parse_local_part(input: &str) -> Result<String> {
    if input.is_empty() {
        return Err(AddressError::InvalidLocalPart(
            "Empty local-part".to_string(),
        ));
    }

    if input.starts_with('"') {
        parse_quoted_string(input)
    } else {
        parse_dot_string(input)
    }
}

fn parse_dot_string(input: &str) -> Result<String> {
    if input.starts_with('.') || input.ends_with('.') {
        return Err(AddressError::InvalidLocalPart(
            "Dot-string cannot start or end with '.'".to_string(),
        ));
    }

    for atom in input.split('.') {
        if atom.is_empty() {
            return Err(AddressError::InvalidLocalPart(
                "Dot-string cannot contain consecutive dots".to_string(),
            ));
        }

        if let Some(ch) = atom.chars().find(|&ch| !is_atext(ch)) {
            return Err(AddressError::InvalidLocalPart(format!(
                "Invalid character '{ch}' in atom"
            )));
        }
    }

    Ok(input.to_string())
}

fn parse_quoted_string(input: &str) -> Result<String> {
    if input.len() < 2 || !input.ends_with('"') {
        return Err(AddressError::UnclosedQuotedString);
    }

    let mut chars = input[1..input.len() - 1].chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(next) if next.is_ascii_graphic() || next == ' ' => {}
                Some(next) => {
                    return Err(AddressError::InvalidQuotedString(format!(
                        "Invalid quoted-pair: \\{next}"
                    )));
                }
                None => {
                    return Err(AddressError::InvalidQuotedString(
                        "Backslash at end of quoted string".to_string(),
                    ));
                }
            }
        } else if !is_qtext(ch) {
            return Err(AddressError::InvalidQuotedString(format!(
                "Invalid character '{ch}' in quoted string"
            )));
        }
    }

    Ok(input.to_string())
}

fn parse_domain_or_address_literal(input: &str) -> Result<String> {
    if input.starts_with('[') {
        parse_address_literal(input)
    } else {
        parse_domain(input)
    }
}

fn parse_domain(input: &str) -> Result<String> {
    if input.is_empty() {
        return Err(AddressError::InvalidDomain("Empty domain".to_string()));
    }

    if input.starts_with('.') || input.ends_with('.') {
        return Err(AddressError::InvalidDomain(
            "Domain cannot start or end with '.'".to_string(),
        ));
    }

    for label in input.split('.') {
        parse_label(label)?;
    }

    Ok(input.to_string())
}

fn parse_label(label: &str) -> Result<()> {
    let is_let_dig = |ch: char| ch.is_alphanumeric();

    match (label.chars().next(), label.chars().last()) {
        (None, _) | (_, None) => Err(AddressError::InvalidDomain(
            "Domain cannot contain consecutive dots".to_string(),
        )),
        (Some(first), _) if !is_let_dig(first) => Err(AddressError::InvalidDomain(format!(
            "Label must start with letter or digit, got '{first}'"
        ))),
        (_, Some(last)) if !is_let_dig(last) => Err(AddressError::InvalidDomain(format!(
            "Label must end with letter or digit, got '{last}'"
        ))),
        _ => label
            .chars()
            .find(|&ch| !is_let_dig(ch) && ch != '-')
            .map_or(Ok(()), |ch| {
                Err(AddressError::InvalidDomain(format!(
                    "Invalid character '{ch}' in label"
                )))
            }),
    }
}

fn parse_address_literal(input: &str) -> Result<String> {
    let Some(content) = input.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
        return Err(AddressError::InvalidAddressLiteral(
            "Address literal must be enclosed in brackets".to_string(),
        ));
    };

    let valid = content.parse::<Ipv4Addr>().is_ok()
        || content
            .strip_prefix("IPv6:")
            .is_some_and(|v6| v6.parse::<Ipv6Addr>().is_ok())
        || content
            .split_once(':')
            .is_some_and(|(tag, value)| !tag.is_empty() && !value.is_empty());

    if valid {
        Ok(input.to_string())
    } else {
        Err(AddressError::InvalidAddressLiteral(content.to_string()))
    }
}

/// `atext` from RFC 5322, widened to non-ASCII per RFC 6531.
const fn is_atext(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || !ch.is_ascii()
        || matches!(
            ch,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
}

/// Printable ASCII except backslash and quote, plus non-ASCII.
const fn is_qtext(ch: char) -> bool {
    !ch.is_ascii() || matches!(ch as u8, 32..=33 | 35..=91 | 93..=126)
}
