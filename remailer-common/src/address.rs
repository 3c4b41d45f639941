use std::{
    fmt::{self, Debug, Display},
    ops::{Deref, DerefMut},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::address_parser::{self, AddressError, Mailbox};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address(pub Mailbox);

impl Address {
    /// Parse a header address, accepting the `Name <user@host>` form.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        address_parser::parse_address(input).map(Self)
    }

    /// `local-part@domain` without any display name, as used in the envelope.
    pub fn addr_spec(&self) -> String {
        self.0.to_string()
    }

    /// The domain in A-label form, falling back to lowercase when IDNA
    /// conversion is not possible (address literals).
    pub fn domain_ascii(&self) -> String {
        idna::domain_to_ascii(&self.0.domain).unwrap_or_else(|_| self.0.domain.to_lowercase())
    }

    /// Rendering for a header field: the display name is kept when present.
    pub fn header_value(&self) -> String {
        match &self.0.display_name {
            Some(name) if needs_quoting(name) => {
                format!("\"{}\" <{}>", name.replace('"', "\\\""), self.0)
            }
            Some(name) => format!("{name} <{}>", self.0),
            None => self.0.to_string(),
        }
    }
}

fn needs_quoting(name: &str) -> bool {
    name.chars()
        .any(|ch| matches!(ch, ',' | '"' | '<' | '>' | '@' | ':' | ';' | '(' | ')' | '.'))
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.0.local_part, self.0.domain)
    }
}

impl From<Mailbox> for Address {
    fn from(value: Mailbox) -> Self {
        Self(value)
    }
}

impl Deref for Address {
    type Target = Mailbox;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Address {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressList(pub Vec<Address>);

impl AddressList {
    /// Parse a comma separated header value.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        address_parser::parse_address_list(input)
            .map(|mailboxes| Self(mailboxes.into_iter().map(Address).collect()))
    }

    /// Comma-joined header rendering.
    pub fn header_value(&self) -> String {
        self.iter()
            .map(Address::header_value)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Display for AddressList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, addr) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            Display::fmt(addr, f)?;
        }
        Ok(())
    }
}

impl From<Vec<Address>> for AddressList {
    fn from(value: Vec<Address>) -> Self {
        Self(value)
    }
}

impl Deref for AddressList {
    type Target = Vec<Address>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for AddressList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
