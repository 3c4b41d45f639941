//! The in-flight message.
//!
//! A [`Mail`] is created empty when a spool unit is claimed, filled in by the
//! transformer chain, rewritten by the processor chain, handed to the sender
//! and finally to the output sinks.

use std::collections::HashMap;

use uuid::Uuid;

use crate::address::{Address, AddressList};

/// Header name to raw value, preserving insertion order.
///
/// Names are compared case-sensitively as stored; inserting an existing name
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap(Vec<(String, Vec<u8>)>);

impl HeaderMap {
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name, value)),
        }
    }

    /// Add a field without replacing an existing one of the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_slice())
    }

    /// Append to the value of `name`, used for folded continuation lines.
    pub fn append(&mut self, name: &str, more: &[u8]) {
        if let Some((_, value)) = self.0.iter_mut().find(|(existing, _)| existing == name) {
            value.extend_from_slice(more);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Mail {
    /// Spool identifier of the unit this mail was built from.
    pub id: String,
    pub body: Vec<u8>,
    /// Control file headers plus anything else transformers record.
    pub metadata: HashMap<String, Vec<u8>>,
    /// Header fields of the control file, prefix removed, in file order.
    pub control_headers: HeaderMap,
    /// Header block found at the top of the body file, if any.
    pub body_headers: HeaderMap,
    pub from: Option<Address>,
    pub to: AddressList,
    pub subject: Vec<u8>,
    pub content_type: Vec<u8>,
    pub message_id: Vec<u8>,
    /// Headers to be serialised into [`Mail::headers`].
    pub headers_map: HeaderMap,
    /// Serialised header block, terminated by an empty line.
    pub headers: Vec<u8>,
    pub final_body: Vec<u8>,
    /// Every `DKIM-Signature` field added to [`Mail::headers`].
    pub dkim_headers: Vec<u8>,
}

impl Mail {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Envelope recipients as `local@domain` strings.
    pub fn recipients(&self) -> Vec<String> {
        self.to.iter().map(Address::addr_spec).collect()
    }

    /// A time ordered identifier as 16 raw bytes.
    pub fn generate_message_id() -> Vec<u8> {
        Uuid::now_v7().as_bytes().to_vec()
    }

    /// The Message-ID as it should appear in a header field.
    ///
    /// A raw 16 byte UUIDv7 is rendered as `<uuid@from-domain>`; any other
    /// value is used verbatim.
    pub fn message_id_header(&self) -> Vec<u8> {
        match Uuid::from_slice(&self.message_id) {
            Ok(uuid)
                if uuid.get_version() == Some(uuid::Version::SortRand)
                    && uuid.get_variant() == uuid::Variant::RFC4122 =>
            {
                let domain = self
                    .from
                    .as_ref()
                    .map_or_else(|| "localhost".to_string(), |from| from.domain.clone());
                format!("<{}@{domain}>", uuid.hyphenated()).into_bytes()
            }
            _ => self.message_id.clone(),
        }
    }
}
