//! Getting assembled mail to the recipients' mail exchangers.
//!
//! - [`dns`]: cached MX resolution
//! - [`dialer`]: direct or SOCKS5 connections and host selection
//! - [`session`]: one SMTP conversation per exchanger
//! - [`sender`]: per-domain fan-out producing per-recipient outcomes
//! - [`output`]: sinks that record those outcomes

pub mod dialer;
pub mod dns;
pub mod error;
pub mod output;
pub mod sender;
pub mod session;

use std::{collections::BTreeMap, sync::Arc};

pub use dialer::{DialError, DialMode, Dialer, DialerConfig, ProxyAuth, choose_host};
pub use dns::{DnsError, DnsResolver, HickoryLookup, MxAnswer, MxLookup, MxRecord};
pub use error::DeliveryError;
pub use output::{Output, OutputChain, OutputConfig, OutputError};
pub use remailer_smtp::Response;
pub use sender::Sender;
pub use session::{SmtpConfig, SmtpTimeouts};

/// Replies per recipient, in the order they were received.
pub type Responses = BTreeMap<String, Vec<Response>>;

/// The failure that stopped delivery to each recipient.
pub type Errors = BTreeMap<String, Arc<DeliveryError>>;
