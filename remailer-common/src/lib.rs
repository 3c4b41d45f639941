//! Types shared by every remailer crate.
//!
//! - [`address`]: strict mailbox parsing and rendering
//! - [`mail`]: the in-flight message assembled by the pipeline
//! - [`status`]: per spool file lifecycle status
//! - [`error`]: the error kind taxonomy every crate error maps onto
//! - [`logging`]: log macros and subscriber setup

pub mod address;
pub mod address_parser;
pub mod error;
pub mod logging;
pub mod mail;
pub mod status;

pub use address::{Address, AddressList};
pub use error::ErrorKind;
pub use mail::Mail;
pub use status::FileStatus;
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
