//! Outbound SMTP client used by the remailer sender.
//!
//! [`SmtpClient`] speaks the client side of RFC 5321 over any async stream,
//! so the same code serves direct connections and SOCKS5 tunnels, and can
//! upgrade a plain connection with STARTTLS.

pub mod client;
pub mod error;
pub mod response;

pub use client::{BoxStream, SmtpClient, Stream};
pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};

/// Double every `.` that starts a line (RFC 5321 §4.5.2).
pub fn dot_stuff(data: &[u8]) -> Vec<u8> {
    let mut stuffed = Vec::with_capacity(data.len() + 16);
    let mut line_start = true;

    for &byte in data {
        if line_start && byte == b'.' {
            stuffed.push(b'.');
        }
        stuffed.push(byte);
        line_start = byte == b'\n';
    }

    stuffed
}
