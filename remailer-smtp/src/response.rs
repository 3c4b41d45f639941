//! SMTP reply parsing.

use std::fmt::{self, Display};

use crate::error::{ClientError, Result};

/// One line of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    /// `false` for `250-` continuation lines.
    pub is_last: bool,
    pub message: String,
}

/// A complete, possibly multi-line, reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// `true` for the 3xx replies that ask for more input, such as 354.
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    #[must_use]
    pub const fn is_temporary_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// Whether an EHLO reply advertises `keyword`. The first line is the
    /// server's greeting and is never a keyword.
    #[must_use]
    pub fn has_extension(&self, keyword: &str) -> bool {
        self.lines.iter().skip(1).any(|line| {
            line.split_ascii_whitespace()
                .next()
                .is_some_and(|word| word.eq_ignore_ascii_case(keyword))
        })
    }

    /// Parse a single reply line without its line ending.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Parse` if the line does not start with a three
    /// digit code followed by a space, a dash or nothing.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let code = line
            .get(..3)
            .filter(|code| code.bytes().all(|byte| byte.is_ascii_digit()))
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| ClientError::Parse(format!("Invalid status code in '{line}'")))?;

        let is_last = match line.as_bytes().get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(other) => {
                return Err(ClientError::Parse(format!(
                    "Invalid separator '{}' in '{line}'",
                    char::from(*other)
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            message: line.get(4..).unwrap_or_default().to_string(),
        })
    }

    /// Parse one complete reply from the front of `buffer`.
    ///
    /// Returns the reply and the number of bytes it used, or `None` when the
    /// final line has not arrived yet.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Parse` for malformed lines, or when the lines of
    /// a multi-line reply disagree on the code.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(end) = buffer[consumed..].iter().position(|&byte| byte == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let line = Self::parse_line(&String::from_utf8_lossy(raw))?;
            match code {
                None => code = Some(line.code),
                Some(expected) if expected != line.code => {
                    return Err(ClientError::Parse(format!(
                        "Status code mismatch in multi-line response: expected {expected}, got {}",
                        line.code
                    )));
                }
                Some(_) => {}
            }

            lines.push(line.message);
            if line.is_last {
                return Ok(Some((Self::new(line.code, lines), consumed)));
            }
        }

        Ok(None)
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.lines.join(" "))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn single_line() {
        assert_eq!(
            Response::parse_line("220 mx.example.com ESMTP").unwrap(),
            ResponseLine {
                code: 220,
                is_last: true,
                message: "mx.example.com ESMTP".to_string(),
            }
        );
        assert!(Response::parse_line("250").unwrap().is_last);
    }

    #[test]
    fn bad_lines() {
        assert!(Response::parse_line("2x0 nope").is_err());
        assert!(Response::parse_line("25").is_err());
        assert!(Response::parse_line("250+odd").is_err());
    }

    #[test]
    fn multi_line_ehlo() {
        let data = b"250-mx.example.com\r\n250-SIZE 10000000\r\n250-STARTTLS\r\n250 HELP\r\n";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();

        assert_eq!(response.code, 250);
        assert_eq!(
            response.lines,
            vec!["mx.example.com", "SIZE 10000000", "STARTTLS", "HELP"]
        );
        assert_eq!(consumed, data.len());
        assert!(response.has_extension("starttls"));
        assert!(!response.has_extension("mx.example.com"));
    }

    #[test]
    fn incomplete_and_pipelined() {
        assert!(
            Response::parse_response(b"250-mx.example.com\r\n250-SIZE")
                .unwrap()
                .is_none()
        );

        let data = b"250 OK\r\n354 Go ahead\r\n";
        let (first, consumed) = Response::parse_response(data).unwrap().unwrap();
        assert_eq!(first.code, 250);
        assert_eq!(consumed, 8);

        let (second, _) = Response::parse_response(&data[consumed..]).unwrap().unwrap();
        assert!(second.is_intermediate());
    }

    #[test]
    fn mismatched_codes() {
        assert!(Response::parse_response(b"250-a\r\n251 b\r\n").is_err());
    }

    #[test]
    fn classification_and_display() {
        let rejected = Response::new(550, vec!["No such user".to_string()]);
        assert!(rejected.is_permanent_error());
        assert!(!rejected.is_success());
        assert_eq!(rejected.to_string(), "550 No such user");

        assert!(Response::new(451, vec![]).is_temporary_error());
    }
}
