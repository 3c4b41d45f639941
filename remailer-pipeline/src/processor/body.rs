use remailer_common::{Mail, mail::HeaderMap};

use super::Processor;
use crate::{PipelineError, Result, crlf, stage::Stage};

/// Normalises every line ending of the body to CRLF.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixDos;

impl UnixDos {
    pub const NAME: &'static str = "unixdos";
}

impl Stage for UnixDos {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}

impl Processor for UnixDos {
    fn process(&self, mail: &mut Mail) -> Result<()> {
        mail.body = crlf(&mail.body);
        Ok(())
    }
}

/// Splits a header block written at the top of the body file into
/// `mail.body_headers`.
///
/// MIME multipart bodies, which start with a `--` boundary line, are left
/// exactly as read.
#[derive(Debug, Default, Clone, Copy)]
pub struct Body;

impl Body {
    pub const NAME: &'static str = "body";
}

impl Stage for Body {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}

impl Processor for Body {
    fn process(&self, mail: &mut Mail) -> Result<()> {
        let trimmed = mail.body.trim_ascii();
        if trimmed.starts_with(b"--") {
            return Ok(());
        }

        let first_line = trimmed
            .split(|&byte| byte == b'\n')
            .next()
            .unwrap_or_default();

        let split = if looks_like_field(first_line) {
            find(trimmed, b"\r\n\r\n")
        } else {
            None
        };

        let body = match split {
            Some(end) => {
                mail.body_headers = parse_block(&trimmed[..end])?;
                trimmed[end + 4..].to_vec()
            }
            None => trimmed.to_vec(),
        };

        mail.body = body;
        Ok(())
    }
}

/// `true` when `line` starts with a field name directly followed by `:`.
fn looks_like_field(line: &[u8]) -> bool {
    line.iter()
        .position(|&byte| byte == b':')
        .is_some_and(|colon| colon > 0 && line[..colon].iter().all(|&b| is_field_char(b)))
}

const fn is_field_char(byte: u8) -> bool {
    byte.is_ascii_graphic() && byte != b':'
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_block(block: &[u8]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let mut last: Option<String> = None;

    for line in block.split(|&byte| byte == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        if line[0] == b' ' || line[0] == b'\t' {
            let Some(name) = &last else {
                return Err(malformed(line));
            };
            headers.append(name, line.trim_ascii_end());
            continue;
        }

        let (name, value) = match find(line, b": ") {
            Some(at) => (&line[..at], &line[at + 2..]),
            None => match line.strip_suffix(b":") {
                Some(name) => (name, &b""[..]),
                None => return Err(malformed(line)),
            },
        };

        if name.is_empty() || !name.iter().all(|&byte| is_field_char(byte)) {
            return Err(malformed(line));
        }

        let name = String::from_utf8_lossy(name).into_owned();
        headers.insert(name.clone(), value.trim_ascii());
        last = Some(name);
    }

    Ok(headers)
}

fn malformed(line: &[u8]) -> PipelineError {
    PipelineError::MailProcessing(format!(
        "malformed body header line: {}",
        String::from_utf8_lossy(line)
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use remailer_common::ErrorKind;

    use super::*;

    fn run(processor: &dyn Processor, body: &[u8]) -> Result<Mail> {
        let mut mail = Mail::new("001");
        mail.body = body.to_vec();
        processor.process(&mut mail)?;
        Ok(mail)
    }

    #[test]
    fn unixdos_leaves_no_bare_newline() {
        let mail = run(&UnixDos, b"one\ntwo\r\nthree\n\nfour").unwrap();
        assert_eq!(mail.body, b"one\r\ntwo\r\nthree\r\n\r\nfour");
    }

    #[test]
    fn plain_body_is_trimmed() {
        let mail = run(&Body, b"\r\n  Hello there.\r\nBye\r\n\r\n").unwrap();
        assert_eq!(mail.body, b"Hello there.\r\nBye");
        assert!(mail.body_headers.is_empty());
    }

    #[test]
    fn multipart_body_is_verbatim() {
        let raw = b"--boundary\r\nContent-Type: text/plain\r\n\r\nhi\r\n--boundary--\r\n";
        let mail = run(&Body, raw).unwrap();
        assert_eq!(mail.body, raw);
        assert!(mail.body_headers.is_empty());
    }

    #[test]
    fn leading_header_block_is_split_off() {
        let mail = run(
            &Body,
            b"X-Campaign: spring\r\nX-Long: first\r\n\tsecond\r\n\r\nHello\r\n",
        )
        .unwrap();

        assert_eq!(mail.body, b"Hello");
        assert_eq!(mail.body_headers.get("X-Campaign"), Some(&b"spring"[..]));
        assert_eq!(mail.body_headers.get("X-Long"), Some(&b"first\tsecond"[..]));
    }

    #[test]
    fn colon_in_prose_is_not_a_header() {
        let mail = run(&Body, b"Dear customer: hello\r\n\r\nRegards").unwrap();
        assert_eq!(mail.body, b"Dear customer: hello\r\n\r\nRegards");
        assert!(mail.body_headers.is_empty());
    }

    #[test]
    fn malformed_header_line_fails() {
        let err = run(&Body, b"X-Good: yes\r\nnot a header\r\n\r\nbody").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MailProcessing);
    }
}
