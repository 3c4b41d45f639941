//! Header and body canonicalization (RFC 6376 section 3.4).

const fn is_wsp(byte: u8) -> bool {
    byte == b' ' || byte == b'\t'
}

/// Canonicalize one header field, including the trailing CRLF.
pub fn header(name: &str, value: &[u8], relaxed: bool) -> Vec<u8> {
    if !relaxed {
        let mut out = Vec::with_capacity(name.len() + value.len() + 4);
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value);
        out.extend_from_slice(b"\r\n");
        return out;
    }

    let mut out = name.trim().to_ascii_lowercase().into_bytes();
    out.push(b':');

    let mut value_started = false;
    let mut pending_space = false;
    for &byte in value {
        match byte {
            b'\r' | b'\n' => {}
            byte if is_wsp(byte) => pending_space = value_started,
            byte => {
                if pending_space {
                    out.push(b' ');
                }
                pending_space = false;
                value_started = true;
                out.push(byte);
            }
        }
    }

    out.extend_from_slice(b"\r\n");
    out
}

/// Canonicalize a message body.
pub fn body(body: &[u8], relaxed: bool) -> Vec<u8> {
    let mut lines: Vec<Vec<u8>> = split_lines(body)
        .into_iter()
        .map(|line| if relaxed { relax_line(line) } else { line.to_vec() })
        .collect();

    while lines.last().is_some_and(Vec::is_empty) {
        lines.pop();
    }

    if lines.is_empty() {
        return if relaxed { Vec::new() } else { b"\r\n".to_vec() };
    }

    let mut out = Vec::with_capacity(body.len() + 2);
    for line in lines {
        out.extend_from_slice(&line);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Split on CRLF or a bare LF. A final line without a terminator is kept.
fn split_lines(body: &[u8]) -> Vec<&[u8]> {
    if body.is_empty() {
        return Vec::new();
    }

    body.strip_suffix(b"\n")
        .unwrap_or(body)
        .split(|&byte| byte == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect()
}

fn relax_line(line: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len());
    let mut pending_space = false;

    for &byte in line {
        if is_wsp(byte) {
            pending_space = true;
        } else {
            if pending_space {
                out.push(b' ');
            }
            pending_space = false;
            out.push(byte);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn relaxed_header() {
        assert_eq!(
            header("Subject ", b"  Hello \t  World  ", true),
            b"subject:Hello World\r\n"
        );
        assert_eq!(
            header("X-Folded", b"first\r\n\tsecond", true),
            b"x-folded:first second\r\n"
        );
    }

    #[test]
    fn relaxed_header_keeps_spaces_after_inner_colons() {
        assert_eq!(header("Subject", b"Re: hello", true), b"subject:Re: hello\r\n");
        assert_eq!(
            header("Subject", b" Re:  Fwd:\tnews ", true),
            b"subject:Re: Fwd: news\r\n"
        );
    }

    #[test]
    fn relaxed_header_rfc6376_example() {
        // RFC 6376 section 3.4.6: "A: X" and "B : Y\t\r\n\tZ  ".
        let mut out = header("A", b" X", true);
        out.extend(header("B ", b" Y\t\r\n\tZ  ", true));
        assert_eq!(out, b"a:X\r\nb:Y Z\r\n");
    }

    #[test]
    fn simple_header() {
        assert_eq!(
            header("Subject", b"Hello  World", false),
            b"Subject: Hello  World\r\n"
        );
    }

    #[test]
    fn simple_body() {
        assert_eq!(body(b"", false), b"\r\n");
        assert_eq!(body(b"\r\n\r\n", false), b"\r\n");
        assert_eq!(body(b"Hi \r\n\r\n\r\n", false), b"Hi \r\n");
        assert_eq!(body(b"Hi", false), b"Hi\r\n");
    }

    #[test]
    fn relaxed_body() {
        assert_eq!(body(b"", true), b"");
        assert_eq!(body(b" \r\n\t\r\n", true), b"");
        assert_eq!(
            body(b" C \r\nD \t E\r\n\r\n\r\n", true),
            b" C\r\nD E\r\n"
        );
    }

    #[test]
    fn bare_line_feeds_are_normalised() {
        assert_eq!(body(b"a\nb\n", false), b"a\r\nb\r\n");
    }
}
