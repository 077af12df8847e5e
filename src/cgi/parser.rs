//! Incremental parser for CGI script output.
//!
//! Output is buffered only until the header/body separator (`CRLF CRLF` or
//! `LF LF`, whichever comes first). Everything after it is body and is handed
//! back untouched.

use axum::http::StatusCode;

/// Parsed CGI response head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgiHead {
    pub status: StatusCode,
    /// Headers to forward, in script order. `Status` is never included.
    pub headers: Vec<(String, String)>,
}

/// Parser state: still collecting the head, or done.
#[derive(Debug, Default)]
pub struct CgiOutputParser {
    buf: Vec<u8>,
    complete: bool,
}

impl CgiOutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the head has been returned; later output is all body.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Bytes buffered while waiting for the separator.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Feed a chunk of output. Returns the head and the body bytes that
    /// followed the separator once the separator has been seen.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<(CgiHead, Vec<u8>)> {
        if self.complete {
            return None;
        }
        // A separator may straddle chunks; rescan a few bytes back
        let scan_from = self.buf.len().saturating_sub(3);
        self.buf.extend_from_slice(chunk);

        let (idx, sep_len) = find_separator(&self.buf, scan_from)?;
        let body = self.buf.split_off(idx + sep_len);
        self.buf.truncate(idx);
        let head = parse_head(&self.buf);
        self.buf.clear();
        self.complete = true;
        Some((head, body))
    }
}

/// Earliest header/body separator at or after `from`: `(index, length)`.
fn find_separator(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let crlf = find(buf, b"\r\n\r\n", from).map(|i| (i, 4));
    let lf = find(buf, b"\n\n", from).map(|i| (i, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// Parse the header block. `Status` sets the code (200 when missing or not
/// numeric); lines without a colon are ignored.
pub fn parse_head(raw: &[u8]) -> CgiHead {
    let text = String::from_utf8_lossy(raw);
    let mut status = StatusCode::OK;
    let mut headers = Vec::new();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("status") {
            status = value
                .split_whitespace()
                .next()
                .and_then(|code| code.parse::<u16>().ok())
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::OK);
            continue;
        }
        if !name.is_empty() {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    CgiHead { status, headers }
}
