//! Decomposition of HTTP payloads captured by the tracer.
//!
//! Payloads arrive in the tracer's escaped form (`\r\n`, `\x1b`, `\33`, ...).
//! [`unescape`] is the only place those escapes are interpreted; everything
//! upstream handles the payload as opaque bytes.

use crate::error::{ParseOutcome, TraceError};
use crate::types::{Header, HttpMessage, StartLine};

const METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "CONNECT", "OPTIONS", "TRACE",
];

/// Interpret backslash escapes into the bytes they stand for.
///
/// Handles `\r \n \t \v \f \\ \"`, `\xHH` and one to three digit octal.
/// Unknown escapes are kept verbatim.
pub fn unescape(raw: &[u8]) -> Result<Vec<u8>, TraceError> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let byte = raw[i];
        if byte != b'\\' {
            out.push(byte);
            i += 1;
            continue;
        }

        let Some(&escape) = raw.get(i + 1) else {
            return Err(TraceError::decode("dangling backslash at end of payload"));
        };
        i += 2;

        match escape {
            b'r' => out.push(b'\r'),
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            b'f' => out.push(0x0c),
            b'\\' => out.push(b'\\'),
            b'"' => out.push(b'"'),
            b'x' => {
                let value = raw
                    .get(i..i + 2)
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    .ok_or_else(|| TraceError::decode(format!("bad hex escape at byte {}", i - 2)))?;
                out.push(value);
                i += 2;
            }
            b'0'..=b'7' => {
                let start = i - 1;
                let mut end = i;
                while end < raw.len() && end - start < 3 && (b'0'..=b'7').contains(&raw[end]) {
                    end += 1;
                }
                let value = raw[start..end]
                    .iter()
                    .fold(0u32, |acc, digit| acc * 8 + u32::from(digit - b'0'));
                let value = u8::try_from(value).map_err(|_| {
                    TraceError::decode(format!("octal escape out of range at byte {}", start - 1))
                })?;
                out.push(value);
                i = end;
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
    }

    Ok(out)
}

/// Decompose an HTTP-routed payload into start line, headers and body.
///
/// The empty line separating headers from body is kept as the first body
/// element. Pure: the same payload always yields the same outcome.
pub fn decompose(payload: &[u8]) -> ParseOutcome {
    let decoded = unescape(payload).inspect_err(|e| {
        log::warn!("{}: {}", e, String::from_utf8_lossy(payload));
    })?;
    let text = String::from_utf8_lossy(&decoded);
    let lines: Vec<&str> = text.split("\r\n").collect();

    let start_line = classify_start_line(lines[0]);

    let (header_lines, body_lines) = match lines[1..].iter().position(|line| line.is_empty()) {
        Some(pos) => lines[1..].split_at(pos),
        None => (&lines[1..], &[][..]),
    };

    let mut headers = Vec::with_capacity(header_lines.len());
    for line in header_lines {
        let Some((key, value)) = line.split_once(": ") else {
            log::warn!(
                "header line {:?} has no \": \" delimiter, payload: {}",
                line,
                String::from_utf8_lossy(payload)
            );
            return Err(TraceError::MalformedHeader {
                line: line.to_string(),
            });
        };
        headers.push(Header {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    Ok(HttpMessage {
        start_line,
        headers,
        body: body_lines.iter().map(|line| line.to_string()).collect(),
    })
}

/// Classify the first line of a message. Never fails.
pub fn classify_start_line(line: &str) -> StartLine {
    let first_token = line.split(' ').next().unwrap_or_default();

    if METHODS.contains(&first_token) {
        let mut parts = line.splitn(3, ' ');
        return StartLine::Request {
            method: next_part(&mut parts),
            url: next_part(&mut parts),
            version: next_part(&mut parts),
        };
    }

    if line.split('/').next() == Some("HTTP") {
        let mut parts = line.splitn(3, ' ');
        return StartLine::Status {
            version: next_part(&mut parts),
            code: next_part(&mut parts),
            reason: next_part(&mut parts),
        };
    }

    StartLine::Raw {
        text: line.to_string(),
    }
}

fn next_part<'a>(parts: &mut impl Iterator<Item = &'a str>) -> String {
    parts.next().unwrap_or_default().to_string()
}
