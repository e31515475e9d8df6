use crate::error::TraceError;
use crate::types::{LineKind, SyscallRecord};

/// Classify a raw tracer line: `name(arg, ...` is a syscall, anything else
/// (`+++ exited with 0 +++`, `--- SIGTERM ... ---`) is a notice.
pub fn classify_line(line: &[u8]) -> LineKind {
    // Only the text before the first quote counts, quoted data can contain anything
    let head = match line.iter().position(|&b| b == b'"') {
        Some(pos) => &line[..pos],
        None => line,
    };

    let paren = head.iter().position(|&b| b == b'(');
    let comma = head.iter().position(|&b| b == b',');

    match (paren, comma) {
        (Some(p), Some(c)) if p < c => LineKind::Syscall,
        (Some(_), None) => LineKind::Syscall,
        _ => LineKind::Notice,
    }
}

/// Split a syscall line around its quoted argument.
///
/// Returns `Ok(None)` when the line holds fewer than two quotes, e.g.
/// `close(3) = 0`; such lines are shown as notices.
pub fn parse_record(line: &[u8]) -> Result<Option<SyscallRecord>, TraceError> {
    let Some(first) = line.iter().position(|&b| b == b'"') else {
        return Ok(None);
    };
    let Some(last) = line.iter().rposition(|&b| b == b'"') else {
        return Ok(None);
    };
    if first == last {
        return Ok(None);
    }

    let leading = decode_text(&line[..first], "leading")?;
    let trailing = decode_text(&line[last + 1..], "trailing")?;

    // Raw bytes, escapes intact
    let payload = line[first + 1..last].trim_ascii().to_vec();

    Ok(Some(SyscallRecord {
        leading,
        payload,
        trailing,
    }))
}

fn decode_text(bytes: &[u8], part: &str) -> Result<String, TraceError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(e) => {
            log::warn!(
                "{} text of syscall line is not UTF-8 ({}): {}",
                part,
                e,
                String::from_utf8_lossy(bytes)
            );
            Err(TraceError::decode(format!("{part} text is not UTF-8: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_write_is_syscall() {
        let line = br#"write(3, "GET / HTTP/1.1\r\n\r\n", 18) = 18"#;
        assert_eq!(classify_line(line), LineKind::Syscall);
    }

    #[test]
    fn test_classify_exit_notice() {
        assert_eq!(classify_line(b"+++ exited with 0 +++"), LineKind::Notice);
    }

    #[test]
    fn test_classify_signal_notice() {
        let line = b"--- SIGTERM {si_signo=SIGTERM, si_code=SI_USER, si_pid=1, si_uid=0} ---";
        assert_eq!(classify_line(line), LineKind::Notice);
    }

    #[test]
    fn test_classify_ignores_parens_inside_payload() {
        let line = br#"note, see "f(x)" here"#;
        assert_eq!(
            classify_line(line),
            LineKind::Notice,
            "Comma before any paren outside the quotes"
        );
    }

    #[test]
    fn test_classify_pid_prefixed_line() {
        let line = br#"[pid  4242] read(5, "HTTP/1.1 204 No Content\r\n\r\n", 4096) = 27"#;
        assert_eq!(classify_line(line), LineKind::Syscall);
    }

    #[test]
    fn test_parse_record_splits_three_parts() {
        let line = br#"write(3, "GET /x HTTP/1.1\r\nHost: a\r\n\r\n", 28) = 28"#;
        let record = parse_record(line)
            .expect("Should decode")
            .expect("Should find quotes");

        assert_eq!(record.leading, "write(3, ");
        assert_eq!(record.payload, br"GET /x HTTP/1.1\r\nHost: a\r\n\r\n".to_vec());
        assert_eq!(record.trailing, ", 28) = 28");
    }

    #[test]
    fn test_parse_record_keeps_escaped_quotes_in_payload() {
        let line = br#"read(4, "{\"ok\": true}", 64) = 12"#;
        let record = parse_record(line).unwrap().unwrap();

        assert_eq!(record.payload, br#"{\"ok\": true}"#.to_vec());
        assert_eq!(record.trailing, ", 64) = 12");
    }

    #[test]
    fn test_parse_record_trims_payload_whitespace() {
        let line = br#"write(1, "  hello  ", 9) = 9"#;
        let record = parse_record(line).unwrap().unwrap();
        assert_eq!(record.payload, b"hello".to_vec());
    }

    #[test]
    fn test_parse_record_truncated_payload() {
        let line = br#"read(3, "HTTP/1.1 200 OK\r\nServer: x"..., 4096) = 2048"#;
        let record = parse_record(line).unwrap().unwrap();

        assert_eq!(record.payload, br"HTTP/1.1 200 OK\r\nServer: x".to_vec());
        assert_eq!(record.trailing, "..., 4096) = 2048");
    }

    #[test]
    fn test_parse_record_without_quotes_is_none() {
        let result = parse_record(b"close(3)                                = 0");
        assert!(result.unwrap().is_none(), "No quoted argument to split");
    }

    #[test]
    fn test_parse_record_single_quote_is_none() {
        let result = parse_record(br#"write(3, "abc"#);
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_parse_record_invalid_leading_text() {
        let mut line = b"write(\xff, ".to_vec();
        line.extend_from_slice(br#""data", 4) = 4"#);

        let err = parse_record(&line).expect_err("Leading text is not UTF-8");
        assert!(matches!(err, TraceError::DecodeFailure { .. }));
    }

    #[test]
    fn test_parse_record_payload_may_hold_raw_bytes() {
        let mut line = b"read(3, \"".to_vec();
        line.extend_from_slice(b"\xfe\xff");
        line.extend_from_slice(b"\", 2) = 2");

        let record = parse_record(&line).unwrap().unwrap();
        assert_eq!(record.payload, vec![0xfe, 0xff]);
    }
}
