use crate::types::Route;

/// Escaped CRLF as it appears in tracer output
const ESCAPED_CRLF: &[u8] = br"\r\n";
/// Separator between concatenated buffers in multi-buffer dumps
const BUFFER_SEPARATOR: &[u8] = br"\0";
const HTTP_MARKER: &[u8] = b"HTTP/";

/// Longest opaque preview, in bytes
pub const OPAQUE_PREVIEW_BYTES: usize = 256;

/// Choose how a payload is handled. Exactly one route applies.
pub fn route_payload(payload: &[u8]) -> Route {
    let first_line = match find(payload, ESCAPED_CRLF) {
        Some(pos) => &payload[..pos],
        None => payload,
    };

    let route = if find(first_line, HTTP_MARKER).is_some() {
        Route::Http
    } else if payload.first() == Some(&b'\\') {
        Route::RawMultiBuffer
    } else {
        Route::Opaque
    };

    log::debug!("routed {} byte payload to {:?}", payload.len(), route);
    route
}

/// Split a multi-buffer dump on every literal `\0` marker.
pub fn split_buffers(payload: &[u8]) -> Vec<&[u8]> {
    let mut chunks = Vec::new();
    let mut rest = payload;

    while let Some(pos) = find(rest, BUFFER_SEPARATOR) {
        chunks.push(&rest[..pos]);
        rest = &rest[pos + BUFFER_SEPARATOR.len()..];
    }
    chunks.push(rest);

    chunks
}

/// Leading bytes of an opaque payload, decoded lossily
pub fn opaque_preview(payload: &[u8]) -> String {
    let end = payload.len().min(OPAQUE_PREVIEW_BYTES);
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
