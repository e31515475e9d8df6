/// Whether a raw tracer line describes a syscall or a lifecycle/signal notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Syscall,
    Notice,
}

/// A syscall line split around its quoted argument.
///
/// `leading` and `trailing` are decoded text, `payload` stays in the tracer's
/// escaped byte form until the single unescape pass in [`crate::http`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyscallRecord {
    pub leading: String,
    pub payload: Vec<u8>,
    pub trailing: String,
}

/// Handling path chosen for a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Http,
    RawMultiBuffer,
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartLine {
    Request {
        method: String,
        url: String,
        version: String,
    },
    Status {
        version: String,
        code: String,
        reason: String,
    },
    Raw {
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub key: String,
    pub value: String,
}

/// A decomposed HTTP message. Headers keep their order and duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpMessage {
    pub start_line: StartLine,
    pub headers: Vec<Header>,
    pub body: Vec<String>,
}
