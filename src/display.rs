//! Terminal rendering of records and messages.
//!
//! Every rendered piece is bounded by the terminal width queried once at
//! startup; colors come from an explicit [`Theme`].

use crate::error::TraceError;
use crate::router;
use crate::types::{Header, HttpMessage, StartLine, SyscallRecord};
use crossterm::style::{Color, Stylize, style};

pub const DEFAULT_WIDTH: usize = 80;
const ELLIPSIS: &str = "...";

/// Current terminal column count, or [`DEFAULT_WIDTH`] when there is no terminal
pub fn terminal_width() -> usize {
    match crossterm::terminal::size() {
        Ok((cols, _)) if cols > 0 => usize::from(cols),
        Ok(_) => DEFAULT_WIDTH,
        Err(e) => {
            log::debug!("terminal size unavailable ({}), using {}", e, DEFAULT_WIDTH);
            DEFAULT_WIDTH
        }
    }
}

/// Truncate `value` so that `decoration + len(result) <= width`.
///
/// When truncated, the last three columns of the budget hold an ellipsis.
/// Lengths count characters, not bytes.
pub fn truncate(value: &str, width: usize, decoration: usize) -> String {
    let budget = width.saturating_sub(decoration);
    if value.chars().count() <= budget {
        return value.to_string();
    }
    if budget <= ELLIPSIS.len() {
        return ELLIPSIS[..budget].to_string();
    }

    let mut out: String = value.chars().take(budget - ELLIPSIS.len()).collect();
    out.push_str(ELLIPSIS);
    out
}

#[derive(Debug, Clone)]
pub struct Theme {
    pub enabled: bool,
    pub separator: Color,
    pub timestamp: Color,
    pub syscall: Color,
    pub method: Color,
    pub status: Color,
    pub header_key: Color,
    pub body: Color,
    pub buffer: Color,
    pub failure: Color,
    pub notice: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            enabled: true,
            separator: Color::DarkGrey,
            timestamp: Color::DarkGrey,
            syscall: Color::Cyan,
            method: Color::Green,
            status: Color::Yellow,
            header_key: Color::Blue,
            body: Color::Reset,
            buffer: Color::Magenta,
            failure: Color::Red,
            notice: Color::DarkYellow,
        }
    }
}

impl Theme {
    /// No escape codes at all
    pub fn plain() -> Self {
        Theme {
            enabled: false,
            ..Theme::default()
        }
    }

    fn paint(&self, color: Color, text: &str) -> String {
        if self.enabled {
            style(text).with(color).to_string()
        } else {
            text.to_string()
        }
    }
}

/// Renders pipeline output as plain lines. Each method returns the text for
/// one section without a trailing newline.
#[derive(Debug, Clone)]
pub struct Formatter {
    width: usize,
    theme: Theme,
}

impl Formatter {
    pub fn new(width: usize, theme: Theme) -> Self {
        Formatter { width, theme }
    }

    pub fn separator(&self) -> String {
        self.theme.paint(self.theme.separator, &"-".repeat(self.width))
    }

    /// `{timestamp} {leading}"{payload}"{trailing}` with the payload shortened
    /// to whatever room the rest of the line leaves.
    pub fn summary(&self, timestamp: &str, record: &SyscallRecord) -> String {
        let decoration = timestamp.chars().count()
            + 1
            + record.leading.chars().count()
            + 2
            + record.trailing.chars().count();
        let payload = String::from_utf8_lossy(&record.payload);
        let summary = truncate(&payload, self.width, decoration);

        format!(
            "{} {}\"{}\"{}",
            self.theme.paint(self.theme.timestamp, timestamp),
            self.theme.paint(self.theme.syscall, &record.leading),
            summary,
            record.trailing
        )
    }

    pub fn notice(&self, timestamp: &str, line: &str) -> String {
        format!(
            "{} {}",
            self.theme.paint(self.theme.timestamp, timestamp),
            self.theme.paint(self.theme.notice, line)
        )
    }

    pub fn start_line(&self, start_line: &StartLine) -> String {
        match start_line {
            StartLine::Request {
                method,
                url,
                version,
            } => {
                let rest = truncate(&format!("{url} {version}"), self.width, method.len() + 1);
                format!("{} {}", self.theme.paint(self.theme.method, method), rest)
            }
            StartLine::Status {
                version,
                code,
                reason,
            } => {
                let line = truncate(&format!("{version} {code} {reason}"), self.width, 0);
                self.theme.paint(self.theme.status, &line)
            }
            StartLine::Raw { text } => truncate(text, self.width, 0),
        }
    }

    pub fn headers(&self, headers: &[Header]) -> String {
        headers
            .iter()
            .map(|header| {
                let decoration = header.key.chars().count() + 2;
                format!(
                    "{}: {}",
                    self.theme.paint(self.theme.header_key, &header.key),
                    truncate(&header.value, self.width, decoration)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn body(&self, body: &[String]) -> String {
        body.iter()
            .map(|line| self.theme.paint(self.theme.body, &truncate(line, self.width, 0)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Start line, headers and body separated by blank lines
    pub fn message(&self, message: &HttpMessage) -> String {
        let mut out = String::new();
        out.push('\n');
        out.push_str(&self.start_line(&message.start_line));
        out.push('\n');
        if !message.headers.is_empty() {
            out.push('\n');
            out.push_str(&self.headers(&message.headers));
            out.push('\n');
        }
        if !message.body.is_empty() {
            out.push('\n');
            out.push_str(&self.body(&message.body));
            out.push('\n');
        }
        out.pop();
        out
    }

    pub fn buffers(&self, chunks: &[&[u8]]) -> String {
        chunks
            .iter()
            .map(|chunk| {
                let text = String::from_utf8_lossy(chunk);
                self.theme.paint(self.theme.buffer, &truncate(&text, self.width, 0))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn opaque(&self, payload: &[u8]) -> String {
        router::opaque_preview(payload)
    }

    /// Failure marker followed by the undecoded payload
    pub fn failure(&self, payload: &[u8], error: &TraceError) -> String {
        format!(
            "{}\n{}",
            self.theme.paint(self.theme.failure, &format!("!! {error}")),
            String::from_utf8_lossy(payload)
        )
    }
}
