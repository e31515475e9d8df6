use crate::display::Formatter;
use crate::error::TraceError;
use crate::tracer::TracerProcess;
use crate::types::{LineKind, Route};
use crate::{http, parser, router};
use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver};
use crossbeam::select;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, BufReader, Write};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessStats {
    pub total_lines: usize,
    pub syscall_lines: usize,
    pub notice_lines: usize,
    pub http_messages: usize,
    pub multi_buffer_lines: usize,
    pub opaque_lines: usize,
    pub failed_lines: usize,
}

/// What a successfully handled line turned into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Notice,
    Http,
    MultiBuffer,
    Opaque,
}

impl ProcessStats {
    fn record(&mut self, outcome: LineOutcome) {
        match outcome {
            LineOutcome::Notice => self.notice_lines += 1,
            LineOutcome::Http => self.http_messages += 1,
            LineOutcome::MultiBuffer => self.multi_buffer_lines += 1,
            LineOutcome::Opaque => self.opaque_lines += 1,
        }
    }
}

/// Local wall-clock time as HH:MM:SS.micro
pub fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.6f").to_string()
}

/// Runs each tracer line through the pipeline and writes the rendering.
///
/// Nothing but counters survives from one line to the next.
pub struct Session<'a, W: Write> {
    formatter: &'a Formatter,
    out: W,
    stats: ProcessStats,
}

impl<'a, W: Write> Session<'a, W> {
    pub fn new(formatter: &'a Formatter, out: W) -> Self {
        Session {
            formatter,
            out,
            stats: ProcessStats::default(),
        }
    }

    pub fn stats(&self) -> &ProcessStats {
        &self.stats
    }

    /// Handle one raw line. Per-line failures are counted and skipped;
    /// only output errors are returned.
    pub fn handle_line(&mut self, line: &[u8]) -> io::Result<()> {
        let line = trim_line_ending(line);
        if line.is_empty() {
            return Ok(());
        }
        self.stats.total_lines += 1;

        match self.render_line(line, &timestamp()) {
            Ok(outcome) => self.stats.record(outcome),
            Err(TraceError::Io(e)) => return Err(e),
            Err(e) => {
                self.stats.failed_lines += 1;
                log::debug!("line {} failed: {}", self.stats.total_lines, e);
            }
        }

        self.out.flush()
    }

    fn render_line(&mut self, line: &[u8], timestamp: &str) -> Result<LineOutcome, TraceError> {
        if parser::classify_line(line) == LineKind::Notice {
            return self.render_notice(line, timestamp);
        }

        let record = match parser::parse_record(line) {
            Ok(Some(record)) => record,
            Ok(None) => return self.render_notice(line, timestamp),
            Err(e) => {
                writeln!(self.out, "{}", self.formatter.failure(line, &e))?;
                return Err(e);
            }
        };
        self.stats.syscall_lines += 1;

        writeln!(self.out, "{}", self.formatter.separator())?;
        writeln!(self.out, "{}", self.formatter.summary(timestamp, &record))?;

        match router::route_payload(&record.payload) {
            Route::Http => match http::decompose(&record.payload) {
                Ok(message) => {
                    writeln!(self.out, "{}", self.formatter.message(&message))?;
                    Ok(LineOutcome::Http)
                }
                Err(e) => {
                    writeln!(self.out, "{}", self.formatter.failure(&record.payload, &e))?;
                    Err(e)
                }
            },
            Route::RawMultiBuffer => {
                let chunks = router::split_buffers(&record.payload);
                writeln!(self.out, "{}", self.formatter.buffers(&chunks))?;
                Ok(LineOutcome::MultiBuffer)
            }
            Route::Opaque => {
                writeln!(self.out, "{}", self.formatter.opaque(&record.payload))?;
                Ok(LineOutcome::Opaque)
            }
        }
    }

    fn render_notice(&mut self, line: &[u8], timestamp: &str) -> Result<LineOutcome, TraceError> {
        let text = String::from_utf8_lossy(line);
        writeln!(self.out, "{}", self.formatter.notice(timestamp, &text))?;
        Ok(LineOutcome::Notice)
    }

    /// Print the closing status line and hand back the counters
    pub fn finish(mut self, status: &str) -> io::Result<ProcessStats> {
        writeln!(self.out, "{}", self.formatter.notice(&timestamp(), status))?;
        self.out.flush()?;
        Ok(self.stats)
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Process every line of an already-captured trace stream, e.g. stdin
pub fn process_stream<R: BufRead, W: Write>(
    mut reader: R,
    formatter: &Formatter,
    out: W,
) -> Result<ProcessStats> {
    let mut session = Session::new(formatter, out);
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .context("Failed to read trace line")?;
        if read == 0 {
            break;
        }
        session
            .handle_line(&line)
            .context("Failed to write output")?;
    }

    session.finish("end of input").context("Failed to write output")
}

/// Follow a running tracer until it exits or `interrupt` fires.
///
/// A reader thread feeds lines through a one-slot channel, so at most one
/// unprocessed line is ever buffered. The tracer is terminated before
/// returning, on every path.
pub fn run_live<W: Write>(
    mut tracer: TracerProcess,
    formatter: &Formatter,
    out: W,
    interrupt: &Receiver<()>,
) -> Result<ProcessStats> {
    let output = tracer
        .take_output()
        .context("Tracer output pipe is not available")?;
    let (line_tx, line_rx) = channel::bounded::<Vec<u8>>(1);

    let reader = thread::spawn(move || -> io::Result<()> {
        let mut reader = BufReader::new(output);
        loop {
            let mut line = Vec::new();
            if reader.read_until(b'\n', &mut line)? == 0 {
                return Ok(());
            }
            if line_tx.send(line).is_err() {
                return Ok(());
            }
        }
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message(format!("waiting for output from tracer {}", tracer.id()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut session = Session::new(formatter, out);

    let status = loop {
        select! {
            recv(line_rx) -> msg => match msg {
                Ok(line) => {
                    if !spinner.is_finished() {
                        spinner.finish_and_clear();
                    }
                    session.handle_line(&line).context("Failed to write output")?;
                }
                Err(_) => break "tracer exited",
            },
            // A dropped sender counts as an interrupt too
            recv(interrupt) -> _ => break "interrupted, detaching",
        }
    };
    spinner.finish_and_clear();
    log::info!("stopping: {}", status);

    drop(line_rx);
    tracer.terminate().context("Failed to terminate tracer")?;
    let read_result = match reader.join() {
        Ok(result) => result,
        Err(_) => Err(io::Error::other("tracer reader thread panicked")),
    };

    let stats = session.finish(status).context("Failed to write output")?;
    read_result.context("Failed to read tracer output")?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::Theme;
    use std::fs::File;
    use std::io::Cursor;
    use std::path::Path;

    fn formatter() -> Formatter {
        Formatter::new(80, Theme::plain())
    }

    fn render(input: &str) -> (ProcessStats, String) {
        let formatter = formatter();
        let mut out = Vec::new();
        let stats = process_stream(Cursor::new(input.as_bytes()), &formatter, &mut out)
            .expect("Failed to process");
        (stats, String::from_utf8(out).expect("Output is UTF-8"))
    }

    #[test]
    fn test_process_fixture_counts() {
        let formatter = formatter();
        let file = File::open(Path::new("tests/fixtures/http-trace.txt")).expect("Fixture exists");
        let mut out = Vec::new();

        let stats = process_stream(BufReader::new(file), &formatter, &mut out)
            .expect("Failed to process fixture");

        assert_eq!(
            stats,
            ProcessStats {
                total_lines: 9,
                syscall_lines: 6,
                notice_lines: 3,
                http_messages: 2,
                multi_buffer_lines: 2,
                opaque_lines: 1,
                failed_lines: 1,
            }
        );
    }

    #[test]
    fn test_process_fixture_output() {
        let formatter = formatter();
        let file = File::open(Path::new("tests/fixtures/http-trace.txt")).expect("Fixture exists");
        let mut out = Vec::new();
        process_stream(BufReader::new(file), &formatter, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("\nGET /api/items?limit=5 HTTP/1.1\n\nHost: example.com\n"));
        assert!(out.contains("\nHTTP/1.1 200 OK\n"));
        assert!(out.contains("\n\n{\"items\": []}\n"), "Body follows a blank line");
        assert!(out.contains("!! malformed header line \"BadHeaderNoColon\"\n"));
        assert!(out.contains(r"POST /submit HTTP/1.1\r\nHost: a\r\nBadHeaderNoColon"));
        assert!(out.contains("\nupstream: a\nupstream: b\n"));
        assert!(out.contains("\nhello world\\n\n"));
        assert!(out.contains(" +++ exited with 0 +++\n"));
        assert!(out.contains(" close(3)                                = 0\n"));
        assert!(out.trim_end().ends_with(" end of input"));
    }

    #[test]
    fn test_failure_does_not_stop_later_lines() {
        let input = concat!(
            r#"write(3, "GET / HTTP/1.1\r\nBadHeaderNoColon\r\n\r\n", 30) = 30"#,
            "\n",
            r#"write(3, "GET /next HTTP/1.1\r\nHost: b\r\n\r\n", 30) = 30"#,
            "\n",
        );
        let (stats, out) = render(input);

        assert_eq!(stats.failed_lines, 1);
        assert_eq!(stats.http_messages, 1);
        assert!(out.contains("GET /next HTTP/1.1"));
    }

    #[test]
    fn test_every_syscall_line_starts_with_separator() {
        let (_, out) = render("write(1, \"hi\", 2) = 2\n");
        let mut lines = out.lines();

        assert_eq!(lines.next(), Some("-".repeat(80).as_str()));
        let summary = lines.next().expect("Summary line");
        assert!(summary.ends_with(r#" write(1, "hi", 2) = 2"#));
        assert_eq!(lines.next(), Some("hi"));
    }

    #[test]
    fn test_summary_truncated_to_width() {
        let payload = "z".repeat(300);
        let (_, out) = render(&format!("write(1, \"{payload}\", 300) = 300\n"));
        let summary = out.lines().nth(1).expect("Summary line");

        assert_eq!(summary.chars().count(), 80);
        assert!(summary.ends_with("...\", 300) = 300"));
    }

    #[test]
    fn test_undecodable_leading_text_is_a_failure() {
        let formatter = formatter();
        let mut out = Vec::new();
        let mut session = Session::new(&formatter, &mut out);

        session
            .handle_line(b"write(\xff, \"x\", 1) = 1\n")
            .expect("Line failures are not fatal");
        assert_eq!(session.stats().failed_lines, 1);
        assert_eq!(session.stats().syscall_lines, 0);
    }

    #[test]
    fn test_blank_and_crlf_lines() {
        let (stats, out) = render("\n\r\n+++ exited with 0 +++\r\n");
        assert_eq!(stats.total_lines, 1);
        assert_eq!(stats.notice_lines, 1);
        assert!(!out.contains('\r'));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_live_until_tracer_exits() {
        let mut cmd = std::process::Command::new("sh");
        cmd.args(["-c", "cat tests/fixtures/http-trace.txt >&2"]);
        let tracer = TracerProcess::spawn(cmd).expect("Failed to spawn sh");
        let (_stop_tx, stop_rx) = channel::bounded::<()>(1);

        let formatter = formatter();
        let mut out = Vec::new();
        let stats = run_live(tracer, &formatter, &mut out, &stop_rx).expect("Session failed");

        assert_eq!(stats.total_lines, 9);
        assert_eq!(stats.http_messages, 2);
        let out = String::from_utf8(out).unwrap();
        assert!(out.trim_end().ends_with(" tracer exited"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_live_stops_on_interrupt() {
        let mut cmd = std::process::Command::new("sh");
        cmd.args(["-c", "exec sleep 30"]);
        let tracer = TracerProcess::spawn(cmd).expect("Failed to spawn sh");
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        stop_tx.send(()).unwrap();

        let formatter = formatter();
        let mut out = Vec::new();
        let start = std::time::Instant::now();
        let stats = run_live(tracer, &formatter, &mut out, &stop_rx).expect("Session failed");

        assert!(start.elapsed() < Duration::from_secs(10), "Interrupt is prompt");
        assert_eq!(stats.total_lines, 0);
        let out = String::from_utf8(out).unwrap();
        assert!(out.trim_end().ends_with(" interrupted, detaching"));
    }
}
