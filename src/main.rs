use strace_http::display::{self, Formatter, Theme};
use strace_http::processor::{self, ProcessStats};
use strace_http::process_lookup;
use strace_http::tracer::TracerConfig;

use anyhow::{Context, Result, bail};
use clap::Parser;
use crossbeam::channel;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "strace-http")]
#[command(about = "Show the HTTP traffic of a running process by following strace output", long_about = None)]
struct Args {
    /// Name of the process to trace
    #[arg(conflicts_with_all = ["pids", "stdin"])]
    process: Option<String>,

    /// PID to trace (repeatable)
    #[arg(short = 'p', long = "pid", conflicts_with = "stdin")]
    pids: Vec<i32>,

    /// Read tracer lines from standard input instead of spawning strace
    #[arg(long)]
    stdin: bool,

    /// Syscalls to intercept
    #[arg(
        short = 'e',
        long,
        value_delimiter = ',',
        default_value = "read,write,recvfrom,sendto,recvmsg,sendmsg,readv,writev"
    )]
    syscalls: Vec<String>,

    /// Maximum payload characters strace prints per string
    #[arg(short, long, default_value_t = 4096)]
    string_limit: usize,

    /// Also trace child processes and threads
    #[arg(short, long)]
    follow_forks: bool,

    /// strace executable
    #[arg(long, default_value = "strace")]
    strace: PathBuf,

    /// Display width in columns (defaults to the terminal width)
    #[arg(short, long)]
    width: Option<u16>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let width = args
        .width
        .map(usize::from)
        .unwrap_or_else(display::terminal_width);
    let theme = if args.no_color || !io::stdout().is_terminal() {
        Theme::plain()
    } else {
        Theme::default()
    };
    let formatter = Formatter::new(width, theme);

    let stats = if args.stdin {
        processor::process_stream(io::stdin().lock(), &formatter, io::stdout().lock())?
    } else {
        let pids = if !args.pids.is_empty() {
            args.pids
        } else if let Some(name) = &args.process {
            process_lookup::find_pids_by_name(name)?
        } else {
            bail!("Specify a process name, --pid <PID>, or --stdin");
        };

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        ctrlc::set_handler(move || {
            let _ = stop_tx.try_send(());
        })
        .context("Failed to install interrupt handler")?;

        let config = TracerConfig {
            program: args.strace,
            pids,
            syscalls: args.syscalls,
            string_limit: args.string_limit,
            follow_forks: args.follow_forks,
        };
        eprintln!(
            "Tracing {} (press Ctrl-C to stop)",
            config
                .pids
                .iter()
                .map(|pid| pid.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let tracer = config.spawn()?;
        processor::run_live(tracer, &formatter, io::stdout().lock(), &stop_rx)?
    };

    print_summary(&stats);
    Ok(())
}

fn print_summary(stats: &ProcessStats) {
    eprintln!("\n=== Summary ===");
    eprintln!("Lines:        {}", stats.total_lines);
    eprintln!("Syscalls:     {}", stats.syscall_lines);
    eprintln!("Notices:      {}", stats.notice_lines);
    eprintln!("HTTP:         {}", stats.http_messages);
    eprintln!("Multi-buffer: {}", stats.multi_buffer_lines);
    eprintln!("Opaque:       {}", stats.opaque_lines);
    eprintln!("Failed:       {}", stats.failed_lines);
}
