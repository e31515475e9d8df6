//! Resolve a process name to the PIDs to trace.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;

/// Kernel limit on `comm` length, excluding the terminator
const COMM_LEN: usize = 15;

/// Find every process whose command or executable is named `name`.
///
/// Searches `/proc`, skipping processes we cannot inspect and ourselves.
/// Fails when nothing matches.
pub fn find_pids_by_name(name: &str) -> Result<Vec<i32>> {
    let own_pid = std::process::id() as i32;
    let mut pids = Vec::new();

    let proc_dir = fs::read_dir("/proc").context("Failed to read /proc")?;

    for entry in proc_dir.flatten() {
        let file_name = entry.file_name();
        let Ok(pid) = file_name.to_string_lossy().parse::<i32>() else {
            continue;
        };
        if pid == own_pid {
            continue;
        }

        let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
            continue;
        };
        let Some(command) = extract_comm(&stat) else {
            continue;
        };
        let exe = fs::read_link(format!("/proc/{pid}/exe")).ok();

        if is_match(command, exe.as_deref(), name) {
            pids.push(pid);
        }
    }

    if pids.is_empty() {
        bail!(
            "No process matching '{name}' found.\n\
             Check running processes with: ps aux | grep {name}"
        );
    }

    pids.sort_unstable();
    log::debug!("'{}' resolved to pids {:?}", name, pids);
    Ok(pids)
}

/// Command name from `/proc/<pid>/stat`, format "pid (comm) state ..."
fn extract_comm(stat_line: &str) -> Option<&str> {
    let open = stat_line.find('(')?;
    let close = stat_line.rfind(')')?;
    if open >= close {
        return None;
    }
    Some(&stat_line[open + 1..close])
}

fn is_match(command: &str, exe_path: Option<&Path>, name: &str) -> bool {
    let exe_basename = exe_path
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let truncated: String = name.chars().take(COMM_LEN).collect();

    command == name || exe_basename == name || (name.len() > COMM_LEN && command == truncated)
}
