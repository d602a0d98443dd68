// SPDX-License-Identifier: MIT
//! Critical-failure diagnostic snapshots.
//!
//! When the supervisor crosses its repeat-restart threshold it captures a
//! point-in-time snapshot of the machine (processes, memory, disk, service
//! state, display, network, recent logs) to a timestamped file for offline
//! inspection. Collection failures for individual sections are recorded in
//! the snapshot itself rather than aborting it.

use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use crate::error::Result;
use crate::service::{run_command, service_status, KIOSK_SERVICE};

/// How many trailing log lines a snapshot includes.
const LOG_TAIL_LINES: usize = 200;

/// Shell commands captured into every snapshot, in order.
const SECTIONS: &[(&str, &str, &[&str])] = &[
    ("processes", "ps", &["aux", "--sort=-rss"]),
    ("memory", "free", &["-m"]),
    ("disk", "df", &["-h"]),
    ("display", "xset", &["q"]),
    ("network", "ip", &["addr"]),
];

/// Capture a snapshot under `{data_dir}/diagnostics/` and return its path.
pub async fn capture_snapshot(data_dir: &Path, log_path: &Path, reason: &str) -> Result<PathBuf> {
    let dir = data_dir.join("diagnostics");
    tokio::fs::create_dir_all(&dir).await?;
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let path = dir.join(format!("diag-{stamp}.txt"));

    let mut report = format!(
        "kiosk diagnostic snapshot\ntime: {}\nreason: {reason}\n",
        Local::now().to_rfc3339()
    );

    for (label, program, args) in SECTIONS {
        report.push_str(&section_header(label));
        match run_command(program, args).await {
            Ok(outcome) => report.push_str(&outcome.output()),
            Err(e) => report.push_str(&format!("<collection failed: {e}>")),
        }
        report.push('\n');
    }

    report.push_str(&section_header("service"));
    match service_status(KIOSK_SERVICE).await {
        Ok(outcome) => report.push_str(&outcome.output()),
        Err(e) => report.push_str(&format!("<collection failed: {e}>")),
    }
    report.push('\n');

    report.push_str(&section_header("recent logs"));
    match tail_log(log_path, LOG_TAIL_LINES).await {
        Ok(lines) => report.push_str(&lines.join("\n")),
        Err(e) => report.push_str(&format!("<collection failed: {e}>")),
    }
    report.push('\n');

    tokio::fs::write(&path, report).await?;
    error!(path = %path.display(), reason, "captured critical diagnostic snapshot");
    Ok(path)
}

fn section_header(label: &str) -> String {
    format!("\n===== {label} =====\n")
}

/// Last `n` lines of the log file. Reads the whole file line by line; kiosk
/// logs are rotated externally and stay small.
pub async fn tail_log(path: &Path, n: usize) -> Result<Vec<String>> {
    if n == 0 {
        return Ok(Vec::new());
    }
    let file = tokio::fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut ring: Vec<String> = Vec::with_capacity(n);
    while let Some(line) = lines.next_line().await? {
        if ring.len() == n {
            ring.remove(0);
        }
        ring.push(line);
    }
    Ok(ring)
}

/// Remove snapshots beyond the newest `keep`.
pub fn prune_snapshots(data_dir: &Path, keep: usize) -> Result<()> {
    let dir = data_dir.join("diagnostics");
    if !dir.exists() {
        return Ok(());
    }
    let mut names: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("diag-") && n.ends_with(".txt"))
        })
        .collect();
    names.sort();
    while names.len() > keep {
        let oldest = names.remove(0);
        info!(path = %oldest.display(), "pruning old diagnostic snapshot");
        std::fs::remove_file(oldest)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn tail_returns_last_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..10 {
            writeln!(file, "line {i}").unwrap();
        }
        let lines = tail_log(file.path(), 3).await.unwrap();
        assert_eq!(lines, vec!["line 7", "line 8", "line 9"]);
    }

    #[tokio::test]
    async fn tail_of_zero_lines_is_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "line").unwrap();
        let lines = tail_log(file.path(), 0).await.unwrap();
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn tail_of_short_file_returns_everything() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "only line").unwrap();
        let lines = tail_log(file.path(), 50).await.unwrap();
        assert_eq!(lines, vec!["only line"]);
    }

    #[tokio::test]
    async fn captured_snapshot_survives_prune_of_older_ones() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = tempfile::NamedTempFile::new().unwrap();
        writeln!(log, "some log line").unwrap();
        let path = capture_snapshot(dir.path(), log.path(), "test escalation")
            .await
            .unwrap();
        // Older snapshots that pruning should discard first.
        let diag_dir = dir.path().join("diagnostics");
        for i in 0..3 {
            std::fs::write(diag_dir.join(format!("diag-2020010{i}-000000.txt")), "x").unwrap();
        }
        prune_snapshots(dir.path(), 1).unwrap();
        let left: Vec<PathBuf> = std::fs::read_dir(&diag_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(left, vec![path]);
    }

    #[test]
    fn prune_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let diag = dir.path().join("diagnostics");
        std::fs::create_dir_all(&diag).unwrap();
        for i in 0..5 {
            std::fs::write(diag.join(format!("diag-2026010{i}-000000.txt")), "x").unwrap();
        }
        prune_snapshots(dir.path(), 2).unwrap();
        let mut left: Vec<String> = std::fs::read_dir(&diag)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec!["diag-20260103-000000.txt", "diag-20260104-000000.txt"]
        );
    }
}
