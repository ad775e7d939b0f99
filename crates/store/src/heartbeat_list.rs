// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-machinetype live-machine heartbeat lists (§4.11): one line per
//! live machine, `<heartbeat_epoch> <name> <ip>`, sorted newest-first.

use crate::error::StoreError;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatEntry {
    pub heartbeat_epoch: i64,
    pub name: String,
    pub ip: String,
}

pub fn write(path: &Path, lines: &[String]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let tmp_dir = dir.join("tmp");
    std::fs::create_dir_all(&tmp_dir).map_err(|e| io_err(&tmp_dir, e))?;
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("heartbeatlist");
    let tmp_path = tmp_dir.join(format!("{file_name}.{}", std::process::id()));
    {
        let mut f = std::fs::File::create(&tmp_path).map_err(|e| io_err(&tmp_path, e))?;
        for line in lines {
            writeln!(f, "{line}").map_err(|e| io_err(&tmp_path, e))?;
        }
    }
    std::fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

pub fn read(path: &Path) -> Vec<HeartbeatEntry> {
    let Ok(contents) = std::fs::read_to_string(path) else { return Vec::new() };
    contents
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let heartbeat_epoch = parts.next()?.parse().ok()?;
            let name = parts.next()?.to_string();
            let ip = parts.next().unwrap_or("0.0.0.0").to_string();
            Some(HeartbeatEntry { heartbeat_epoch, name, ip })
        })
        .collect()
}

/// Formats the sorted-newest-first line list for a set of live entries.
pub fn format_lines(mut entries: Vec<HeartbeatEntry>) -> Vec<String> {
    entries.sort_by(|a, b| b.heartbeat_epoch.cmp(&a.heartbeat_epoch));
    entries.into_iter().map(|e| format!("{} {} {}", e.heartbeat_epoch, e.name, e.ip)).collect()
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io { path: path.to_path_buf(), source }
}
