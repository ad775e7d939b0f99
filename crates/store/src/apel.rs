// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! APEL individual-job-usage accounting records (§4.10, §6).

use crate::error::StoreError;
use std::io::Write;
use std::path::Path;

/// One APEL individual-job-usage record.
#[derive(Debug, Clone)]
pub struct ApelRecord {
    pub site: String,
    pub submit_host: String,
    pub local_job_id: String,
    pub local_user_id: String,
    pub queue: String,
    pub processor_count: u32,
    pub wall_duration: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub service_level: f64,
}

impl ApelRecord {
    /// Renders the text key/value block the external APEL publisher expects.
    pub fn render(&self) -> String {
        format!(
            "Site: {site}\n\
             SubmitHost: {submit_host}\n\
             LocalJobId: {local_job_id}\n\
             LocalUserId: {local_user_id}\n\
             Queue: {queue}\n\
             ProcessorCount: {processor_count}\n\
             NodeCount: 1\n\
             WallDuration: {wall_duration}\n\
             StartTime: {start_time}\n\
             EndTime: {end_time}\n\
             InfrastructureDescription: APEL-CREAM-vcycle\n\
             InfrastructureType: grid\n\
             ServiceLevelType: HEPSPEC\n\
             ServiceLevel: {service_level}\n",
            site = self.site,
            submit_host = self.submit_host,
            local_job_id = self.local_job_id,
            local_user_id = self.local_user_id,
            queue = self.queue,
            processor_count = self.processor_count,
            wall_duration = self.wall_duration.max(0),
            start_time = self.start_time,
            end_time = self.end_time,
            service_level = self.service_level,
        )
    }
}

pub fn write(root: &Path, day: &str, machine: &str, record: &ApelRecord) -> Result<(), StoreError> {
    let archive_dir = root.join("apel-archive").join(day);
    let outgoing_dir = root.join("apel-outgoing").join(day);
    std::fs::create_dir_all(&archive_dir).map_err(|e| io_err(&archive_dir, e))?;
    std::fs::create_dir_all(&outgoing_dir).map_err(|e| io_err(&outgoing_dir, e))?;

    let archive_path = archive_dir.join(machine);
    let mut f = std::fs::File::create(&archive_path).map_err(|e| io_err(&archive_path, e))?;
    f.write_all(record.render().as_bytes()).map_err(|e| io_err(&archive_path, e))?;
    drop(f);

    let outgoing_path = outgoing_dir.join(machine);
    // Hard-link where possible (same publisher content, independent
    // deletion lifecycle); fall back to a copy across filesystems.
    if std::fs::hard_link(&archive_path, &outgoing_path).is_err() {
        std::fs::copy(&archive_path, &outgoing_path).map_err(|e| io_err(&outgoing_path, e))?;
    }
    Ok(())
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io { path: path.to_path_buf(), source }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ApelRecord {
        ApelRecord {
            site: "RAL-LCG2".into(),
            submit_host: "vcycle".into(),
            local_job_id: "vcycle-mt1-abcdefghij".into(),
            local_user_id: "vcycle".into(),
            queue: "grid".into(),
            processor_count: 4,
            wall_duration: 3600,
            start_time: 1000,
            end_time: 4600,
            service_level: 10.0,
        }
    }

    #[test]
    fn writes_archive_and_outgoing_copies() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "20260726", "vcycle-mt1-abcdefghij", &sample()).unwrap();
        let archive = dir.path().join("apel-archive/20260726/vcycle-mt1-abcdefghij");
        let outgoing = dir.path().join("apel-outgoing/20260726/vcycle-mt1-abcdefghij");
        assert!(archive.exists());
        assert!(outgoing.exists());
        assert_eq!(std::fs::read_to_string(&archive).unwrap(), std::fs::read_to_string(&outgoing).unwrap());
    }

    #[test]
    fn wall_duration_never_negative_in_render() {
        let mut record = sample();
        record.wall_duration = -5;
        assert!(record.render().contains("WallDuration: 0"));
    }
}
