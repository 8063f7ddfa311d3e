//! Append-only JSON Lines audit file

use crate::audit_logger::{AuditEntry, AuditError, AuditSink};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Writes one JSON object per line, appending to `path`
///
/// `record` does blocking `std::fs` IO: one open and one small append per
/// entry, serialized by an in-process lock. Async callers invoke it inline
/// from a task, which briefly occupies that worker thread. Callers on a
/// heavily loaded runtime should wrap it in `tokio::task::spawn_blocking`.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    name: String,
    write_lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("jsonl:{}", path.display()),
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry back; a missing file is an empty trail
    pub fn read_entries(&self) -> Result<Vec<AuditEntry>, AuditError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().map_err(|_| AuditError::Lock)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit_logger::AuditEventType;
    use shared::{ActionKind, EntityRef};

    #[test]
    fn test_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::new(dir.path().join("audit.jsonl"));

        for id in ["m1", "m2"] {
            let entry = AuditEntry::new(
                AuditEventType::SoftBlockOverride,
                EntityRef::mcp(id),
                ActionKind::Delete,
            )
            .with_actor("ops-lead")
            .with_reason("retiring legacy rostering");
            sink.record(&entry).unwrap();
        }

        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content.lines().count(), 2);

        let entries = sink.read_entries().unwrap();
        assert_eq!(entries[1].entity, EntityRef::mcp("m2"));
        assert_eq!(entries[0].actor.as_deref(), Some("ops-lead"));
    }

    #[test]
    fn test_concurrent_writers_keep_lines_whole() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::new(dir.path().join("audit.jsonl"));

        std::thread::scope(|scope| {
            for t in 0..4 {
                let sink = &sink;
                scope.spawn(move || {
                    for i in 0..25 {
                        let entry = AuditEntry::new(
                            AuditEventType::HardBlock,
                            EntityRef::mcp(format!("m{}-{}", t, i)),
                            ActionKind::Delete,
                        );
                        sink.record(&entry).unwrap();
                    }
                });
            }
        });

        assert_eq!(sink.read_entries().unwrap().len(), 100);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::new(dir.path().join("none.jsonl"));
        assert!(sink.read_entries().unwrap().is_empty());
    }

    #[test]
    fn test_unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::new(dir.path().join("missing-dir").join("audit.jsonl"));
        let entry = AuditEntry::new(
            AuditEventType::HardBlock,
            EntityRef::mcp("m1"),
            ActionKind::Delete,
        );
        assert!(matches!(sink.record(&entry), Err(AuditError::Io(_))));
    }
}
