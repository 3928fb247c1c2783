use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufRead, BufReader, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Sink for the textual audit trail of lifecycle events.
pub trait Logger: Send + Sync {
    fn log(&self, source: &str, message: &str);
}

pub type SharedLogger = Arc<dyn Logger>;

/// Write to `logger` if there is one.
pub(crate) fn emit(logger: &Option<SharedLogger>, source: &str, message: &str) {
    if let Some(logger) = logger {
        logger.log(source, message);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub ts_ms: u128,
    pub source: String,
    pub message: String,
}

impl Event {
    pub fn now<S: Into<String>, M: Into<String>>(source: S, message: M) -> Self {
        let ts_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self { ts_ms, source: source.into(), message: message.into() }
    }
}

/// Append-only event log, optionally mirrored to an NDJSON file.
pub struct AuditTrail {
    mem: Mutex<Vec<Event>>,
    file: Option<PathBuf>,
}

impl AuditTrail {
    /// Open or create a trail at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { mem: Mutex::new(Vec::new()), file: Some(path) })
    }

    pub fn in_memory() -> Self {
        Self { mem: Mutex::new(Vec::new()), file: None }
    }

    pub fn append(&self, event: Event) -> Result<()> {
        if let Some(ref path) = self.file {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            let mut line = serde_json::to_string(&event)?;
            line.push('\n');
            file.write_all(line.as_bytes())?;
        }
        self.mem.lock().unwrap_or_else(PoisonError::into_inner).push(event);
        Ok(())
    }

    /// Last `n` events held in memory.
    pub fn tail(&self, n: usize) -> Vec<Event> {
        let mem = self.mem.lock().unwrap_or_else(PoisonError::into_inner);
        mem[mem.len().saturating_sub(n)..].to_vec()
    }

    pub fn messages(&self) -> Vec<String> {
        let mem = self.mem.lock().unwrap_or_else(PoisonError::into_inner);
        mem.iter().map(|e| e.message.clone()).collect()
    }

    pub fn load_from_disk(&self) -> Result<usize> {
        let Some(ref path) = self.file else { return Ok(0) };
        if !path.exists() { return Ok(0) }
        let f = OpenOptions::new().read(true).open(path)?;
        let mut loaded = Vec::new();
        for line in BufReader::new(f).lines() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            if let Ok(ev) = serde_json::from_str::<Event>(&line) {
                loaded.push(ev);
            }
        }
        let added = loaded.len();
        self.mem.lock().unwrap_or_else(PoisonError::into_inner).extend(loaded);
        Ok(added)
    }
}

impl Logger for AuditTrail {
    fn log(&self, source: &str, message: &str) {
        let message = message.trim_end();
        tracing::debug!(target: "convoy::audit", source, message);
        if let Err(err) = self.append(Event::now(source, message)) {
            tracing::warn!(error = %err, "audit trail append failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_tail() {
        let trail = AuditTrail::in_memory();
        trail.log("group", "Starting group: all");
        trail.log("tracker", "Start api\n");

        let tail = trail.tail(1);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].message, "Start api");
        assert_eq!(trail.tail(5).len(), 2);
        assert_eq!(trail.messages(), vec!["Starting group: all", "Start api"]);
    }

    #[test]
    fn file_backed_reload() {
        let path = std::env::temp_dir().join(format!("convoy_audit_{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let trail = AuditTrail::new(&path).unwrap();
        trail.append(Event::now("tracker", "Build api")).unwrap();
        trail.append(Event::now("tracker", "Build api Succeeded")).unwrap();

        let reloaded = AuditTrail::new(&path).unwrap();
        assert_eq!(reloaded.load_from_disk().unwrap(), 2);
        assert_eq!(reloaded.messages(), vec!["Build api", "Build api Succeeded"]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn emit_without_logger_is_noop() {
        emit(&None, "group", "nothing happens");
    }
}
