//! Line log of the running provisioning operation.
//!
//! One operation writes at a time (the action gate guarantees it). Pollers
//! take snapshots whenever they like; reads never wait on the writer beyond
//! the copy itself.

use std::sync::{Arc, RwLock};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

#[derive(Clone, Default)]
pub struct LogStream {
    lines: Arc<RwLock<Vec<String>>>,
}

impl LogStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh log for a new operation.
    pub fn reset(&self) {
        match self.lines.write() {
            Ok(mut lines) => lines.clear(),
            Err(poisoned) => {
                let mut lines = poisoned.into_inner();
                lines.clear();
                self.lines.clear_poison();
            }
        }
    }

    pub fn append(&self, line: String) -> Result<(), String> {
        self.lines
            .write()
            .map(|mut lines| lines.push(line))
            .map_err(|_| "log buffer lock poisoned".to_string())
    }

    /// Snapshot of everything captured so far.
    pub fn read(&self) -> Vec<String> {
        match self.lines.read() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Drain `output` line by line into the log until EOF.
    ///
    /// The reader is always consumed to the end, even when appends fail, so a
    /// child process never blocks on a full pipe. Invalid UTF-8 is replaced
    /// rather than ending the drain.
    pub fn attach<R>(&self, output: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let log = self.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(output);
            let mut buf = Vec::new();
            let mut append_failed = false;
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf)
                            .trim_end_matches(['\n', '\r'])
                            .to_string();
                        if let Err(e) = log.append(line) {
                            if !append_failed {
                                tracing::error!(error = %e, "log append failed, discarding output");
                                append_failed = true;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "process output read failed");
                        break;
                    }
                }
            }
        })
    }
}
