//! Asynchronous log writer.

use crate::error::{LoggingError, Result};
use crate::log_message::LogMessage;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::thread;

/// Drains the logger channel on a dedicated thread.
///
/// Without a file the writer still consumes messages so senders never
/// observe a closed channel.
pub(crate) struct LogWriter {
    file: Option<File>,
}

impl LogWriter {
    /// Opens or creates `log_path` in append mode. `None` discards output.
    pub fn new(log_path: Option<&Path>) -> Result<Self> {
        let file = match log_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Some(OpenOptions::new().create(true).append(true).open(path)?)
            }
            None => None,
        };
        Ok(Self { file })
    }

    fn write_message(&mut self, message: &LogMessage) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if let Err(e) = file.write_all(message.format().as_bytes()) {
            eprintln!("Error writing log: {}", e);
            return;
        }
        if let Err(e) = file.flush() {
            eprintln!("Error flushing log: {}", e);
        }
    }

    /// Runs until every sender has been dropped.
    pub fn run(mut self, receiver: Receiver<LogMessage>) {
        for message in receiver {
            self.write_message(&message);
        }
    }
}

pub(crate) fn spawn_writer_thread(
    log_path: Option<&Path>,
    receiver: Receiver<LogMessage>,
) -> Result<()> {
    let writer = LogWriter::new(log_path)?;
    thread::Builder::new()
        .name("log-writer".to_string())
        .spawn(move || writer.run(receiver))
        .map_err(|e| LoggingError::Logging(format!("Failed to spawn writer thread: {}", e)))?;
    Ok(())
}
