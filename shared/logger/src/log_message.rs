//! Internal log message structure.

use crate::log_level::LogLevel;
use chrono::Local;

/// A formatted-on-demand log record.
///
/// The originating thread name is captured at creation time because the
/// record is rendered later on the writer thread.
#[derive(Debug, Clone)]
pub(crate) struct LogMessage {
    pub timestamp: String,
    pub level: LogLevel,
    pub component: Option<String>,
    pub thread: Option<String>,
    pub message: String,
}

impl LogMessage {
    pub fn new(level: LogLevel, component: Option<&str>, message: &str) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            level,
            component: component.map(str::to_string),
            thread: std::thread::current().name().map(str::to_string),
            message: message.to_string(),
        }
    }

    /// `[timestamp] LEVEL [component: X] (thread): message\n`
    pub fn format(&self) -> String {
        let mut line = format!("[{}] {}", self.timestamp, self.level);
        if let Some(component) = &self.component {
            line.push_str(&format!(" [component: {}]", component));
        }
        if let Some(thread) = &self.thread {
            line.push_str(&format!(" ({})", thread));
        }
        line.push_str(": ");
        line.push_str(&self.message);
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_format_without_component() {
        let msg = LogMessage::new(LogLevel::Error, None, "Connection failed");
        let formatted = msg.format();

        assert!(formatted.contains("] ERROR"));
        assert!(formatted.contains("Connection failed"));
        assert!(!formatted.contains("component"));
        assert!(formatted.ends_with('\n'));
    }

    #[test]
    fn test_format_with_component_and_thread() {
        let formatted = thread::Builder::new()
            .name("rtp-recv".to_string())
            .spawn(|| LogMessage::new(LogLevel::Warn, Some("DEPACKETIZER"), "gap").format())
            .unwrap()
            .join()
            .unwrap();

        assert!(formatted.contains("WARN [component: DEPACKETIZER] (rtp-recv): gap"));
    }

    #[test]
    fn test_timestamp_format() {
        let msg = LogMessage::new(LogLevel::Info, None, "Test");
        let ts = &msg.timestamp;

        // YYYY-MM-DD HH:MM:SS.mmm
        assert_eq!(ts.len(), 23);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[19..20], ".");
    }
}
