use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Level;

/// How many trailing lines are kept for error reports.
const TAIL_LINES: usize = 20;

const READY_MARKER: &str = "waiting for connections";
const LIFECYCLE_MARKERS: &[&str] = &[
    READY_MARKER,
    "shutting down",
    "shutdown: going to close",
    "dbexit",
    "now exiting",
];

/// Log levels used for the child's output.
///
/// Filter with the `embedmongo::process::output` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Regular stdout lines.
    pub output: Level,
    /// Every stderr line.
    pub error: Level,
    /// Lifecycle lines (startup, readiness, shutdown) and the launch command.
    pub commands: Level,
}

impl Default for ProcessOutput {
    fn default() -> Self {
        Self {
            output: Level::DEBUG,
            error: Level::WARN,
            commands: Level::INFO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// A line after level routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub level: Level,
    pub message: String,
    pub ready: bool,
}

pub fn strip_line_endings(line: &str) -> String {
    line.replace(['\n', '\r'], "")
}

/// Route one output line to a level and detect the readiness marker.
pub fn classify(line: &str, stream: Stream, routing: &ProcessOutput) -> Classified {
    let line = strip_line_endings(line);
    let (severity, message) = parse_line(&line);
    let lowered = message.to_lowercase();
    let ready = stream == Stream::Stdout && lowered.contains(READY_MARKER);

    let level = match stream {
        Stream::Stderr => routing.error,
        Stream::Stdout if severity.as_deref().is_some_and(|s| s.starts_with('D')) => Level::TRACE,
        Stream::Stdout if LIFECYCLE_MARKERS.iter().any(|m| lowered.contains(m)) => routing.commands,
        Stream::Stdout => routing.output,
    };

    Classified { level, message, ready }
}

/// Pull severity and message out of a structured (4.4+) or plain log line.
fn parse_line(line: &str) -> (Option<String>, String) {
    if line.trim_start().starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
            let severity = value.get("s").and_then(|s| s.as_str()).map(String::from);
            let mut message = value
                .get("msg")
                .and_then(|m| m.as_str())
                .unwrap_or(line)
                .to_string();
            if let Some(attr) = value.get("attr") {
                message.push(' ');
                message.push_str(&attr.to_string());
            }
            return (severity, message);
        }
    }

    // "<timestamp> I NETWORK  [ctx] text" on 3.0 to 4.2
    let severity = line
        .split_whitespace()
        .nth(1)
        .filter(|s| {
            let mut chars = s.chars();
            matches!(chars.next(), Some('I' | 'W' | 'E' | 'F' | 'D')) && chars.all(|c| c.is_ascii_digit())
        })
        .map(String::from);
    (severity, line.to_string())
}

fn emit(level: Level, stream: Stream, message: &str) {
    let stream = stream.as_str();
    match level {
        Level::TRACE => tracing::trace!(stream, "{}", message),
        Level::DEBUG => tracing::debug!(stream, "{}", message),
        Level::INFO => tracing::info!(stream, "{}", message),
        Level::WARN => tracing::warn!(stream, "{}", message),
        _ => tracing::error!(stream, "{}", message),
    }
}

/// Log the launch command at the `commands` level.
pub(crate) fn log_command(routing: &ProcessOutput, message: &str) {
    emit(routing.commands, Stream::Stdout, message);
}

/// Last lines written by the child on either stream.
#[derive(Debug, Clone, Default)]
pub struct OutputTail(Arc<Mutex<VecDeque<String>>>);

impl OutputTail {
    fn push(&self, line: String) {
        if let Ok(mut tail) = self.0.lock() {
            if tail.len() == TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.lock().map(|tail| tail.iter().cloned().collect()).unwrap_or_default()
    }
}

/// Read `reader` line by line on its own task so the child never blocks on a full pipe.
pub(crate) fn spawn_reader<R>(
    reader: R,
    stream: Stream,
    routing: ProcessOutput,
    tail: OutputTail,
    ready: Option<watch::Sender<bool>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let classified = classify(&line, stream, &routing);
                    if classified.message.is_empty() {
                        continue;
                    }
                    emit(classified.level, stream, &classified.message);
                    if classified.ready {
                        if let Some(ready) = &ready {
                            ready.send_replace(true);
                        }
                    }
                    tail.push(classified.message);
                }
                Err(e) => {
                    tracing::debug!("Stopped reading mongod {}: {}", stream.as_str(), e);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_goes_to_error_level() {
        let c = classify("something odd\n", Stream::Stderr, &ProcessOutput::default());
        assert_eq!(c.level, Level::WARN);
        assert_eq!(c.message, "something odd");
        assert!(!c.ready);
    }

    #[test]
    fn readiness_in_plain_log() {
        let line = "2014-04-08T10:00:00.000+0000 [initandlisten] waiting for connections on port 27017\r\n";
        let c = classify(line, Stream::Stdout, &ProcessOutput::default());
        assert!(c.ready);
        assert_eq!(c.level, Level::INFO);
    }

    #[test]
    fn readiness_in_json_log() {
        let line = r#"{"t":{"$date":"2024-01-01T00:00:00.000+00:00"},"s":"I","c":"NETWORK","id":23016,"ctx":"listener","msg":"Waiting for connections","attr":{"port":27017,"ssl":"off"}}"#;
        let c = classify(line, Stream::Stdout, &ProcessOutput::default());
        assert!(c.ready);
        assert!(c.message.starts_with("Waiting for connections"));
        assert!(c.message.contains("27017"));
    }

    #[test]
    fn verbose_lines_go_to_trace() {
        let json = r#"{"s":"D2","c":"COMMAND","msg":"Run command"}"#;
        assert_eq!(classify(json, Stream::Stdout, &ProcessOutput::default()).level, Level::TRACE);

        let plain = "2017-01-01T00:00:00.000+0000 D1 STORAGE  [initandlisten] flushing";
        assert_eq!(classify(plain, Stream::Stdout, &ProcessOutput::default()).level, Level::TRACE);
    }

    #[test]
    fn regular_output_uses_output_level() {
        let plain = "2017-01-01T00:00:00.000+0000 I CONTROL  [initandlisten] MongoDB starting";
        assert_eq!(classify(plain, Stream::Stdout, &ProcessOutput::default()).level, Level::DEBUG);
    }

    #[test]
    fn tail_keeps_last_lines() {
        let tail = OutputTail::default();
        for i in 0..(TAIL_LINES + 5) {
            tail.push(format!("line {}", i));
        }
        let lines = tail.lines();
        assert_eq!(lines.len(), TAIL_LINES);
        assert_eq!(lines[0], "line 5");
    }
}
