//! Structured JSON logger
//!
//! - One log line = one event
//! - Keys in order: `event`, `severity`, `ts`, then caller fields sorted by key
//! - INFO and below go to stdout, WARN and above to stderr
//! - Synchronous, no buffering

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{SecondsFormat, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Info,
    Warn,
    Error,
}

impl Severity {
    const ALL: [Severity; 4] = [Severity::Trace, Severity::Info, Severity::Warn, Severity::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    fn to_stderr(self) -> bool {
        self >= Severity::Warn
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown log level: {}", s))
    }
}

static MIN_SEVERITY: AtomicU8 = AtomicU8::new(Severity::Info as u8);

/// Process-wide JSON line logger
pub struct Logger;

impl Logger {
    /// Drop events below `severity` from now on.
    pub fn set_min_severity(severity: Severity) {
        MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
    }

    pub fn min_severity() -> Severity {
        let raw = MIN_SEVERITY.load(Ordering::Relaxed) as usize;
        Severity::ALL[raw.min(Severity::ALL.len() - 1)]
    }

    pub fn enabled(severity: Severity) -> bool {
        severity >= Self::min_severity()
    }

    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !Self::enabled(severity) {
            return;
        }
        let line = render(severity, event, fields);
        if severity.to_stderr() {
            emit_line(&mut io::stderr().lock(), &line);
        } else {
            emit_line(&mut io::stdout().lock(), &line);
        }
    }

    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }
}

/// Logging must never fail the caller, so write errors are dropped.
fn emit_line<W: Write>(out: &mut W, line: &str) {
    let _ = out.write_all(line.as_bytes());
    let _ = out.flush();
}

fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    let mut line = String::with_capacity(128 + fields.len() * 32);
    line.push('{');
    push_pair(&mut line, "event", event);
    line.push(',');
    push_pair(&mut line, "severity", severity.as_str());
    line.push(',');
    push_pair(&mut line, "ts", &ts);

    let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in sorted {
        line.push(',');
        push_pair(&mut line, key, value);
    }
    line.push_str("}\n");
    line
}

fn push_pair(line: &mut String, key: &str, value: &str) {
    push_json_str(line, key);
    line.push(':');
    push_json_str(line, value);
}

fn push_json_str(line: &mut String, s: &str) {
    match serde_json::to_string(s) {
        Ok(quoted) => line.push_str(&quoted),
        Err(_) => line.push_str("\"\""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> serde_json::Value {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
        assert!(Severity::Warn.to_stderr());
        assert!(!Severity::Info.to_stderr());
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("WARN".parse::<Severity>(), Ok(Severity::Warn));
        assert_eq!("trace".parse::<Severity>(), Ok(Severity::Trace));
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn test_render_line_shape() {
        let line = render(Severity::Info, "STORE_CONNECT", &[("location", "/tmp/a.db")]);
        assert!(line.starts_with("{\"event\":\"STORE_CONNECT\",\"severity\":\"INFO\",\"ts\":\""));
        assert!(line.ends_with("}\n"));

        let parsed = parse(&line);
        assert_eq!(parsed["location"], "/tmp/a.db");
        assert!(parsed["ts"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_fields_sorted_after_fixed_keys() {
        let line = render(Severity::Info, "E", &[("zebra", "1"), ("apple", "2"), ("mango", "3")]);
        let ts = line.find("\"ts\"").unwrap();
        let apple = line.find("apple").unwrap();
        let mango = line.find("mango").unwrap();
        let zebra = line.find("zebra").unwrap();
        assert!(ts < apple && apple < mango && mango < zebra);
    }

    #[test]
    fn test_special_chars_stay_on_one_line() {
        let line = render(Severity::Warn, "E", &[("message", "hello \"world\"\nline2\u{1}")]);
        assert_eq!(parse(&line)["message"], "hello \"world\"\nline2\u{1}");
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_emit_line_writes_whole_line() {
        let mut buffer = Vec::new();
        emit_line(&mut buffer, "{\"event\":\"E\"}\n");
        assert_eq!(buffer, b"{\"event\":\"E\"}\n");
    }
}
