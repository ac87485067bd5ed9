//! Console facade
//!
//! Scripting values arrive already stringified through their `Display`
//! form and are space-joined into one line per call.

use crate::inspect::ConsoleMessage;
use crate::script::ScriptValue;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
}

pub struct Console {
    sink: Mutex<Box<dyn Write + Send>>,
    retain: bool,
    entries: Mutex<Vec<ConsoleMessage>>,
}

impl Console {
    /// Console writing to stdout
    pub fn new() -> Self {
        Self::with_sink(io::stdout())
    }

    pub fn with_sink(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Mutex::new(Box::new(sink)),
            retain: false,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Keep entries for the inspector log domain
    pub fn retaining(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn log(&self, values: &[ScriptValue]) {
        self.emit(ConsoleLevel::Log, values);
    }

    pub fn info(&self, values: &[ScriptValue]) {
        self.emit(ConsoleLevel::Info, values);
    }

    pub fn warn(&self, values: &[ScriptValue]) {
        self.emit(ConsoleLevel::Warn, values);
    }

    pub fn error(&self, values: &[ScriptValue]) {
        self.emit(ConsoleLevel::Error, values);
    }

    /// Retained entries, oldest first
    pub fn entries(&self) -> Vec<ConsoleMessage> {
        self.entries.lock().clone()
    }

    pub fn take_entries(&self) -> Vec<ConsoleMessage> {
        std::mem::take(&mut *self.entries.lock())
    }

    fn emit(&self, level: ConsoleLevel, values: &[ScriptValue]) {
        let text = values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");

        match level {
            ConsoleLevel::Log | ConsoleLevel::Info => info!(event = "console", ?level, "{}", text),
            ConsoleLevel::Warn => warn!(event = "console", ?level, "{}", text),
            ConsoleLevel::Error => error!(event = "console", ?level, "{}", text),
        }

        {
            let mut sink = self.sink.lock();
            if let Err(err) = writeln!(sink, "{}", text).and_then(|()| sink.flush()) {
                debug!(event = "console_write_failed", error = %err, "console sink rejected output");
            }
        }

        if self.retain {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0.0, |d| d.as_secs_f64() * 1000.0);
            self.entries.lock().push(ConsoleMessage {
                level,
                text,
                timestamp,
            });
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}
