//! # LogWriter: build log sink
//!
//! Renders every [`Event`] as one line of the build log:
//! - supervisory events as `[<tag>] <message>`;
//! - service stdout/stderr lines verbatim, without a prefix.
//!
//! ## Example output
//! ```text
//! [MongoDB] Prepared data directory /ws/data/db
//! [MongoDB] Executing mongodb start command: [/usr/bin/mongod, --logpath, /ws/mongodb.log, ...]
//! [MongoDB] mongodb process started (pid 4242)
//! [MongoDB] Starting... (waiting up to 15000 ms for localhost:27017)
//! [MongoDB] Server ready at localhost:27017
//! [MongoDB] Killing mongodb process...
//! ```

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::events::Event;
use crate::subscribers::Subscribe;

/// Writes events to a line-oriented sink.
pub struct LogWriter {
    tag: String,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl LogWriter {
    /// Writes to the process's stdout.
    #[must_use]
    pub fn stdout(tag: impl Into<String>) -> Self {
        Self::to_writer(tag, io::stdout())
    }

    /// Writes to an arbitrary sink.
    #[must_use]
    pub fn to_writer(tag: impl Into<String>, sink: impl Write + Send + 'static) -> Self {
        Self {
            tag: tag.into(),
            sink: Mutex::new(Box::new(sink)),
        }
    }

    /// Renders the log line for `e`, without trailing newline.
    pub fn render(&self, e: &Event) -> String {
        if e.is_process_output() {
            e.message()
        } else {
            format!("[{}] {}", self.tag, e.message())
        }
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let line = self.render(e);
        let mut sink = match self.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = writeln!(sink, "{line}").and_then(|()| sink.flush()) {
            tracing::warn!(error = %err, "failed to write build log line");
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }

    fn queue_capacity(&self) -> usize {
        4096
    }
}

/// In-memory, cloneable build log. Useful to capture what a [`LogWriter`] wrote.
#[derive(Clone, Default, Debug)]
pub struct MemoryLog {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemoryLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, as text.
    pub fn contents(&self) -> String {
        let buf = match self.buf.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Everything written so far, split into lines.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for MemoryLog {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = match self.buf.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
