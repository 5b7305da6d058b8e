//! Local console sink.

use std::io::{self, Write};

use crate::domain::StreamKind;
use crate::ports::OutputSink;

/// Writes straight to the process's real stdout or stderr.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    kind: StreamKind,
}

impl ConsoleSink {
    pub fn new(kind: StreamKind) -> Self {
        Self { kind }
    }
}

impl OutputSink for ConsoleSink {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        match self.kind {
            StreamKind::Stdout => io::stdout().lock().write_all(buf)?,
            StreamKind::Stderr => io::stderr().lock().write_all(buf)?,
        }
        Ok(buf.len())
    }

    fn flush(&self) -> io::Result<()> {
        match self.kind {
            StreamKind::Stdout => io::stdout().flush(),
            StreamKind::Stderr => io::stderr().flush(),
        }
    }
}
