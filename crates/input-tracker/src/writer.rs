//! Append-only cursor log writer.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use capsync_common::config::CursorLogFormat;
use capsync_common::error::{CapsyncError, CapsyncResult};
use capsync_project_model::event::{CursorEvent, CursorLogHeader};

/// Writes cursor events to disk in either JSONL or JSON-array form.
pub struct EventWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    format: CursorLogFormat,
    flush_every: u64,
    events_written: u64,
    finished: bool,
}

impl EventWriter {
    /// Create the log file and write the opening: a `# {header}` line for
    /// JSONL, `[` for the array format.
    pub fn new(
        path: PathBuf,
        header: &CursorLogHeader,
        format: CursorLogFormat,
        flush_every: u64,
    ) -> CapsyncResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        let mut writer = BufWriter::new(file);

        match format {
            CursorLogFormat::Jsonl => {
                let header_json = serde_json::to_string(header)?;
                writeln!(writer, "# {header_json}").map_err(|e| {
                    CapsyncError::cursor_capture(format!("Failed to write header: {e}"))
                })?;
            }
            CursorLogFormat::JsonArray => {
                write!(writer, "[").map_err(|e| {
                    CapsyncError::cursor_capture(format!("Failed to open array: {e}"))
                })?;
            }
        }
        writer.flush()?;

        Ok(Self {
            writer,
            path,
            format,
            flush_every: flush_every.max(1),
            events_written: 0,
            finished: false,
        })
    }

    /// Append a single event.
    pub fn write_event(&mut self, event: &CursorEvent) -> CapsyncResult<()> {
        let json = serde_json::to_string(event)?;
        let result = match self.format {
            CursorLogFormat::Jsonl => writeln!(self.writer, "{json}"),
            CursorLogFormat::JsonArray if self.events_written == 0 => {
                write!(self.writer, "{json}")
            }
            CursorLogFormat::JsonArray => write!(self.writer, ",{json}"),
        };
        result.map_err(|e| CapsyncError::cursor_capture(format!("Failed to write event: {e}")))?;
        self.events_written += 1;

        if self.events_written % self.flush_every == 0 {
            self.flush()?;
        }

        Ok(())
    }

    /// Flush buffered writes to disk.
    pub fn flush(&mut self) -> CapsyncResult<()> {
        self.writer
            .flush()
            .map_err(|e| CapsyncError::cursor_capture(format!("Failed to flush events: {e}")))
    }

    /// Close the log. Closes the array for the array format.
    pub fn finish(&mut self) -> CapsyncResult<()> {
        if self.finished {
            return Ok(());
        }
        if self.format == CursorLogFormat::JsonArray {
            write!(self.writer, "]").map_err(|e| {
                CapsyncError::cursor_capture(format!("Failed to close array: {e}"))
            })?;
        }
        self.finished = true;
        self.flush()
    }

    /// Number of events written.
    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    /// Path to the output file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
