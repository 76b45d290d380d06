//! Incremental Server-Sent-Events parser.
//!
//! Parses the subset of the SSE framing the broker needs: `data:` lines
//! are collected and concatenated with `\n` across a record, records are
//! delimited by blank lines, and comment lines (starting `:`) as well as
//! `retry:` fields are ignored. `event:` and `id:` fields are carried on
//! the emitted record for inspection and diagnostics only; they play no
//! role in record selection.

/// A parsed SSE record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the last `id:` line, if any.
    pub id: Option<String>,
    /// Value of the last `event:` line, if any.
    pub event: Option<String>,
    /// Concatenated `data:` payload.
    pub data: String,
}

/// Streaming SSE parser. Feed it body chunks; complete records are
/// returned as they are delimited.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    data: Vec<String>,
    id: Option<String>,
    event: Option<String>,
}

impl SseParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the records completed by it. Partial lines
    /// are buffered across calls.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches('\n').trim_end_matches('\r');
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush the record in progress, if any. Call once the body is
    /// exhausted to tolerate streams that omit the final blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let trimmed = line.trim_end_matches('\r');
            if let Some(event) = self.process_line(trimmed) {
                return Some(event);
            }
        }
        self.flush()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.flush();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            // retry and unknown fields are ignored
            _ => {},
        }
        None
    }

    fn flush(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.id = None;
            self.event = None;
            return None;
        }
        Some(SseEvent {
            id: self.id.take(),
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}
