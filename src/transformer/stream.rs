//! Streaming utilities for SSE (Server-Sent Events).
//!
//! This module parses the upstream provider's SSE byte stream into events and
//! serializes the gateway's own events for transmission to callers.

// ============================================================================
// SSE Parser
// ============================================================================

/// SSE event parsed from stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: Option<String>,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

/// SSE parser state.
///
/// Bytes are buffered until a full event block is available, so multi-byte
/// UTF-8 sequences split across network chunks decode correctly.
#[derive(Debug)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// Create a new SSE parser.
    pub fn new() -> Self {
        SseParser { buffer: Vec::new() }
    }

    /// Parse incoming bytes and return complete events.
    pub fn parse(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer
            .extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = vec![];

        // Split by double newlines (event boundaries)
        while let Some(pos) = find_boundary(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            let block = String::from_utf8_lossy(&block[..pos]);

            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }

        events
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let block = std::mem::take(&mut self.buffer);
        parse_block(&String::from_utf8_lossy(&block))
    }

    /// Get remaining buffer content.
    pub fn remaining(&self) -> &[u8] {
        &self.buffer
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

fn find_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut current_event = SseEvent::default();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => current_event.event = Some(value.to_string()),
            "data" => {
                if let Some(ref mut data) = current_event.data {
                    data.push('\n');
                    data.push_str(value);
                } else {
                    current_event.data = Some(value.to_string());
                }
            }
            "id" => current_event.id = Some(value.to_string()),
            "retry" => current_event.retry = value.parse().ok(),
            _ => {}
        }
    }

    if current_event.data.is_some() || current_event.event.is_some() {
        Some(current_event)
    } else {
        None
    }
}

// ============================================================================
// SSE Serializer
// ============================================================================

/// Format an SSE event for transmission.
pub fn format_sse_event(event: Option<&str>, data: &str) -> String {
    let mut output = String::new();

    if let Some(event_name) = event {
        output.push_str("event: ");
        output.push_str(event_name);
        output.push('\n');
    }

    for line in data.lines() {
        output.push_str("data: ");
        output.push_str(line);
        output.push('\n');
    }

    output.push('\n');
    output
}

/// Format a simple data-only SSE event.
pub fn format_sse_data(data: &str) -> String {
    format!("data: {}\n\n", data)
}
