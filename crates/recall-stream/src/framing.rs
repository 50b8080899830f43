const DATA_PREFIX: &str = "data:";

/// One complete upstream record: its `data:` lines joined with `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent(pub String);

impl RawEvent {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Line-oriented record framer.
///
/// `carry` never contains a newline; `data_lines` never spans a completed
/// blank-line boundary.
#[derive(Debug, Default)]
pub struct EventFramer {
    carry: String,
    data_lines: Vec<String>,
}

impl EventFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends decoded text and returns every record completed by it.
    pub fn feed(&mut self, text: &str) -> Vec<RawEvent> {
        self.carry.push_str(text);
        let Some(last_newline) = self.carry.rfind('\n') else {
            return Vec::new();
        };
        let complete: String = self.carry.drain(..=last_newline).collect();
        let mut events = Vec::new();
        for line in complete.split_terminator('\n') {
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Called once at end of stream; emits a record left unterminated.
    ///
    /// Returns an empty list when every record already saw its blank line.
    pub fn flush(&mut self) -> Vec<RawEvent> {
        let mut events = Vec::new();
        if !self.carry.is_empty() {
            let line = std::mem::take(&mut self.carry);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        if let Some(event) = self.take_event() {
            events.push(event);
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<RawEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return self.take_event();
        }
        if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            // An empty remainder is still a payload line.
            self.data_lines.push(rest.trim_start().to_string());
        }
        None
    }

    fn take_event(&mut self) -> Option<RawEvent> {
        if self.data_lines.is_empty() {
            return None;
        }
        let payload = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(RawEvent(payload))
    }
}
