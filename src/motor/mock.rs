// In-memory `LineChannel` for tests
//
// Records every line written and answers requests from a canned table.
// Requests without a canned answer get an empty reply, like a timeout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::odrive::{ProtocolError, Result};
use super::serial::LineChannel;

#[derive(Clone, Default)]
pub struct MockLink {
    sent: Arc<Mutex<Vec<String>>>,
    responses: Arc<Mutex<HashMap<String, String>>>,
    // Writes containing this text fail; "" fails every write
    failing: Arc<Mutex<Option<String>>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `request` with `response` from now on
    pub fn respond(&self, request: &str, response: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(request.to_string(), response.to_string());
    }

    /// Make every later write fail as if the cable was pulled
    pub fn break_link(&self) {
        self.fail_lines_containing("");
    }

    /// Make later writes fail only when the line contains `text`
    pub fn fail_lines_containing(&self, text: &str) {
        *self.failing.lock().unwrap() = Some(text.to_string());
    }

    /// Everything written so far, in order
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, line: &str) -> usize {
        self.sent().iter().filter(|l| *l == line).count()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    fn record(&self, line: &str) -> Result<()> {
        let failing = self.failing.lock().unwrap().clone();
        if failing.is_some_and(|text| line.contains(&text)) {
            return Err(ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "link down",
            )));
        }
        self.sent.lock().unwrap().push(line.to_string());
        Ok(())
    }
}

impl LineChannel for MockLink {
    fn send(&mut self, line: &str) -> Result<()> {
        self.record(line)
    }

    fn send_and_receive(&mut self, line: &str, _timeout: Duration) -> Result<String> {
        self.record(line)?;
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(line)
            .cloned()
            .unwrap_or_default())
    }
}
