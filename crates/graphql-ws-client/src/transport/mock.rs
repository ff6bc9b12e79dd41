//! Scripted in-memory transport for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use super::{EventHandler, Transport, TransportEvent};
use crate::error::{Error, Result};

pub(crate) const ACK: &str = r#"{"type":"connection_ack"}"#;

/// Records outbound frames and lets tests inject inbound events.
pub(crate) struct MockTransport {
    handler: Mutex<Option<EventHandler>>,
    script: Vec<TransportEvent>,
    sent: Mutex<Vec<String>>,
    fail_sends: AtomicBool,
    stop_calls: AtomicUsize,
}

impl MockTransport {
    /// A transport that delivers `script` synchronously from `start`.
    pub(crate) fn scripted(script: Vec<TransportEvent>) -> Self {
        Self {
            handler: Mutex::new(None),
            script,
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            stop_calls: AtomicUsize::new(0),
        }
    }

    /// A transport whose server acknowledges immediately.
    pub(crate) fn acking() -> Self {
        Self::scripted(vec![
            TransportEvent::Open,
            TransportEvent::Message(ACK.to_string()),
        ])
    }

    /// Deliver an event to the installed handler.
    pub(crate) fn deliver(&self, event: TransportEvent) -> Result<()> {
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => handler(event),
            None => Err(Error::NotConnected),
        }
    }

    /// Deliver a text frame.
    pub(crate) fn deliver_text(&self, text: &str) -> Result<()> {
        self.deliver(TransportEvent::Message(text.to_string()))
    }

    /// Deliver a JSON document as a text frame.
    pub(crate) fn deliver_json(&self, value: Value) -> Result<()> {
        self.deliver_text(&value.to_string())
    }

    /// All frames sent so far, parsed as JSON.
    pub(crate) fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    /// Sent frames with the given `type`.
    pub(crate) fn sent_of_type(&self, message_type: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|message| message["type"] == message_type)
            .collect()
    }

    /// Make subsequent sends fail.
    pub(crate) fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn has_handler(&self) -> bool {
        self.handler.lock().is_some()
    }
}

impl Transport for MockTransport {
    fn start(&self, handler: EventHandler) -> Result<()> {
        *self.handler.lock() = Some(handler);
        for event in self.script.clone() {
            // Script errors surface through the engine's handshake.
            let _ = self.deliver(event);
        }
        Ok(())
    }

    fn send_text(&self, text: String) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Transport("send failed".into()));
        }
        self.sent.lock().push(text);
        Ok(())
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.handler.lock().take();
    }
}
