//! In-process event relay between independently loaded modules.
//!
//! Anything may publish anything. Delivery is best effort: no buffering for
//! late subscribers, no replay, and a slow listener loses events. Listeners
//! only ever see events that have the shape of an intent.

use authority::Intent;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Default number of events a listener may fall behind by.
pub const DEFAULT_CAPACITY: usize = 64;

/// An intent that arrived over the relay, with its optional provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedIntent {
    pub intent: Intent,
    /// The module that published it, as claimed by the event.
    pub source: Option<String>,
    pub correlation_id: Option<String>,
}

/// Broadcast channel for untyped events.
#[derive(Debug, Clone)]
pub struct IntentRelay {
    tx: broadcast::Sender<Value>,
}

impl IntentRelay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns how many listeners it reached; zero is not
    /// an error.
    pub fn publish(&self, event: Value) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> IntentListener {
        IntentListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for IntentRelay {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiving end that filters the relay down to well-formed intents.
#[derive(Debug)]
pub struct IntentListener {
    rx: broadcast::Receiver<Value>,
}

impl IntentListener {
    /// Wait for the next well-formed intent. Returns `None` once every
    /// publisher is gone.
    pub async fn next_intent(&mut self) -> Option<RelayedIntent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => match parse_intent(&event) {
                    Some(intent) => return Some(intent),
                    None => tracing::debug!("dropping malformed intent event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "intent listener lagged, events lost");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIntentEvent {
    client_id: Option<String>,
    phone: Option<String>,
    source: Option<String>,
    correlation_id: Option<String>,
}

/// Minimal shape check: `clientId` and `phone` must be non-empty strings.
/// Anything else is not an intent.
pub fn parse_intent(event: &Value) -> Option<RelayedIntent> {
    let raw = RawIntentEvent::deserialize(event).ok()?;
    let intent = Intent::new(raw.client_id?, raw.phone?);
    if !intent.is_well_formed() {
        return None;
    }
    Some(RelayedIntent {
        intent,
        source: raw.source,
        correlation_id: raw.correlation_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_well_formed_event() {
        let event = json!({
            "correlationId": "corr-1",
            "source": "mf-a",
            "clientId": "C-100",
            "phone": "+79001234567",
        });
        let relayed = parse_intent(&event).unwrap();
        assert_eq!(relayed.intent, Intent::new("C-100", "+79001234567"));
        assert_eq!(relayed.source.as_deref(), Some("mf-a"));
        assert_eq!(relayed.correlation_id.as_deref(), Some("corr-1"));
    }

    #[test]
    fn rejects_malformed_events() {
        for event in [
            json!(null),
            json!("C-100"),
            json!({"clientId": "C-100"}),
            json!({"clientId": "", "phone": "+7"}),
            json!({"clientId": "C-100", "phone": 79001234567u64}),
            json!({"payload": {"filter": "vip"}}),
        ] {
            assert!(parse_intent(&event).is_none(), "{event}");
        }
    }

    #[tokio::test]
    async fn listener_skips_malformed_events() {
        let relay = IntentRelay::default();
        let mut listener = relay.subscribe();

        assert_eq!(relay.publish(json!({"payload": {"filter": "vip"}})), 1);
        relay.publish(json!({"clientId": "C-101", "phone": "+7"}));

        let relayed = listener.next_intent().await.unwrap();
        assert_eq!(relayed.intent.client_id, "C-101");
        assert!(relayed.source.is_none());
    }

    #[tokio::test]
    async fn closed_relay_ends_listener() {
        let relay = IntentRelay::default();
        let mut listener = relay.subscribe();
        drop(relay);
        assert!(listener.next_intent().await.is_none());
    }

    #[test]
    fn publishing_without_listeners_is_fine() {
        let relay = IntentRelay::default();
        assert_eq!(relay.publish(json!({"clientId": "C-100", "phone": "+7"})), 0);
    }
}
