//! Subscription registry used for replay after reconnect.

// ============================================================================
// Imports
// ============================================================================

use std::mem;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Subscription
// ============================================================================

/// A recorded subscription: the payload and its exact wire form.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    payload: Value,
    wire: String,
}

impl Subscription {
    /// Serializes `payload` into a subscription entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn new<T: Serialize + ?Sized>(payload: &T) -> Result<Self> {
        let wire = serde_json::to_string(payload)?;
        let payload = serde_json::to_value(payload)?;
        Ok(Self { payload, wire })
    }

    /// Payload as a JSON value.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Exact text sent on the wire.
    #[inline]
    #[must_use]
    pub fn wire(&self) -> &str {
        &self.wire
    }
}

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// Insertion-ordered record of active subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Vec<Subscription>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    #[inline]
    pub fn push(&mut self, entry: Subscription) {
        self.entries.push(entry);
    }

    /// Moves every entry out, leaving the registry empty.
    ///
    /// The returned vector is the full snapshot taken before clearing.
    #[inline]
    #[must_use]
    pub fn take(&mut self) -> Vec<Subscription> {
        mem::take(&mut self.entries)
    }

    /// Copies the current entries.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.entries.clone()
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been subscribed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[derive(Serialize)]
    struct Request<'a> {
        method: &'a str,
        params: Vec<&'a str>,
        id: u32,
    }

    #[test]
    fn test_wire_keeps_field_order() {
        let entry = Subscription::new(&Request {
            method: "SUBSCRIBE",
            params: vec!["btcusdt@depth"],
            id: 1,
        })
        .unwrap();

        assert_eq!(
            entry.wire(),
            r#"{"method":"SUBSCRIBE","params":["btcusdt@depth"],"id":1}"#
        );
        assert_eq!(entry.payload()["id"], json!(1));
    }

    #[test]
    fn test_take_snapshots_before_clearing() {
        let mut registry = SubscriptionRegistry::new();
        for id in 0..3 {
            registry.push(Subscription::new(&json!({ "id": id })).unwrap());
        }

        let taken = registry.take();
        assert_eq!(taken.len(), 3);
        assert!(registry.is_empty());

        let ids: Vec<_> = taken.iter().map(|s| s.payload()["id"].clone()).collect();
        assert_eq!(ids, vec![json!(0), json!(1), json!(2)]);
    }

    #[test]
    fn test_snapshot_leaves_entries() {
        let mut registry = SubscriptionRegistry::new();
        registry.push(Subscription::new("ping").unwrap());

        assert_eq!(registry.snapshot().len(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.iter().next().unwrap().wire(), "\"ping\"");
    }
}
