//! Order-book depth update.
//!
//! Wire form (extra fields are ignored):
//!
//! ```json
//! {"u": 160, "b": [["0.0024", "10"]], "a": [["0.0026", "100"]]}
//! ```
//!
//! Prices and quantities stay decimal strings; nothing here parses them
//! into floats.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// PriceLevel
// ============================================================================

/// One `[price, quantity]` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct PriceLevel {
    /// Price as sent by the venue.
    pub price: String,
    /// Quantity as sent by the venue.
    pub quantity: String,
}

impl PriceLevel {
    /// Creates a level.
    #[inline]
    #[must_use]
    pub fn new(price: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self {
            price: price.into(),
            quantity: quantity.into(),
        }
    }
}

impl From<(String, String)> for PriceLevel {
    fn from((price, quantity): (String, String)) -> Self {
        Self { price, quantity }
    }
}

impl From<PriceLevel> for (String, String) {
    fn from(level: PriceLevel) -> Self {
        (level.price, level.quantity)
    }
}

// ============================================================================
// DepthUpdate
// ============================================================================

/// Incremental order-book depth update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthUpdate {
    /// Final update id in this event.
    #[serde(rename = "u")]
    pub last_update_id: i64,

    /// Bid levels, best first.
    #[serde(rename = "b", default)]
    pub bids: Vec<PriceLevel>,

    /// Ask levels, best first.
    #[serde(rename = "a", default)]
    pub asks: Vec<PriceLevel>,
}

/// Borrowing view used by [`DepthUpdate::decode_into`].
#[derive(Deserialize)]
struct RawDepth<'a> {
    #[serde(rename = "u")]
    last_update_id: i64,
    #[serde(rename = "b", default, borrow)]
    bids: Vec<RawLevel<'a>>,
    #[serde(rename = "a", default, borrow)]
    asks: Vec<RawLevel<'a>>,
}

#[derive(Deserialize)]
struct RawLevel<'a>(#[serde(borrow)] Cow<'a, str>, #[serde(borrow)] Cow<'a, str>);

impl DepthUpdate {
    /// Decodes a fresh update from a frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if `payload` is not a depth update.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| Error::decode(e.to_string()))
    }

    /// Decodes `payload` into `self`, reusing the level vectors.
    ///
    /// On error `self` is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if `payload` is not a depth update.
    pub fn decode_into(&mut self, payload: &[u8]) -> Result<()> {
        let raw: RawDepth<'_> =
            serde_json::from_slice(payload).map_err(|e| Error::decode(e.to_string()))?;

        self.last_update_id = raw.last_update_id;
        fill(&mut self.bids, raw.bids);
        fill(&mut self.asks, raw.asks);
        Ok(())
    }

    /// Clears every field. Used as the pool reset function.
    pub fn reset(&mut self) {
        self.last_update_id = 0;
        self.bids.clear();
        self.asks.clear();
    }

    /// Highest bid, if any.
    #[inline]
    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Lowest ask, if any.
    #[inline]
    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Returns `true` if the update carries no levels.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

fn fill(levels: &mut Vec<PriceLevel>, raw: Vec<RawLevel<'_>>) {
    levels.clear();
    levels.extend(
        raw.into_iter()
            .map(|RawLevel(price, quantity)| PriceLevel::new(price, quantity)),
    );
}

// ============================================================================
// Tests
// ============================================================================
