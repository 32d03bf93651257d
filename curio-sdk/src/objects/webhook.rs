//! Payment gateway webhook payload.
//!
//! Only the fields needed to locate the affected object are modelled. The
//! payload is never trusted on its own: the referenced charge is fetched
//! back from the gateway before any order is touched.

use serde::{Deserialize, Serialize};

/// Event key sent when a charge reaches a final state.
pub const CHARGE_COMPLETE: &str = "charge.complete";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    pub key: String,
    pub data: GatewayEventData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEventData {
    pub object: String,
    pub id: String,
}

impl GatewayEvent {
    /// The charge id this event reports on, if it is a charge completion.
    pub fn completed_charge_id(&self) -> Option<&str> {
        (self.key == CHARGE_COMPLETE && self.data.object == "charge").then_some(self.data.id.as_str())
    }
}
