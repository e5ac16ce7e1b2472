use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller roles recognized by the order core. Role checks happen in the
/// orchestrator, not in transport middleware, so the rules hold for every
/// entry point (RPC, consumer, admin tooling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Buyer,
    Vendor,
    Admin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: Uuid, role: ActorRole) -> Self {
        Self { id, role }
    }
}
