use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SlotId = i64;
pub type BannerId = i64;
pub type SocialGroupId = i64;

/// Placement on a page where exactly one banner is shown at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub description: String,
}

/// Content candidate that can be rotated through slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banner {
    pub id: BannerId,
    pub description: String,
}

/// Audience partition, e.g. "women 20-25" or "grandfathers 80+".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialGroup {
    pub id: SocialGroupId,
    pub description: String,
}

/// Per-banner show/click counts for one (slot, social group) pair.
/// Derived on every read, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerSummary {
    pub banner_id: BannerId,
    pub slot_id: SlotId,
    pub social_group_id: SocialGroupId,
    pub show_count: u64,
    pub click_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Show,
    Click,
}

impl std::fmt::Display for StatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatKind::Show => f.write_str("show"),
            StatKind::Click => f.write_str("click"),
        }
    }
}

/// Immutable show or click fact from the append-only event logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatEvent {
    pub kind: StatKind,
    pub banner_id: BannerId,
    pub slot_id: SlotId,
    pub social_group_id: SocialGroupId,
    pub timestamp: DateTime<Utc>,
}

/// Wire shape of one exported show/click event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    #[serde(rename = "type")]
    pub kind: StatKind,
    pub banner_id: BannerId,
    pub slot_id: SlotId,
    pub social_group_id: SocialGroupId,
    pub timestamp: DateTime<Utc>,
}

impl From<&StatEvent> for OutcomeRecord {
    fn from(event: &StatEvent) -> Self {
        Self {
            kind: event.kind,
            banner_id: event.banner_id,
            slot_id: event.slot_id,
            social_group_id: event.social_group_id,
            timestamp: event.timestamp,
        }
    }
}
