use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::lenient;

pub const LEADERBOARDS_COLLECTION: &str = "leaderboards";
pub const GLOBAL_LEADERBOARD_ID: &str = "global";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    #[serde(
        rename = "totalXP",
        default = "lenient::zero_xp",
        deserialize_with = "lenient::xp"
    )]
    pub total_xp: Number,
}

/// Denormalized `leaderboards/{id}` aggregate keyed by user id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    #[serde(default, deserialize_with = "lenient::entries")]
    pub entries: BTreeMap<String, LeaderboardEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Leaderboard {
    pub fn total_xp(&self, uid: &str) -> Option<&Number> {
        self.entries.get(uid).map(|entry| &entry.total_xp)
    }
}
