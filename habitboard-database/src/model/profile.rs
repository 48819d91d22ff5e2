use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::lenient;

pub const USERS_COLLECTION: &str = "users";
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// `users/{uid}`. Fields this service does not own are carried in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(
        rename = "displayName",
        default = "default_display_name",
        deserialize_with = "lenient::display_name"
    )]
    pub display_name: String,
    /// Copied through unchanged; integers and fractions alike.
    #[serde(
        rename = "totalXP",
        default = "lenient::zero_xp",
        deserialize_with = "lenient::xp"
    )]
    pub total_xp: Number,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            total_xp: lenient::zero_xp(),
            extra: Map::new(),
        }
    }
}

fn default_display_name() -> String {
    DEFAULT_DISPLAY_NAME.to_owned()
}
