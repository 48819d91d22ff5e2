use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Path parameters bound by the `users/{uid}/habits/{hid}` trigger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitParams {
    pub uid: String,
    #[serde(rename = "hid")]
    pub habit_id: String,
}

/// A create, update or delete of one habit document.
///
/// `after` is `None` when the write deleted the document; `before` is `None`
/// when it created it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HabitWriteEvent {
    pub params: HabitParams,
    #[serde(default)]
    pub before: Option<Map<String, Value>>,
    #[serde(default)]
    pub after: Option<Map<String, Value>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl HabitWriteEvent {
    pub fn new(
        uid: impl Into<String>,
        habit_id: impl Into<String>,
        before: Option<Map<String, Value>>,
        after: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            params: HabitParams {
                uid: uid.into(),
                habit_id: habit_id.into(),
            },
            before,
            after,
        }
    }

    pub fn uid(&self) -> &str {
        &self.params.uid
    }

    pub fn habit_id(&self) -> &str {
        &self.params.habit_id
    }

    /// A write with neither side present is reported as a deletion.
    pub fn kind(&self) -> ChangeKind {
        match (&self.before, &self.after) {
            (_, None) => ChangeKind::Deleted,
            (None, Some(_)) => ChangeKind::Created,
            (Some(_), Some(_)) => ChangeKind::Updated,
        }
    }

    pub fn is_deletion(&self) -> bool {
        self.kind() == ChangeKind::Deleted
    }
}
