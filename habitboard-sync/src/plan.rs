use habitboard_core::HabitWriteEvent;

/// One store operation required by a habit write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOp {
    /// Merge a profile stub into `users/{uid}`.
    EnsureProfile { uid: String },
    /// Copy `users/{uid}.totalXP` into `leaderboards/global.entries[uid]`.
    SyncLeaderboardEntry { uid: String },
}

impl SyncOp {
    pub fn uid(&self) -> &str {
        match self {
            Self::EnsureProfile { uid } | Self::SyncLeaderboardEntry { uid } => uid,
        }
    }
}

/// Decide which store operations a habit write needs.
///
/// Deletions produce an empty plan: leaderboard entries are left as they
/// were.
pub fn plan_habit_write(event: &HabitWriteEvent) -> anyhow::Result<Vec<SyncOp>> {
    if event.is_deletion() {
        return Ok(Vec::new());
    }

    let uid = event.uid();
    if uid.is_empty() {
        anyhow::bail!(
            "habit write for `{}` has an empty uid",
            event.habit_id()
        );
    }

    Ok(vec![
        SyncOp::EnsureProfile {
            uid: uid.to_owned(),
        },
        SyncOp::SyncLeaderboardEntry {
            uid: uid.to_owned(),
        },
    ])
}

#[cfg(test)]
mod tests {
    use habitboard_core::HabitWriteEvent;
    use serde_json::{Map, json};

    use super::{SyncOp, plan_habit_write};

    fn habit() -> Option<Map<String, serde_json::Value>> {
        match json!({ "title": "Read", "done": true }) {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        }
    }

    #[test]
    fn writes_plan_profile_then_leaderboard() {
        let created = HabitWriteEvent::new("alice", "read", None, habit());
        let updated = HabitWriteEvent::new("alice", "read", habit(), habit());

        let expected = vec![
            SyncOp::EnsureProfile {
                uid: "alice".to_owned(),
            },
            SyncOp::SyncLeaderboardEntry {
                uid: "alice".to_owned(),
            },
        ];
        assert_eq!(plan_habit_write(&created).unwrap(), expected);
        assert_eq!(plan_habit_write(&updated).unwrap(), expected);
        assert!(expected.iter().all(|op| op.uid() == "alice"));
    }

    #[test]
    fn deletions_plan_nothing() {
        let deleted = HabitWriteEvent::new("alice", "read", habit(), None);
        assert!(plan_habit_write(&deleted).unwrap().is_empty());
    }

    #[test]
    fn empty_uid_is_rejected() {
        let event = HabitWriteEvent::new("", "read", None, habit());
        assert!(plan_habit_write(&event).is_err());
    }
}
