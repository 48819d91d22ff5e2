use anyhow::Context as _;
use serde_json::Number;
use tracing::{debug, info};

use habitboard_core::{Data, HabitWriteEvent};
use habitboard_database::impls::leaderboard::sync_leaderboard_entry;
use habitboard_database::impls::profiles::ensure_profile;

use crate::plan::{SyncOp, plan_habit_write};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing to do (the habit was deleted).
    Skipped,
    Synced { uid: String, total_xp: Number },
}

/// Handle one habit write end to end.
pub async fn handle_habit_write(
    data: &Data,
    event: &HabitWriteEvent,
) -> anyhow::Result<SyncOutcome> {
    let ops = plan_habit_write(event)?;
    if ops.is_empty() {
        debug!(
            uid = event.uid(),
            habit_id = event.habit_id(),
            "habit deleted; leaderboard left unchanged"
        );
        return Ok(SyncOutcome::Skipped);
    }

    let outcome = apply_plan(data, &ops).await?;
    if let SyncOutcome::Synced { uid, total_xp } = &outcome {
        info!(
            uid = %uid,
            total_xp = %total_xp,
            habit_id = event.habit_id(),
            kind = ?event.kind(),
            "leaderboard entry synced"
        );
    }

    Ok(outcome)
}

/// Execute planned operations in order, stopping at the first failure.
pub async fn apply_plan(data: &Data, ops: &[SyncOp]) -> anyhow::Result<SyncOutcome> {
    let mut outcome = SyncOutcome::Skipped;

    for op in ops {
        debug!(uid = op.uid(), ?op, "applying sync op");
        match op {
            SyncOp::EnsureProfile { uid } => {
                ensure_profile(&data.db, uid).await?;
            }
            SyncOp::SyncLeaderboardEntry { uid } => {
                let total_xp = sync_leaderboard_entry(&data.db, uid)
                    .await
                    .context("leaderboard transaction failed")?;
                outcome = SyncOutcome::Synced {
                    uid: uid.clone(),
                    total_xp,
                };
            }
        }
    }

    Ok(outcome)
}
