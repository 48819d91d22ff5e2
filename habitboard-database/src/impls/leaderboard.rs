use anyhow::Context as _;
use serde_json::{Number, Value};

use crate::database::Database;
use crate::impls::profiles::profile_path;
use crate::model::leaderboard::{
    GLOBAL_LEADERBOARD_ID, LEADERBOARDS_COLLECTION, Leaderboard, LeaderboardEntry,
};
use crate::model::profile::UserProfile;
use crate::store::{Document, DocumentPath, DocumentWrite};

pub fn global_leaderboard_path() -> DocumentPath {
    DocumentPath::new(LEADERBOARDS_COLLECTION, GLOBAL_LEADERBOARD_ID)
}

/// Copy the user's current `totalXP` into the global leaderboard inside one
/// transaction and return the value written.
///
/// The aggregate is part of the read set so concurrent syncs conflict and
/// retry, but only `entries.{uid}` is written; every other entry keeps its
/// stored bytes.
pub async fn sync_leaderboard_entry(db: &Database, uid: &str) -> anyhow::Result<Number> {
    let board_path = global_leaderboard_path();
    let user_path = profile_path(uid);
    let reads = [board_path.clone(), user_path.clone()];

    db.store()
        .run_transaction(&reads, |tx| {
            let profile: UserProfile = tx.get_as(&user_path)?;
            let entry = LeaderboardEntry {
                total_xp: profile.total_xp,
            };

            let mut entries = Document::new();
            entries.insert(uid.to_owned(), serde_json::to_value(&entry)?);
            tx.merge(
                DocumentWrite::merge(board_path.clone()).set("entries", Value::Object(entries)),
            );

            Ok(entry.total_xp)
        })
        .await
        .with_context(|| format!("failed to sync leaderboard entry for `{uid}`"))
}

pub async fn get_global_leaderboard(db: &Database) -> anyhow::Result<Leaderboard> {
    db.store().get_as(&global_leaderboard_path()).await
}
