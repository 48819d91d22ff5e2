use anyhow::Context as _;

use crate::database::Database;
use crate::model::profile::{DEFAULT_DISPLAY_NAME, USERS_COLLECTION};
use crate::store::{DocumentPath, DocumentWrite};

pub fn profile_path(uid: &str) -> DocumentPath {
    DocumentPath::new(USERS_COLLECTION, uid)
}

/// Make sure `users/{uid}` exists with a `totalXP` field, without reading it
/// first. Only `displayName` is overwritten; every other field survives.
pub async fn ensure_profile(db: &Database, uid: &str) -> anyhow::Result<()> {
    let write = DocumentWrite::merge(profile_path(uid))
        .set("displayName", DEFAULT_DISPLAY_NAME)
        .increment("totalXP", 0);

    db.store()
        .merge(write)
        .await
        .with_context(|| format!("failed to upsert profile for `{uid}`"))
}
