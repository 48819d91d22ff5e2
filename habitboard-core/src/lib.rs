pub mod event;

use habitboard_database::Database;

pub use event::HabitWriteEvent;

pub type Error = anyhow::Error;

/// Shared state handed to every handler invocation.
#[derive(Clone, Debug)]
pub struct Data {
    pub db: Database,
}

impl Data {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}
