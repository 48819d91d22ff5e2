//! Keeps the global leaderboard in step with habit writes.
//!
//! Handling is split in two: [`plan_habit_write`] turns an event into the
//! store operations it needs, and [`apply_plan`] runs them against the
//! shared [`Data`](habitboard_core::Data).

pub mod handler;
pub mod plan;

pub use handler::{SyncOutcome, apply_plan, handle_habit_write};
pub use plan::{SyncOp, plan_habit_write};
