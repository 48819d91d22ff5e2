pub mod leaderboard;
pub mod profile;

mod lenient;
