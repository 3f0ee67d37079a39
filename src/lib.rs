pub mod api;
pub mod leaderboard;
pub mod progress;
pub mod seed;
pub mod session;
pub mod stats;
pub mod store;
pub mod user_locks;
