pub mod auth;
pub mod game;
pub mod jwt;
pub mod leaderboard;
pub mod middleware;
pub mod rate_limit;
pub mod server;
pub mod stats;

pub use server::{build_router, run_api_server};
