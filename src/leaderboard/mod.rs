//! Leaderboard recompute, coalesced broadcast and freeze policy

pub mod controller;

pub use controller::LeaderboardController;
