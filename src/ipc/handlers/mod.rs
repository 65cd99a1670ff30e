pub mod core;
pub mod gpa;
pub mod grades;
pub mod leaderboard;
pub mod setup;
