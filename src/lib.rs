pub mod api;
pub mod class;
pub mod config;
pub mod db;
pub mod error;
pub mod leaderboard;
pub mod notification;
pub mod profile;
pub mod quiz;
pub mod stats;
pub mod subscribe;
pub mod syllabus;
pub mod utils;
