pub mod claims;
pub mod config;
pub mod database;
pub mod models;
pub mod render;
pub mod session;
pub mod startup;
pub mod tokens;
pub mod utils;
pub mod web;

pub use utils::state;
