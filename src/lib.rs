pub mod config;
pub mod counter;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod progress;
pub mod server;
pub mod session;
pub mod sink;
pub mod state;
pub mod utils;
