pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod session;
pub mod state;
