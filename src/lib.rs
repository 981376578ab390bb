// src/lib.rs

pub mod clients;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod session;
pub mod state;
pub mod utils;

#[cfg(test)]
pub mod test_utils;

// Re-export specific items for convenience if needed
pub use routes::create_router;
