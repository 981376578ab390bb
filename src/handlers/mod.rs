// src/handlers/mod.rs

pub mod health;
pub mod session;
pub mod signals;
pub mod verification;
