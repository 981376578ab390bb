// src/models/mod.rs

pub mod exam;
pub mod section;
pub mod session;
pub mod submission;
pub mod telemetry;
pub mod violation;
