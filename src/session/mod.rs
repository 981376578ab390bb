// src/session/mod.rs

pub mod actor;
pub mod controller;
pub mod locking;
pub mod proctoring;
pub mod registry;
pub mod timer;
pub mod verification;

pub use actor::SessionHandle;
pub use controller::{Collaborators, SessionController};
pub use registry::SessionRegistry;
