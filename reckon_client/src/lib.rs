//! `reckon_client`
//!
//! Dead reckoning for entities simulated elsewhere:
//! - Per-entity motion state and update merging
//! - Static, velocity and velocity+acceleration prediction with smoothing
//! - Articulated part interpolation
//! - Ground clamping behind a narrow trait, batched once per tick
//! - A scheduler that ties it all to host events

pub mod articulation;
pub mod clamp;
pub mod motion;
pub mod predict;
pub mod scheduler;

pub use motion::{Algorithm, EntityMotionState, Ownership, UpdateMode};
pub use scheduler::{DeadReckoningScheduler, RegistrationError};
