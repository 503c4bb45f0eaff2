//! `reckon_shared`
//!
//! Vocabulary shared by the dead reckoning subsystem and its hosts.
//!
//! Design goals:
//! - Deterministic and single-threaded.
//! - Clear separation of concerns (math, entities, host traits, events, config).
//! - Traits at the host boundary so tests can run headless.
//! - No `unsafe`.

pub mod config;
pub mod ecs;
pub mod event;
pub mod host;
pub mod math;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::ecs::*;
    pub use crate::event::*;
    pub use crate::host::*;
    pub use crate::math::*;
}
