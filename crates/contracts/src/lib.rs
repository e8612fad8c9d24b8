//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Wall clock, UTC, `chrono::DateTime<Utc>`
//! - Measurement times travel and persist at second resolution
//!   ([`DATETIME_FORMAT`])

mod blueprint;
mod command;
mod device;
mod device_id;
mod error;
mod measurement;
mod sample;
mod sink;
mod target_state;

pub use blueprint::*;
pub use command::*;
pub use device::*;
pub use device_id::DeviceId;
pub use error::*;
pub use measurement::*;
pub use sample::*;
pub use sink::*;
pub use target_state::*;
