//! Command transport for Mdrive-class motion controllers that share one
//! serial link.
//!
//! The controllers speak a line oriented ASCII protocol: every command is
//! echoed back verbatim before any reply. A [`Channel`] owns the link,
//! checks those echoes, reads replies, and makes sure only one command is on
//! the wire at a time. Any number of [`Axis`] handles, each with its own
//! address, can share a channel from any number of threads.
//!
//! ```rust
//! # use mdrive::{Channel, error::ProtocolError};
//! # fn wrapper() -> Result<(), ProtocolError> {
//! let channel = Channel::open_serial("/dev/ttyUSB0")?;
//! channel.with_axis("1", |axis| {
//!     axis.set_velocity(768)?;
//!     axis.home_negative()?;
//!     axis.move_absolute(51_200)?;
//!     axis.wait_for_motion_done()
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! When things go wrong, [`fleet::emergency_stop`] halts every axis on the
//! channel at once.

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(missing_debug_implementations)]

pub mod axis;
pub mod backend;
pub mod channel;
pub mod error;
pub mod fleet;
pub mod parameters;

pub use axis::{Axis, AxisGuard};
pub use channel::Channel;
pub use parameters::Parameters;
