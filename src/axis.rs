//! Motion control for one axis on a shared [`Channel`].
//!
//! An [`Axis`] is little more than an address and a reference to the channel
//! its controller is connected to. It caches nothing: positions and motion
//! state always come from the controller.
//!
//! ```rust
//! # use mdrive::{Channel, backend::Backend, error::ProtocolError};
//! # fn wrapper<B: Backend>(channel: Channel<B>) -> Result<(), ProtocolError> {
//! let x = channel.axis("1");
//! let y = channel.axis("2");
//! x.set_velocity(768)?;
//! x.move_absolute(20_000)?;
//! y.home_negative()?;
//! x.wait_for_motion_done()?;
//! println!("x is at {}", x.get_position()?);
//! # Ok(())
//! # }
//! ```

mod argument;
mod guard;

pub use argument::Argument;
pub use guard::AxisGuard;

use crate::{
	backend::Backend,
	channel::Channel,
	error::{MotionTimeoutError, ParseError, ProtocolError},
	parameters::Parameters,
};
use std::{
	thread,
	time::{Duration, Instant},
};

/// Generate a setter and a getter for each controller variable.
macro_rules! variable_accessors {
	($(
		$name:ident => $mnemonic:literal
	),+ $(,)?) => {
		paste::paste! {
			$(
				#[doc = concat!("Write the ", stringify!($name), " (`", $mnemonic, "`) variable.")]
				///
				/// Fails with [`InvalidArgument`](ProtocolError::InvalidArgument),
				/// without sending anything, if `value` is not a 32-bit integer.
				pub fn [<set_ $name>]<T: Argument>(&self, value: T) -> Result<(), ProtocolError> {
					let value = value.to_wire(stringify!($name))?;
					self.send(&format!(concat!($mnemonic, "={}"), value))
				}

				#[doc = concat!("Read the ", stringify!($name), " (`", $mnemonic, "`) variable.")]
				pub fn [<get_ $name>](&self) -> Result<i32, ProtocolError> {
					self.query_variable($mnemonic)
				}
			)+
		}
	};
}

/// A handle to one axis on a [`Channel`].
///
/// Any number of axes can share a channel, from any number of threads. The
/// channel keeps their commands from interleaving, but nothing stops two
/// handles to the *same* address from racing each other: if two threads
/// both call [`move_absolute`](Axis::move_absolute) on one axis, both may
/// see it idle and both moves are issued.
pub struct Axis<'c, B> {
	/// The channel the axis' controller is connected to.
	channel: &'c Channel<B>,
	/// Prefixed to every command.
	address: Box<str>,
	/// The pause between motion status polls.
	poll_interval: Duration,
	/// How long to wait for motion to finish, if not forever.
	motion_timeout: Option<Duration>,
}

impl<B> std::fmt::Debug for Axis<'_, B> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Axis")
			.field("address", &self.address)
			.field("poll_interval", &self.poll_interval)
			.field("motion_timeout", &self.motion_timeout)
			.finish_non_exhaustive()
	}
}

impl<'c, B: Backend> Axis<'c, B> {
	/// The default pause between motion status polls: 250 ms.
	pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

	/// Create a handle to the axis at `address` on `channel`.
	///
	/// Equivalent to [`Channel::axis`].
	pub fn new(channel: &'c Channel<B>, address: &str) -> Self {
		Axis {
			channel,
			address: address.into(),
			poll_interval: Self::DEFAULT_POLL_INTERVAL,
			motion_timeout: None,
		}
	}

	/// Get the axis' address.
	pub fn address(&self) -> &str {
		&self.address
	}

	/// Get the channel the axis is on.
	pub fn channel(&self) -> &'c Channel<B> {
		self.channel
	}

	/// Set the pause between motion status polls.
	///
	/// The default is [`DEFAULT_POLL_INTERVAL`](Axis::DEFAULT_POLL_INTERVAL).
	pub fn set_poll_interval(&mut self, interval: Duration) -> &mut Self {
		self.poll_interval = interval;
		self
	}

	/// Get the pause between motion status polls.
	pub fn poll_interval(&self) -> Duration {
		self.poll_interval
	}

	/// Set how long waiting for motion to finish may take.
	///
	/// If `timeout` is `None`, waits last until the axis stops, however long
	/// that is. The default is `None`.
	pub fn set_motion_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
		self.motion_timeout = timeout;
		self
	}

	/// Get how long waiting for motion to finish may take.
	pub fn motion_timeout(&self) -> Option<Duration> {
		self.motion_timeout
	}

	/// Send `verb` prefixed with the axis' address.
	fn send(&self, verb: &str) -> Result<(), ProtocolError> {
		self.channel.send(&self.command(verb))
	}

	/// Send `verb` prefixed with the axis' address and read a one line reply.
	fn query(&self, verb: &str) -> Result<(String, String), ProtocolError> {
		let command = self.command(verb);
		let reply = self.channel.send_and_read(&command)?;
		Ok((command, reply))
	}

	fn command(&self, verb: &str) -> String {
		format!("{}{verb}", self.address)
	}

	/// Whether the axis is moving.
	///
	/// The controller answers `0` when stopped and any other number while
	/// moving. Anything else is a [`Parse`](ProtocolError::Parse) error.
	pub fn is_moving(&self) -> Result<bool, ProtocolError> {
		let (command, reply) = self.query("MV")?;
		let moving: i64 = reply
			.trim()
			.parse()
			.map_err(|_| ParseError::new(&command, &reply))?;
		Ok(moving != 0)
	}

	/// Read the integer value of the variable with the given mnemonic, e.g.
	/// `"P"` for the position.
	pub fn query_variable(&self, mnemonic: &str) -> Result<i32, ProtocolError> {
		let (command, reply) = self.query(&format!("PR {mnemonic}"))?;
		reply
			.trim()
			.parse()
			.map_err(|_| ParseError::new(&command, &reply).into())
	}

	variable_accessors! {
		position => "P",
		velocity => "VM",
		acceleration => "AC",
	}

	/// Move to the absolute position `target`.
	///
	/// If the axis is already moving, this first waits for that motion to
	/// finish, so a move is never issued on top of another. Returns once the
	/// move has been issued, not once it is complete.
	pub fn move_absolute<T: Argument>(&self, target: T) -> Result<(), ProtocolError> {
		let target = target.to_wire("target")?;
		self.wait_if_moving()?;
		self.send(&format!("MA {target}"))
	}

	/// Move by `delta` from the current position.
	///
	/// If the axis is already moving, this first waits for that motion to
	/// finish, so a move is never issued on top of another. Returns once the
	/// move has been issued, not once it is complete.
	pub fn move_relative<T: Argument>(&self, delta: T) -> Result<(), ProtocolError> {
		let delta = delta.to_wire("delta")?;
		self.wait_if_moving()?;
		self.send(&format!("MR {delta}"))
	}

	fn wait_if_moving(&self) -> Result<(), ProtocolError> {
		if self.is_moving()? {
			log::debug!("axis {:?} busy, waiting before the next move", self.address);
			self.wait_for_motion_done()?;
		}
		Ok(())
	}

	/// Block until the axis stops moving.
	///
	/// The axis is polled every [`poll_interval`](Axis::poll_interval). Gives
	/// up with a [`MotionTimeout`](ProtocolError::MotionTimeout) error after
	/// the [`motion_timeout`](Axis::motion_timeout), if one is set.
	pub fn wait_for_motion_done(&self) -> Result<(), ProtocolError> {
		self.wait_for_motion_done_timeout(self.motion_timeout)
	}

	/// Block until the axis stops moving or `timeout` passes.
	///
	/// If `timeout` is `None`, this waits indefinitely. Timing out does not
	/// stop the axis.
	pub fn wait_for_motion_done_timeout(
		&self,
		timeout: Option<Duration>,
	) -> Result<(), ProtocolError> {
		let start = Instant::now();
		while self.is_moving()? {
			if let Some(timeout) = timeout {
				if start.elapsed() >= timeout {
					return Err(MotionTimeoutError::new(&self.address, timeout).into());
				}
			}
			thread::sleep(self.poll_interval);
		}
		Ok(())
	}

	/// Home towards the negative end of travel and wait until homing is done.
	pub fn home_negative(&self) -> Result<(), ProtocolError> {
		self.send("HM 1")?;
		self.wait_for_motion_done()
	}

	/// Home towards the positive end of travel and wait until homing is done.
	pub fn home_positive(&self) -> Result<(), ProtocolError> {
		self.send("HM 3")?;
		self.wait_for_motion_done()
	}

	/// Stop the current motion.
	pub fn abort_move(&self) -> Result<(), ProtocolError> {
		self.send("SL 0")
	}

	/// Read every parameter of the axis' controller.
	pub fn read_all_parameters(&self) -> Result<Parameters, ProtocolError> {
		let lines = self
			.channel
			.send_and_read_multiline(&self.command("PR AL"))?;
		Ok(Parameters::from_lines(lines))
	}
}
