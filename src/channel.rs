//! Types for opening and using the serial link shared by every axis.

pub mod handlers;
mod options;
#[cfg(test)]
mod test;

use crate::{
	axis::{Axis, AxisGuard},
	backend::{Backend, Serial, UNKNOWN_BACKEND_NAME},
	error::{
		Awaiting, EchoMismatchError, InvalidCommandError, LineTooLongError, ProtocolError,
		TimeoutError,
	},
};
use handlers::{EchoMismatchHandler, Handlers, PacketHandler};
pub use options::*;
use std::{
	io::{self, Read as _, Write as _},
	sync::{Mutex, MutexGuard},
	thread,
	time::Instant,
};

/// The line terminator appended to every command.
pub const TERMINATOR: &str = "\r\n";

/// The longest command, excluding the terminator, that will be written.
pub const MAX_COMMAND_LEN: usize = 64;

/// The longest line, including its line ending, that will be read.
pub const MAX_LINE_LEN: usize = 256;

/// The direction a frame was sent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Direction {
	/// The frame was transmitted to a controller.
	Tx,
	/// The line was received from a controller.
	Recv,
}

/// The serial link to one or more controllers.
///
/// A `Channel` owns its [`Backend`] and is the only thing that talks to it.
/// Every exchange (writing a frame, checking the echo, reading any reply,
/// and discarding leftover input) happens while holding the channel's lock,
/// so exchanges started from different threads never interleave on the
/// wire. The order in which waiting threads get the lock is unspecified.
///
/// All methods take `&self`; share a channel between threads with a
/// reference (e.g., [`std::thread::scope`]) or an [`Arc`](std::sync::Arc).
///
/// ## Example
///
/// ```rust
/// # use mdrive::Channel;
/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
/// let channel = Channel::open_serial("/dev/ttyUSB0")?;
/// let reply = channel.send_and_read("PR P")?;
/// println!("position: {reply}");
/// # Ok(())
/// # }
/// ```
pub struct Channel<B> {
	/// The backend and event handlers, guarded by the serialization token.
	inner: Mutex<Inner<B>>,
	/// The backend's name, cached for logging.
	name: String,
	/// Delays inserted between writing and reading.
	timing: Timing,
}

/// Everything that may only be touched by the current exchange.
struct Inner<B> {
	backend: B,
	handlers: Handlers,
}

impl<B> std::fmt::Debug for Channel<B> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Channel")
			.field("name", &self.name)
			.field("timing", &self.timing)
			.finish_non_exhaustive()
	}
}

impl Channel<Serial> {
	/// Open the serial port at the specified path using the default options.
	///
	/// Alternatively, use [`Channel::open_serial_options`] to customize how the port is opened.
	///
	/// ## Example
	///
	/// ```rust
	/// # use mdrive::Channel;
	/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
	/// let channel = Channel::open_serial("/dev/ttyUSB0")?;
	/// // Or equivalently
	/// let channel = Channel::open_serial_options().open("/dev/ttyUSB0")?;
	/// # Ok(())
	/// # }
	/// ```
	pub fn open_serial(path: &str) -> Result<Channel<Serial>, ProtocolError> {
		OpenSerialOptions::new().open(path)
	}

	/// Get an [`OpenSerialOptions`] to customize how a serial port is opened.
	pub fn open_serial_options() -> OpenSerialOptions {
		OpenSerialOptions::default()
	}
}

impl<B: Backend> Channel<B> {
	/// Create a `Channel` from any [`Backend`] using the default [`Timing`].
	pub fn new(backend: B) -> Self {
		Channel::with_timing(backend, Timing::default())
	}

	/// Create a `Channel` from any [`Backend`] with custom [`Timing`].
	pub fn with_timing(backend: B, timing: Timing) -> Self {
		let name = backend
			.name()
			.unwrap_or_else(|| UNKNOWN_BACKEND_NAME.to_string());
		Channel {
			inner: Mutex::new(Inner {
				backend,
				handlers: Handlers::default(),
			}),
			name,
			timing,
		}
	}

	/// Take the serialization token.
	///
	/// If a previous holder panicked, the wire is in an unknown state: the
	/// token is recovered and any buffered input is thrown away.
	fn lock(&self) -> MutexGuard<'_, Inner<B>> {
		match self.inner.lock() {
			Ok(guard) => guard,
			Err(poisoned) => {
				log::warn!(
					"{} recovering from a panic during a previous exchange",
					self.name
				);
				self.inner.clear_poison();
				let mut guard = poisoned.into_inner();
				if let Err(e) = guard.backend.clear_input() {
					log::warn!("{} failed to discard input: {e}", self.name);
				}
				guard
			}
		}
	}

	/// Send a command and check its echo. Nothing else is read.
	///
	/// The frame `command + "\r\n"` is written and flushed. After
	/// [`echo_delay`](Timing::echo_delay) one line is read and compared to
	/// `command`. Afterwards all buffered input is discarded so that
	/// asynchronous output from the controller cannot be mistaken for the
	/// next command's echo.
	///
	/// An echo that differs from `command` is passed to the
	/// [echo mismatch handler](Channel::set_echo_mismatch_handler), or logged
	/// as a warning if there is none, and the call still succeeds: the
	/// command was transmitted regardless.
	///
	/// ## Example
	///
	/// ```rust
	/// # use mdrive::{Channel, backend::Backend};
	/// # fn wrapper<B: Backend>(channel: Channel<B>) -> Result<(), Box<dyn std::error::Error>> {
	/// channel.send("1VM=768")?;
	/// # Ok(())
	/// # }
	/// ```
	pub fn send(&self, command: &str) -> Result<(), ProtocolError> {
		validate(command)?;
		let mut inner = self.lock();
		inner.write_frame(&self.name, command)?;
		thread::sleep(self.timing.echo_delay);
		let result = inner.check_echo(&self.name, command);
		inner.finish(&self.name, result)
	}

	/// Send a command, check its echo, and read a one line reply.
	///
	/// After the echo, the controller emits a prompt line and then the reply.
	/// The prompt is read and dropped after [`reply_delay`](Timing::reply_delay),
	/// and the reply is returned with its line ending trimmed. Any input
	/// after the reply is discarded.
	///
	/// If a line does not arrive within the backend's read timeout a
	/// [`Timeout`](ProtocolError::Timeout) error is returned. A line longer
	/// than [`MAX_LINE_LEN`] is a [`LineTooLong`](ProtocolError::LineTooLong)
	/// error.
	///
	/// ## Example
	///
	/// ```rust
	/// # use mdrive::{Channel, backend::Backend};
	/// # fn wrapper<B: Backend>(channel: Channel<B>) -> Result<(), Box<dyn std::error::Error>> {
	/// let position: i32 = channel.send_and_read("1PR P")?.parse()?;
	/// # Ok(())
	/// # }
	/// ```
	pub fn send_and_read(&self, command: &str) -> Result<String, ProtocolError> {
		validate(command)?;
		let mut inner = self.lock();
		inner.write_frame(&self.name, command)?;
		thread::sleep(self.timing.echo_delay);
		let result = inner.check_echo(&self.name, command).and_then(|()| {
			thread::sleep(self.timing.reply_delay);
			inner.read_line(&self.name, command, Awaiting::Prompt, None)?;
			let reply = inner.read_line(&self.name, command, Awaiting::Reply, None)?;
			Ok(trim_line(&reply))
		});
		inner.finish(&self.name, result)
	}

	/// Send a command, check its echo, and read a reply of unknown length.
	///
	/// The controller does not say how many lines it will send. After the
	/// prompt line, lines are collected until one consisting only of the
	/// terminator arrives. Each byte must arrive within the backend's read
	/// timeout and the whole reply within [`dump_timeout`](Timing::dump_timeout),
	/// otherwise a [`Timeout`](ProtocolError::Timeout) error is returned. A
	/// controller that keeps sending without ending its line is cut off there
	/// too, or sooner with a [`LineTooLong`](ProtocolError::LineTooLong) error.
	///
	/// ## Example
	///
	/// ```rust
	/// # use mdrive::{Channel, backend::Backend};
	/// # fn wrapper<B: Backend>(channel: Channel<B>) -> Result<(), Box<dyn std::error::Error>> {
	/// for line in channel.send_and_read_multiline("PR AL")? {
	///     println!("{line}");
	/// }
	/// # Ok(())
	/// # }
	/// ```
	pub fn send_and_read_multiline(&self, command: &str) -> Result<Vec<String>, ProtocolError> {
		validate(command)?;
		let mut inner = self.lock();
		inner.write_frame(&self.name, command)?;
		thread::sleep(self.timing.echo_delay);
		let result = inner.check_echo(&self.name, command).and_then(|()| {
			inner.read_line(&self.name, command, Awaiting::Prompt, None)?;
			let deadline = Instant::now() + self.timing.dump_timeout;
			let mut lines = Vec::new();
			loop {
				let line =
					inner.read_line(&self.name, command, Awaiting::DumpLine, Some(deadline))?;
				if line == TERMINATOR.as_bytes() {
					break;
				}
				lines.push(trim_line(&line));
				if Instant::now() >= deadline {
					return Err(TimeoutError::new(command, Awaiting::DumpLine).into());
				}
				thread::sleep(self.timing.line_delay);
			}
			Ok(lines)
		});
		inner.finish(&self.name, result)
	}

	/// Write bytes as-is: no terminator, no echo check, nothing read or discarded.
	///
	/// This still waits for the channel's lock, so the bytes never land in
	/// the middle of another frame.
	pub fn raw_send(&self, bytes: &[u8]) -> Result<(), ProtocolError> {
		let mut inner = self.lock();
		log::debug!("{} TX:   {:02x?}", self.name, bytes);
		inner.backend.write_all(bytes)?;
		inner.backend.flush()?;
		inner.handlers.on_packet(bytes, Direction::Tx);
		Ok(())
	}

	/// Get a handle to the axis with the given address on this channel.
	///
	/// The address is prefixed to every command the axis sends. Use an empty
	/// address for a single controller that is not in party mode.
	///
	/// Dropping the handle does not stop the axis. Use
	/// [`guarded_axis`](Channel::guarded_axis) or [`with_axis`](Channel::with_axis)
	/// for that.
	pub fn axis(&self, address: &str) -> Axis<'_, B> {
		Axis::new(self, address)
	}

	/// Get a handle to the axis with the given address that stops the axis
	/// when dropped.
	///
	/// See [`AxisGuard`] for details.
	pub fn guarded_axis(&self, address: &str) -> AxisGuard<'_, B> {
		AxisGuard::new(self.axis(address))
	}

	/// Run `f` with the axis at `address` and stop the axis afterwards.
	///
	/// The axis is sent an [`abort_move`](Axis::abort_move) however `f`
	/// exits, including by panicking. A failure to stop it is logged, not
	/// returned.
	///
	/// ## Example
	///
	/// ```rust
	/// # use mdrive::{Channel, backend::Backend, error::ProtocolError};
	/// # fn wrapper<B: Backend>(channel: Channel<B>) -> Result<(), ProtocolError> {
	/// channel.with_axis("1", |axis| {
	///     axis.move_relative(2000)?;
	///     axis.wait_for_motion_done()
	/// })?;
	/// # Ok(())
	/// # }
	/// ```
	pub fn with_axis<F, R>(&self, address: &str, f: F) -> R
	where
		F: FnOnce(&mut Axis<'_, B>) -> R,
	{
		let mut guard = self.guarded_axis(address);
		f(&mut guard)
	}

	/// Set a callback that is called whenever a frame is transmitted or a
	/// line is received.
	///
	/// Raw bytes from [`raw_send`](Channel::raw_send) are reported as
	/// transmitted too. Received lines include their line endings.
	///
	/// The callback runs while the channel is locked, so it must not use
	/// the channel itself.
	///
	/// The previous handler, if any, is returned.
	pub fn set_packet_handler<F>(&self, callback: F) -> Option<PacketHandler>
	where
		F: FnMut(&[u8], Direction) + Send + 'static,
	{
		self.lock().handlers.packet.replace(Box::new(callback))
	}

	/// Clear any callback registered via [`Channel::set_packet_handler`] and return it.
	pub fn clear_packet_handler(&self) -> Option<PacketHandler> {
		self.lock().handlers.packet.take()
	}

	/// Set a callback that decides what happens when a command's echo does
	/// not match the command.
	///
	/// If the callback returns `Ok(())` the mismatch is considered handled
	/// and the exchange continues. If it returns the error, the exchange is
	/// abandoned (buffered input is still discarded) and the error is
	/// returned to the caller as [`ProtocolError::EchoMismatch`].
	///
	/// Without a callback, mismatches are logged at the `warn` level and
	/// otherwise ignored.
	///
	/// The callback runs while the channel is locked, so it must not use
	/// the channel itself.
	///
	/// The previous handler, if any, is returned.
	///
	/// ## Example
	///
	/// ```rust
	/// # use mdrive::{Channel, backend::Backend};
	/// # fn wrapper<B: Backend>(channel: Channel<B>) {
	/// // Treat every mismatch as fatal.
	/// channel.set_echo_mismatch_handler(Err);
	/// # }
	/// ```
	pub fn set_echo_mismatch_handler<F>(&self, callback: F) -> Option<EchoMismatchHandler>
	where
		F: FnMut(EchoMismatchError) -> Result<(), EchoMismatchError> + Send + 'static,
	{
		self.lock().handlers.echo_mismatch.replace(Box::new(callback))
	}

	/// Clear any callback registered via [`Channel::set_echo_mismatch_handler`] and return it.
	pub fn clear_echo_mismatch_handler(&self) -> Option<EchoMismatchHandler> {
		self.lock().handlers.echo_mismatch.take()
	}

	/// Get the delays used by this channel.
	pub fn timing(&self) -> Timing {
		self.timing
	}

	/// Get the name of the underlying backend.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Consume the channel and return the underlying backend.
	pub fn into_backend(self) -> B {
		match self.inner.into_inner() {
			Ok(inner) => inner.backend,
			Err(poisoned) => poisoned.into_inner().backend,
		}
	}
}

impl<B: Backend> Inner<B> {
	/// Write `command` and the terminator, then flush.
	fn write_frame(&mut self, name: &str, command: &str) -> Result<(), ProtocolError> {
		let mut frame = String::with_capacity(command.len() + TERMINATOR.len());
		frame.push_str(command);
		frame.push_str(TERMINATOR);
		log::debug!("{name} TX:   {command}");
		self.backend.write_all(frame.as_bytes())?;
		self.backend.flush()?;
		self.handlers.on_packet(frame.as_bytes(), Direction::Tx);
		Ok(())
	}

	/// Read one line, including its line ending.
	///
	/// Fails if `deadline` passes between bytes or the line grows past
	/// [`MAX_LINE_LEN`] without ending.
	fn read_line(
		&mut self,
		name: &str,
		command: &str,
		awaiting: Awaiting,
		deadline: Option<Instant>,
	) -> Result<Vec<u8>, ProtocolError> {
		let mut line = Vec::with_capacity(32);
		let mut byte = [0u8; 1];
		loop {
			if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
				return Err(TimeoutError::new(command, awaiting).into());
			}
			match self.backend.read(&mut byte) {
				Ok(0) => return Err(TimeoutError::new(command, awaiting).into()),
				Ok(_) => {
					line.push(byte[0]);
					if byte[0] == b'\n' {
						break;
					}
					if line.len() >= MAX_LINE_LEN {
						log::debug!("{name} RX:   {}...", String::from_utf8_lossy(&line));
						return Err(LineTooLongError::new(command, MAX_LINE_LEN).into());
					}
				}
				Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
				Err(e)
					if matches!(
						e.kind(),
						io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
					) =>
				{
					return Err(TimeoutError::new(command, awaiting).into());
				}
				Err(e) => return Err(e.into()),
			}
		}
		log::debug!("{name} RX:   {}", String::from_utf8_lossy(&line).trim_end());
		self.handlers.on_packet(&line, Direction::Recv);
		Ok(line)
	}

	/// Read the echo of `command` and report it if it does not match.
	fn check_echo(&mut self, name: &str, command: &str) -> Result<(), ProtocolError> {
		let echo = self.read_line(name, command, Awaiting::Echo, None)?;
		let echo = trim_line(&echo);
		if echo == command {
			return Ok(());
		}
		let mismatch = EchoMismatchError::new(command, &echo);
		match self.handlers.echo_mismatch.as_mut() {
			Some(handler) => handler(mismatch).map_err(Into::into),
			None => {
				log::warn!("{name} {mismatch}");
				Ok(())
			}
		}
	}

	/// Discard buffered input and return `result`.
	///
	/// Input is discarded whether or not the exchange succeeded. A failure
	/// to discard is only reported if the exchange itself succeeded.
	fn finish<T>(
		&mut self,
		name: &str,
		result: Result<T, ProtocolError>,
	) -> Result<T, ProtocolError> {
		match (result, self.backend.clear_input()) {
			(Ok(value), Ok(())) => Ok(value),
			(Ok(_), Err(e)) => Err(e.into()),
			(Err(e), Ok(())) => Err(e),
			(Err(e), Err(clear_err)) => {
				log::warn!("{name} failed to discard input: {clear_err}");
				Err(e)
			}
		}
	}
}

/// Check that `command` can be sent as a single frame.
fn validate(command: &str) -> Result<(), InvalidCommandError> {
	if command.is_empty() {
		Err(InvalidCommandError::new(command, "the command is empty"))
	} else if !command.is_ascii() {
		Err(InvalidCommandError::new(
			command,
			"the command contains non-ASCII characters",
		))
	} else if command.bytes().any(|b| b.is_ascii_control()) {
		Err(InvalidCommandError::new(
			command,
			"the command contains a line ending or other control character",
		))
	} else if command.len() > MAX_COMMAND_LEN {
		Err(InvalidCommandError::new(
			command,
			"the command is longer than the controller accepts",
		))
	} else {
		Ok(())
	}
}

/// Decode a line and strip its line ending.
fn trim_line(line: &[u8]) -> String {
	String::from_utf8_lossy(line)
		.trim_matches(|c: char| c == '\r' || c == '\n')
		.to_string()
}
