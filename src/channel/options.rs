//! Types defining the different options when opening a channel.

use super::Channel;
use crate::{
	backend::{Backend, Serial},
	error::ProtocolError,
};
use serialport as sp;
use std::time::Duration;

/// Delays a [`Channel`] inserts between writing a frame and reading the
/// controller's output.
///
/// The controllers need a moment to echo a command and longer to compute a
/// reply. The defaults suit Mdrive-class controllers at 9600 baud.
///
/// ## Example
///
/// ```rust
/// # use mdrive::channel::Timing;
/// # use std::time::Duration;
/// let timing = Timing::default()
///     .reply_delay(Duration::from_millis(200))
///     .dump_timeout(Duration::from_secs(60));
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Timing {
	/// Wait after writing a frame before reading its echo.
	pub(crate) echo_delay: Duration,
	/// Wait after the echo before reading a reply.
	pub(crate) reply_delay: Duration,
	/// Pause between lines of a multi-line reply.
	pub(crate) line_delay: Duration,
	/// The longest a whole multi-line reply may take.
	pub(crate) dump_timeout: Duration,
}

impl Timing {
	/// Timing without any delays, for simulated controllers.
	///
	/// The dump timeout keeps its default.
	pub fn immediate() -> Self {
		Timing {
			echo_delay: Duration::ZERO,
			reply_delay: Duration::ZERO,
			line_delay: Duration::ZERO,
			..Timing::default()
		}
	}

	/// Set how long to wait after writing a frame before reading its echo.
	///
	/// The default is 50 ms.
	#[must_use]
	pub fn echo_delay(mut self, delay: Duration) -> Self {
		self.echo_delay = delay;
		self
	}

	/// Set how long to wait after the echo before reading a reply.
	///
	/// The default is 100 ms.
	#[must_use]
	pub fn reply_delay(mut self, delay: Duration) -> Self {
		self.reply_delay = delay;
		self
	}

	/// Set how long to pause between the lines of a multi-line reply.
	///
	/// The default is 5 ms.
	#[must_use]
	pub fn line_delay(mut self, delay: Duration) -> Self {
		self.line_delay = delay;
		self
	}

	/// Set the longest a whole multi-line reply may take.
	///
	/// The default is 30 seconds.
	#[must_use]
	pub fn dump_timeout(mut self, timeout: Duration) -> Self {
		self.dump_timeout = timeout;
		self
	}
}

impl Default for Timing {
	fn default() -> Self {
		Timing {
			echo_delay: Duration::from_millis(50),
			reply_delay: Duration::from_millis(100),
			line_delay: Duration::from_millis(5),
			dump_timeout: Duration::from_secs(30),
		}
	}
}

/// Options for configuring and opening a serial port.
///
/// The port is always opened with 8 data bits, 1 stop bit, no parity and no
/// flow control.
///
/// ## Example
///
/// ```rust
/// # use mdrive::channel::OpenSerialOptions;
/// # use std::time::Duration;
/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
/// let channel = OpenSerialOptions::new()
///     .timeout(Some(Duration::from_secs(1)))
///     .open("/dev/ttyUSB0")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OpenSerialOptions {
	/// The custom baud rate
	baud_rate: u32,
	/// The custom timeout
	timeout: Option<Duration>,
	/// The delays used by the channel.
	timing: Timing,
}

impl OpenSerialOptions {
	/// The default baud rate for Mdrive-class controllers: 9,600.
	pub const DEFAULT_BAUD_RATE: u32 = 9_600;

	/// Create a blank set of options ready for configuration.
	///
	/// The default baud rate and read timeout are 9,600 and 3 seconds, respectively.
	///
	/// Equivalent to [`default`](OpenSerialOptions::default).
	pub fn new() -> Self {
		OpenSerialOptions {
			baud_rate: OpenSerialOptions::DEFAULT_BAUD_RATE,
			timeout: Some(Duration::from_secs(3)),
			timing: Timing::default(),
		}
	}

	/// Set a custom baud rate.
	///
	/// The default is 9,600.
	pub fn baud_rate(&mut self, baud_rate: u32) -> &mut Self {
		self.baud_rate = baud_rate;
		self
	}

	/// Set a custom read timeout.
	///
	/// If duration is `None`, reads will block indefinitely. The default is 3 seconds.
	pub fn timeout(&mut self, duration: Option<Duration>) -> &mut Self {
		self.timeout = duration;
		self
	}

	/// Set the delays the channel inserts between writing and reading.
	///
	/// The default is [`Timing::default`].
	pub fn timing(&mut self, timing: Timing) -> &mut Self {
		self.timing = timing;
		self
	}

	/// Open a [`Serial`] port at the specified path.
	fn open_serial_port(&self, path: &str) -> Result<Serial, ProtocolError> {
		sp::new(path, self.baud_rate)
			.data_bits(sp::DataBits::Eight)
			.parity(sp::Parity::None)
			.flow_control(sp::FlowControl::None)
			.stop_bits(sp::StopBits::One)
			// The serialport API does not support infinite timeouts, so simply
			// set the timeout to the largest possible duration if `timeout` is
			// `None`, which is practically infinite.
			.timeout(self.timeout.unwrap_or(Duration::MAX))
			.open_native()
			.map(Serial)
			.map_err(Into::into)
	}

	/// Open the port at the specified path with the custom options.
	pub fn open(&self, path: &str) -> Result<Channel<Serial>, ProtocolError> {
		log::info!("opening {path} at {} baud", self.baud_rate);
		Ok(Channel::with_timing(
			self.open_serial_port(path)?,
			self.timing,
		))
	}

	/// Open the port at the specified path with the custom options.
	///
	/// The type of the underlying backend is erased via dynamic dispatch,
	/// which does have runtime overhead. [`OpenSerialOptions::open`] should
	/// generally be used instead, except when the type of the underlying
	/// backend may not be known at compile time.
	pub fn open_dyn(&self, path: &str) -> Result<Channel<Box<dyn Backend + Send>>, ProtocolError> {
		log::info!("opening {path} at {} baud", self.baud_rate);
		Ok(Channel::with_timing(
			Box::new(self.open_serial_port(path)?),
			self.timing,
		))
	}
}

impl Default for OpenSerialOptions {
	fn default() -> Self {
		OpenSerialOptions::new()
	}
}
