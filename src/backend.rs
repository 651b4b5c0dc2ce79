//! Types that can exchange (read/write) bytes with a connected controller.
//!
//! The [`Backend`] trait represents all such types. The crate only needs a
//! handful of operations from the physical link: blocking reads bounded by a
//! timeout, writes, flushes, and a way to throw away whatever the controller
//! has queued up but nobody has read yet.

use std::io;
use std::time::Duration;

use serialport as sp;

#[cfg(windows)]
use sp::COMPort as ExternSerial;
use sp::SerialPort;
#[cfg(unix)]
use sp::TTYPort as ExternSerial;

/// The placeholder name for a backend that doesn't have a name.
pub(crate) const UNKNOWN_BACKEND_NAME: &str = "<unknown backend>";

/// Types that allow reading and writing bytes with a connected controller.
///
/// Implement this for any transport other than a serial port, e.g. a
/// terminal server or a simulator, and hand it to
/// [`Channel::new`](crate::channel::Channel::new).
pub trait Backend: io::Read + io::Write {
	/// Set the read timeout.
	///
	/// If timeout is `None`, reads will block indefinitely.
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error>;

	/// Get the read timeout.
	///
	/// If timeout is `None`, reads will block indefinitely.
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error>;

	/// Discard any bytes that have been received but not yet read.
	fn clear_input(&mut self) -> Result<(), io::Error>;

	/// Get the "name" of the backend.
	///
	/// This can be in any format, but should uniquely identify the backend
	/// instance.
	fn name(&self) -> Option<String>;
}

impl<C: Backend + ?Sized> Backend for Box<C> {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		(**self).set_read_timeout(timeout)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		(**self).read_timeout()
	}
	fn clear_input(&mut self) -> Result<(), io::Error> {
		(**self).clear_input()
	}
	fn name(&self) -> Option<String> {
		(**self).name()
	}
}

impl<C: Backend + ?Sized> Backend for &mut C {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		(**self).set_read_timeout(timeout)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		(**self).read_timeout()
	}
	fn clear_input(&mut self) -> Result<(), io::Error> {
		(**self).clear_input()
	}
	fn name(&self) -> Option<String> {
		(**self).name()
	}
}

/// A platform agnostic serial port backend.
//
// `serialport` exposes `COMPort` and `TTYPort` for windows and unix. Wrapping
// whichever one the target uses keeps every consumer free of both dynamic
// dispatch and an extra type parameter.
#[derive(Debug)]
pub struct Serial(pub(crate) ExternSerial);

impl io::Read for Serial {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		self.0.read(buf)
	}
}

impl io::Write for Serial {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.write(buf)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.0.flush()
	}
}

impl Backend for Serial {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		// serialport has no infinite timeout, so use the largest possible one.
		Ok(self.0.set_timeout(timeout.unwrap_or(Duration::MAX))?)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		Ok(Some(self.0.timeout()))
	}
	fn clear_input(&mut self) -> Result<(), io::Error> {
		Ok(self.0.clear(sp::ClearBuffer::Input)?)
	}
	fn name(&self) -> Option<String> {
		self.0.name()
	}
}

#[cfg(any(test, feature = "mock"))]
pub use mock::Mock;

#[cfg(any(test, feature = "mock"))]
mod mock {
	use super::Backend;
	use std::{
		collections::VecDeque,
		io,
		sync::{Arc, Mutex, MutexGuard, PoisonError},
		time::Duration,
	};

	/// The byte the controllers treat as an immediate, unaddressed stop.
	const ESCAPE: u8 = 0x1b;

	/// A scripted, in-memory controller for use in testing.
	///
	/// It has the following features:
	///   * Every byte written to it is recorded and can be inspected with
	///     [`written`](Mock::written) or [`frames`](Mock::frames).
	///   * When a complete frame (a line ending in `\n`) is written, the
	///     frame's text is echoed back (unless echoing is disabled) followed by
	///     the next scripted reply, if any.
	///   * [`clear_input`](Backend::clear_input) discards anything readable.
	///   * Reading when nothing is readable fails immediately with
	///     [`io::ErrorKind::TimedOut`], which is how a real port reports that
	///     its read deadline passed.
	///   * Specific errors can be inserted for the next `read`, `write` or
	///     `flush`.
	///
	/// Clones share the same state, so a test can keep a clone to script and
	/// inspect the mock after moving the original into a
	/// [`Channel`](crate::channel::Channel).
	#[derive(Clone, Default)]
	pub struct Mock {
		state: Arc<Mutex<State>>,
	}

	impl std::fmt::Debug for Mock {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			f.debug_struct("Mock").finish_non_exhaustive()
		}
	}

	/// Computes the reply to a frame from the frame's text.
	type Responder = Box<dyn FnMut(&str) -> Vec<u8> + Send>;

	struct State {
		/// Every byte ever written.
		written: Vec<u8>,
		/// Bytes of the frame currently being written.
		partial: Vec<u8>,
		/// Replies released one per completed frame.
		replies: VecDeque<Vec<u8>>,
		/// If set, used to reply to frames instead of `replies`.
		responder: Option<Responder>,
		/// Bytes that can currently be read.
		readable: VecDeque<u8>,
		/// Whether completed frames are echoed back.
		echo: bool,
		/// How many times the input was cleared.
		clears: usize,
		read_error: Option<io::Error>,
		write_error: Option<io::Error>,
		flush_error: Option<io::Error>,
		/// The read timeout, which is ignored.
		ignored_read_timeout: Option<Duration>,
	}

	impl Default for State {
		fn default() -> Self {
			State {
				written: Vec::new(),
				partial: Vec::new(),
				replies: VecDeque::new(),
				responder: None,
				readable: VecDeque::new(),
				echo: true,
				clears: 0,
				read_error: None,
				write_error: None,
				flush_error: None,
				ignored_read_timeout: Some(Duration::ZERO),
			}
		}
	}

	impl State {
		fn complete_frame(&mut self) {
			let frame = std::mem::take(&mut self.partial);
			let text = frame.strip_suffix(b"\n").unwrap_or(&frame[..]);
			let text = text.strip_suffix(b"\r").unwrap_or(text);
			if self.echo {
				self.readable.extend(text);
				self.readable.extend(b"\r\n");
			}
			let reply = match self.responder.as_mut() {
				Some(responder) => Some(responder(&String::from_utf8_lossy(text))),
				None => self.replies.pop_front(),
			};
			if let Some(reply) = reply {
				self.readable.extend(reply);
			}
		}
	}

	impl Mock {
		/// Create a new Mock backend that echoes every frame.
		pub fn new() -> Self {
			Mock::default()
		}

		fn state(&self) -> MutexGuard<'_, State> {
			self.state.lock().unwrap_or_else(PoisonError::into_inner)
		}

		/// Queue bytes that will become readable after the next frame (and its
		/// echo, if enabled).
		///
		/// The data is not validated in any way.
		pub fn push_reply<T: AsRef<[u8]>>(&self, bytes: T) {
			self.state().replies.push_back(bytes.as_ref().to_vec());
		}

		/// Queue a reply made of `lines`, each terminated with `\r\n`.
		pub fn push_lines(&self, lines: &[&str]) {
			let mut bytes = Vec::new();
			for line in lines {
				bytes.extend_from_slice(line.as_bytes());
				bytes.extend_from_slice(b"\r\n");
			}
			self.push_reply(bytes);
		}

		/// Queue the reply to a single value query: a prompt line and then
		/// the value.
		pub fn push_value<T: std::fmt::Display>(&self, value: T) {
			self.push_lines(&["", &value.to_string()]);
		}

		/// Reply to every frame with the bytes computed by `responder`.
		///
		/// While a responder is set, replies queued with
		/// [`push_reply`](Mock::push_reply) are not used.
		pub fn set_responder<F>(&self, responder: F)
		where
			F: FnMut(&str) -> Vec<u8> + Send + 'static,
		{
			self.state().responder = Some(Box::new(responder));
		}

		/// Make bytes readable immediately, without waiting for a frame.
		pub fn append_data<T: AsRef<[u8]>>(&self, bytes: T) {
			self.state().readable.extend(bytes.as_ref());
		}

		/// Set whether completed frames are echoed back. The default is `true`.
		pub fn set_echo(&self, echo: bool) {
			self.state().echo = echo;
		}

		/// Every byte written to the mock so far.
		pub fn written(&self) -> Vec<u8> {
			self.state().written.clone()
		}

		/// The text of every complete frame written so far, without terminators.
		///
		/// Raw escape bytes are not part of any frame.
		pub fn frames(&self) -> Vec<String> {
			let written = self.written();
			let mut frames = Vec::new();
			let mut current = Vec::new();
			for byte in written {
				match byte {
					ESCAPE => {}
					b'\n' => {
						let text = current.strip_suffix(b"\r").unwrap_or(&current[..]);
						frames.push(String::from_utf8_lossy(text).into_owned());
						current.clear();
					}
					byte => current.push(byte),
				}
			}
			frames
		}

		/// The number of times the input buffer was cleared.
		pub fn clears(&self) -> usize {
			self.state().clears
		}

		/// Whether the mock has any data available or not
		pub fn is_empty(&self) -> bool {
			self.state().readable.is_empty()
		}

		/// Whether all scripted replies have been released.
		pub fn replies_exhausted(&self) -> bool {
			self.state().replies.is_empty()
		}

		/// Set the error for the next `read`, if any.
		pub fn read_error(&self, err: Option<io::Error>) {
			self.state().read_error = err;
		}
		/// Set the error for the next `write`, if any.
		pub fn write_error(&self, err: Option<io::Error>) {
			self.state().write_error = err;
		}
		/// Set the error for the next `flush`, if any.
		pub fn flush_error(&self, err: Option<io::Error>) {
			self.state().flush_error = err;
		}
	}

	impl Backend for Mock {
		fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
			self.state().ignored_read_timeout = timeout;
			Ok(())
		}

		fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
			Ok(self.state().ignored_read_timeout)
		}

		fn clear_input(&mut self) -> Result<(), io::Error> {
			let mut state = self.state();
			state.readable.clear();
			state.clears += 1;
			Ok(())
		}

		fn name(&self) -> Option<String> {
			Some(format!("<mock 0x{:x}>", Arc::as_ptr(&self.state) as usize))
		}
	}

	impl io::Read for Mock {
		fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
			let mut state = self.state();
			if let Some(err) = state.read_error.take() {
				return Err(err);
			}
			if state.readable.is_empty() {
				// A real port would wait and then time out. The data is in
				// memory, so time out straight away.
				return Err(io::Error::new(
					io::ErrorKind::TimedOut,
					"Simulated timeout error",
				));
			}
			let mut count = 0;
			while count < buf.len() {
				match state.readable.pop_front() {
					Some(byte) => {
						buf[count] = byte;
						count += 1;
					}
					None => break,
				}
			}
			Ok(count)
		}
	}

	impl io::Write for Mock {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			let mut state = self.state();
			if let Some(err) = state.write_error.take() {
				return Err(err);
			}
			state.written.extend_from_slice(buf);
			for &byte in buf {
				if byte == ESCAPE {
					continue;
				}
				state.partial.push(byte);
				if byte == b'\n' {
					state.complete_frame();
				}
			}
			Ok(buf.len())
		}

		fn flush(&mut self) -> io::Result<()> {
			match self.state().flush_error.take() {
				Some(err) => Err(err),
				None => Ok(()),
			}
		}
	}

}
