use super::*;
use crate::{backend::Mock, error::Awaiting};
use std::{
	collections::VecDeque,
	sync::{Arc, Mutex},
	time::Duration,
};

fn channel() -> (Channel<Mock>, Mock) {
	let mock = Mock::new();
	(Channel::with_timing(mock.clone(), Timing::immediate()), mock)
}

#[test]
fn send_writes_one_terminated_frame() {
	let (channel, mock) = channel();
	channel.send("1VM=768").unwrap();
	assert_eq!(mock.written(), b"1VM=768\r\n");
	assert_eq!(mock.clears(), 1);
	assert!(mock.is_empty());
}

#[test]
fn send_and_read_skips_the_prompt() {
	let (channel, mock) = channel();
	mock.push_value(-1250);
	assert_eq!(channel.send_and_read("1PR P").unwrap(), "-1250");
	assert_eq!(mock.frames(), ["1PR P"]);
}

#[test]
fn trailing_output_is_discarded() {
	let (channel, mock) = channel();
	mock.push_lines(&["", "7", "?stray"]);
	mock.push_value(8);
	assert_eq!(channel.send_and_read("PR P").unwrap(), "7");
	// The stray line must not be taken for the next echo.
	assert_eq!(channel.send_and_read("PR P").unwrap(), "8");
	assert_eq!(mock.clears(), 2);
}

#[test]
fn echo_mismatch_is_logged_by_default() {
	let (channel, mock) = channel();
	mock.set_echo(false);
	mock.push_lines(&["1P=?", "", "12"]);
	assert_eq!(channel.send_and_read("1PR P").unwrap(), "12");
}

#[test]
fn echo_mismatch_handler_can_escalate() {
	let (channel, mock) = channel();
	mock.set_echo(false);
	mock.push_lines(&["garbled"]);
	assert!(channel.set_echo_mismatch_handler(Err).is_none());

	let err = channel.send("1MA 100").unwrap_err();
	let err = EchoMismatchError::try_from(err).unwrap();
	assert_eq!(err.sent(), "1MA 100");
	assert_eq!(err.echoed(), "garbled");
	assert_eq!(mock.clears(), 1);

	assert!(channel.clear_echo_mismatch_handler().is_some());
	mock.push_lines(&["garbled"]);
	channel.send("1MA 100").unwrap();
}

#[test]
fn echo_mismatch_handler_can_accept() {
	let (channel, mock) = channel();
	let seen = Arc::new(Mutex::new(Vec::new()));
	let seen_clone = Arc::clone(&seen);
	channel.set_echo_mismatch_handler(move |mismatch| {
		seen_clone.lock().unwrap().push(mismatch.echoed().to_string());
		Ok(())
	});
	mock.set_echo(false);
	mock.push_lines(&["other", "", "3"]);
	assert_eq!(channel.send_and_read("PR AC").unwrap(), "3");
	assert_eq!(*seen.lock().unwrap(), ["other"]);
}

#[test]
fn missing_lines_time_out() {
	let (channel, mock) = channel();
	mock.set_echo(false);
	let err = channel.send("P=0").unwrap_err();
	assert!(err.is_timeout());
	assert_eq!(TimeoutError::try_from(err).unwrap().awaiting(), Awaiting::Echo);

	mock.set_echo(true);
	let err = channel.send_and_read("PR P").unwrap_err();
	let err = TimeoutError::try_from(err).unwrap();
	assert_eq!(err.command(), "PR P");
	assert_eq!(err.awaiting(), Awaiting::Prompt);

	mock.push_lines(&[""]);
	let err = channel.send_and_read("PR P").unwrap_err();
	assert_eq!(TimeoutError::try_from(err).unwrap().awaiting(), Awaiting::Reply);
	// Input was still discarded after every failure.
	assert_eq!(mock.clears(), 3);
}

#[test]
fn other_read_errors_are_io_errors() {
	let (channel, mock) = channel();
	mock.read_error(Some(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
	let err = channel.send("P=0").unwrap_err();
	assert!(matches!(err, ProtocolError::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
	assert!(!err.is_timeout());
}

#[test]
fn write_errors_are_returned() {
	let (channel, mock) = channel();
	mock.write_error(Some(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
	let err = channel.send("P=0").unwrap_err();
	assert!(matches!(err, ProtocolError::Io(_)));
	// The port works again afterwards.
	channel.send("P=0").unwrap();
	assert_eq!(mock.frames(), ["P=0"]);
}

#[test]
fn multiline_reads_until_blank_line() {
	let (channel, mock) = channel();
	mock.push_lines(&["", "a", "b", "c", ""]);
	let lines = channel.send_and_read_multiline("PR AL").unwrap();
	assert_eq!(lines, ["a", "b", "c"]);
	assert!(mock.is_empty());
}

#[test]
fn multiline_empty_dump() {
	let (channel, mock) = channel();
	mock.push_lines(&["", ""]);
	assert!(channel.send_and_read_multiline("PR AL").unwrap().is_empty());
}

#[test]
fn multiline_without_terminator_times_out() {
	let (channel, mock) = channel();
	mock.push_lines(&["", "a", "b"]);
	let err = channel.send_and_read_multiline("PR AL").unwrap_err();
	assert_eq!(
		TimeoutError::try_from(err).unwrap().awaiting(),
		Awaiting::DumpLine
	);
}

#[test]
fn multiline_respects_dump_timeout() {
	let mock = Mock::new();
	let channel = Channel::with_timing(
		mock.clone(),
		Timing::immediate().dump_timeout(Duration::ZERO),
	);
	mock.push_lines(&["", "a", "b", ""]);
	let err = channel.send_and_read_multiline("PR AL").unwrap_err();
	assert!(err.is_timeout());
}

/// A controller that echoes each frame, sends `reply`, and then streams `x`
/// forever without ending the line.
struct Babbler {
	pending: VecDeque<u8>,
	reply: &'static [u8],
	byte_delay: Duration,
}

impl Babbler {
	fn new(reply: &'static [u8], byte_delay: Duration) -> Self {
		Babbler {
			pending: VecDeque::new(),
			reply,
			byte_delay,
		}
	}
}

impl io::Read for Babbler {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		if buf.is_empty() {
			return Ok(0);
		}
		buf[0] = match self.pending.pop_front() {
			Some(byte) => byte,
			None => {
				std::thread::sleep(self.byte_delay);
				b'x'
			}
		};
		Ok(1)
	}
}

impl io::Write for Babbler {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.pending.extend(buf);
		self.pending.extend(self.reply);
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

impl Backend for Babbler {
	fn set_read_timeout(&mut self, _: Option<Duration>) -> Result<(), io::Error> {
		Ok(())
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		Ok(None)
	}
	fn clear_input(&mut self) -> Result<(), io::Error> {
		self.pending.clear();
		Ok(())
	}
	fn name(&self) -> Option<String> {
		None
	}
}

#[test]
fn unterminated_dump_line_hits_the_dump_timeout() {
	let channel = Channel::with_timing(
		Babbler::new(b"\r\nP=0\r\n", Duration::from_millis(1)),
		Timing::immediate().dump_timeout(Duration::from_millis(20)),
	);
	let start = Instant::now();
	let err = channel.send_and_read_multiline("PR AL").unwrap_err();
	assert!(start.elapsed() < Duration::from_secs(2));
	let err = TimeoutError::try_from(err).unwrap();
	assert_eq!(err.awaiting(), Awaiting::DumpLine);
}

#[test]
fn overlong_lines_are_cut_off() {
	let channel = Channel::with_timing(
		Babbler::new(b"\r\n", Duration::ZERO),
		Timing::immediate(),
	);
	let err = channel.send_and_read("PR P").unwrap_err();
	let err = LineTooLongError::try_from(err).unwrap();
	assert_eq!(err.command(), "PR P");
	assert_eq!(err.limit(), MAX_LINE_LEN);
	assert!(channel
		.send_and_read_multiline("PR AL")
		.is_err_and(|err| matches!(err, ProtocolError::LineTooLong(_))));
}

#[test]
fn invalid_commands_are_never_written() {
	let (channel, mock) = channel();
	let too_long = "P".repeat(MAX_COMMAND_LEN + 1);
	for command in ["", "P=1\r\nMA 5", "P=\u{e9}", "\x1b", too_long.as_str()] {
		let err = channel.send(command).unwrap_err();
		assert!(matches!(err, ProtocolError::InvalidCommand(_)), "{command:?}");
		let err = channel.send_and_read(command).unwrap_err();
		assert!(matches!(err, ProtocolError::InvalidCommand(_)), "{command:?}");
	}
	assert!(mock.written().is_empty());
	assert_eq!(mock.clears(), 0);

	channel.send(&"P".repeat(MAX_COMMAND_LEN)).unwrap();
}

#[test]
fn raw_send_writes_bytes_as_is() {
	let (channel, mock) = channel();
	channel.raw_send(b"\x1b").unwrap();
	assert_eq!(mock.written(), [0x1bu8]);
	assert_eq!(mock.clears(), 0);
}

#[test]
fn packet_handler_sees_both_directions() {
	let (channel, mock) = channel();
	let packets = Arc::new(Mutex::new(Vec::new()));
	let packets_clone = Arc::clone(&packets);
	channel.set_packet_handler(move |bytes, direction| {
		packets_clone
			.lock()
			.unwrap()
			.push((String::from_utf8_lossy(bytes).into_owned(), direction));
	});
	mock.push_value(4);
	channel.send_and_read("PR P").unwrap();
	assert_eq!(
		*packets.lock().unwrap(),
		[
			("PR P\r\n".to_string(), Direction::Tx),
			("PR P\r\n".to_string(), Direction::Recv),
			("\r\n".to_string(), Direction::Recv),
			("4\r\n".to_string(), Direction::Recv),
		]
	);

	assert!(channel.clear_packet_handler().is_some());
	channel.send("P=0").unwrap();
	assert_eq!(packets.lock().unwrap().len(), 4);
}

#[test]
fn exchanges_never_interleave() {
	let (channel, mock) = channel();
	// With every mismatch fatal, any interleaving would fail an exchange.
	channel.set_echo_mismatch_handler(Err);
	std::thread::scope(|s| {
		for address in ["1", "2", "3", "4"] {
			let channel = &channel;
			s.spawn(move || {
				for i in 0..25 {
					channel.send(&format!("{address}P={i}")).unwrap();
				}
			});
		}
	});
	let frames = mock.frames();
	assert_eq!(frames.len(), 100);
	assert_eq!(mock.written().len(), frames.iter().map(|f| f.len() + 2).sum::<usize>());
	for address in ["1", "2", "3", "4"] {
		let sent: Vec<_> = frames.iter().filter(|f| f.starts_with(address)).collect();
		let expected: Vec<_> = (0..25).map(|i| format!("{address}P={i}")).collect();
		assert_eq!(sent, expected.iter().collect::<Vec<_>>());
	}
}

#[test]
fn recovers_after_a_panic_mid_exchange() {
	let (channel, mock) = channel();
	let mut armed = true;
	channel.set_packet_handler(move |_, _| {
		if std::mem::take(&mut armed) {
			panic!("handler failure");
		}
	});
	let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| channel.send("P=1")));
	assert!(result.is_err());
	// The echo of the interrupted exchange is still buffered.
	assert!(!mock.is_empty());

	mock.push_value(1);
	assert_eq!(channel.send_and_read("PR P").unwrap(), "1");
	assert_eq!(mock.frames(), ["P=1", "PR P"]);
}

#[test]
fn into_backend_returns_the_backend() {
	let (channel, mock) = channel();
	channel.send("P=0").unwrap();
	let backend = channel.into_backend();
	assert_eq!(backend.frames(), mock.frames());
}

#[test]
fn validate_rejects_line_endings() {
	let err = validate("P=1\n").unwrap_err();
	assert_eq!(err.command(), "P=1\n");
	assert!(validate("1MA -200").is_ok());
}

#[test]
fn trim_line_strips_only_line_endings() {
	assert_eq!(trim_line(b" 12 \r\n"), " 12 ");
	assert_eq!(trim_line(b"\r\n"), "");
	assert_eq!(trim_line(b"\n\rX"), "X");
}
