//! Operations that address every controller on a channel at once.
//!
//! These bypass axis addressing entirely, so they work regardless of the
//! state of any [`Axis`](crate::Axis) handle.

use crate::{backend::Backend, channel::Channel, error::ProtocolError};

/// The byte that makes every controller stop immediately (ASCII escape).
pub const EMERGENCY_STOP: u8 = 0x1b;

/// The command that reboots the controllers.
pub const REBOOT: &str = "^C";

/// Stop every axis on the channel immediately.
///
/// A single escape byte is written without a terminator and nothing is read
/// back. The byte still waits for any exchange in progress to finish, so it
/// never lands in the middle of another frame.
///
/// ## Example
///
/// ```rust
/// # use mdrive::{Channel, backend::Backend, error::ProtocolError};
/// # fn wrapper<B: Backend>(channel: Channel<B>) -> Result<(), ProtocolError> {
/// mdrive::fleet::emergency_stop(&channel)?;
/// # Ok(())
/// # }
/// ```
pub fn emergency_stop<B: Backend>(channel: &Channel<B>) -> Result<(), ProtocolError> {
	log::warn!("{} emergency stop", channel.name());
	channel.raw_send(&[EMERGENCY_STOP])
}

/// Reboot the controllers on the channel.
///
/// Sent as a normal command, so its echo is checked.
pub fn reboot<B: Backend>(channel: &Channel<B>) -> Result<(), ProtocolError> {
	log::info!("{} rebooting controllers", channel.name());
	channel.send(REBOOT)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{backend::Mock, channel::Timing};
	use std::{sync::mpsc, thread, time::Duration};

	#[test]
	fn emergency_stop_is_a_single_escape_byte() {
		let mock = Mock::new();
		let channel = Channel::with_timing(mock.clone(), Timing::immediate());
		emergency_stop(&channel).unwrap();
		assert_eq!(mock.written(), [EMERGENCY_STOP]);
		// Nothing is echoed for a bare byte and nothing is read or discarded.
		assert!(mock.is_empty());
		assert_eq!(mock.clears(), 0);
	}

	#[test]
	fn emergency_stop_ignores_axis_state() {
		let mock = Mock::new();
		let channel = Channel::with_timing(mock.clone(), Timing::immediate());
		mock.push_value(1);
		assert!(channel.axis("1").is_moving().unwrap());
		emergency_stop(&channel).unwrap();
		assert_eq!(mock.written().last(), Some(&EMERGENCY_STOP));
		assert_eq!(mock.frames(), ["1MV"]);
	}

	#[test]
	fn emergency_stop_waits_for_the_exchange_in_progress() {
		let mock = Mock::new();
		let channel = Channel::with_timing(mock.clone(), Timing::immediate());
		mock.push_value(5);
		let (started_tx, started_rx) = mpsc::channel();
		let mut started = Some(started_tx);
		// Stall the query while it holds the channel, right after its frame
		// went out.
		channel.set_packet_handler(move |_, _| {
			if let Some(started) = started.take() {
				started.send(()).unwrap();
				thread::sleep(Duration::from_millis(50));
			}
		});
		thread::scope(|s| {
			let query = s.spawn(|| channel.send_and_read("1PR P"));
			started_rx.recv().unwrap();
			emergency_stop(&channel).unwrap();
			assert_eq!(query.join().unwrap().unwrap(), "5");
		});

		let mut expected = b"1PR P\r\n".to_vec();
		expected.push(EMERGENCY_STOP);
		assert_eq!(mock.written(), expected);
		assert_eq!(mock.frames(), ["1PR P"]);
		// Only the query's input was discarded and nothing answered the stop.
		assert_eq!(mock.clears(), 1);
		assert!(mock.is_empty());
	}

	#[test]
	fn reboot_checks_the_echo() {
		let mock = Mock::new();
		let channel = Channel::with_timing(mock.clone(), Timing::immediate());
		reboot(&channel).unwrap();
		assert_eq!(mock.written(), b"^C\r\n");
		assert_eq!(mock.clears(), 1);
	}
}
