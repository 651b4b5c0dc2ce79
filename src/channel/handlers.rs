//! Handlers for events on a channel.
#[cfg(doc)]
use super::Channel;
use super::Direction;
use crate::error::EchoMismatchError;

/// A callback that is called after a frame is transmitted or a line is received.
///
/// See [`Channel::set_packet_handler`] for more details.
pub type PacketHandler = Box<dyn FnMut(&[u8], Direction) + Send>;

/// A callback that decides whether a mismatched echo aborts the exchange.
///
/// See [`Channel::set_echo_mismatch_handler`] for more details.
pub type EchoMismatchHandler =
	Box<dyn FnMut(EchoMismatchError) -> Result<(), EchoMismatchError> + Send>;

/// The event handlers registered on a channel.
#[derive(Default)]
pub(super) struct Handlers {
	pub(super) packet: Option<PacketHandler>,
	pub(super) echo_mismatch: Option<EchoMismatchHandler>,
}

impl std::fmt::Debug for Handlers {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Handlers")
			.field("packet", &self.packet.is_some())
			.field("echo_mismatch", &self.echo_mismatch.is_some())
			.finish()
	}
}

impl Handlers {
	/// Report a frame to the packet handler, if there is one.
	pub(super) fn on_packet(&mut self, bytes: &[u8], direction: Direction) {
		if let Some(callback) = self.packet.as_mut() {
			callback(bytes, direction);
		}
	}
}
