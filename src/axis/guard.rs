//! A "scope guard" that stops an axis when it goes out of scope.

use super::Axis;
use crate::backend::Backend;

/// A "scope guard" that sends an [`abort_move`](Axis::abort_move) to its axis
/// when it goes out of scope.
///
/// To create a guard, use [`Channel::guarded_axis`](crate::Channel::guarded_axis)
/// or [`AxisGuard::new`]. The guard stops the axis on every exit path,
/// including early returns with `?` and unwinding panics, so a stage never
/// keeps moving after the code controlling it is gone.
///
/// Because the guard implements [`Deref`](std::ops::Deref) and
/// [`DerefMut`](std::ops::DerefMut) callers can treat the guard as the axis.
///
/// Stopping the axis happens in `drop`, where there is nobody to report a
/// failure to: if the channel or controller is unreachable the failure is
/// logged and otherwise ignored.
///
/// ## Example
///
/// ```rust
/// # use mdrive::{Channel, backend::Backend, error::ProtocolError};
/// # fn wrapper<B: Backend>(channel: Channel<B>) -> Result<(), ProtocolError> {
/// {
///     let axis = channel.guarded_axis("1");
///     axis.move_relative(50_000)?;
///     // ...
/// }  // The guard is dropped and the axis is stopped.
/// # Ok(())
/// # }
/// ```
pub struct AxisGuard<'c, B: Backend> {
	/// The guarded axis.
	axis: Axis<'c, B>,
}

impl<B: Backend> std::fmt::Debug for AxisGuard<'_, B> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AxisGuard").field("axis", &self.axis).finish()
	}
}

impl<'c, B: Backend> AxisGuard<'c, B> {
	/// Guard `axis`, stopping it when the guard is dropped.
	pub fn new(axis: Axis<'c, B>) -> Self {
		AxisGuard { axis }
	}
}

impl<'c, B: Backend> std::ops::Deref for AxisGuard<'c, B> {
	type Target = Axis<'c, B>;
	/// Get a shared reference to the underlying axis.
	fn deref(&self) -> &Self::Target {
		&self.axis
	}
}

impl<B: Backend> std::ops::DerefMut for AxisGuard<'_, B> {
	/// Get an exclusive reference to the underlying axis.
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.axis
	}
}

impl<B: Backend> std::ops::Drop for AxisGuard<'_, B> {
	fn drop(&mut self) {
		if let Err(err) = self.axis.abort_move() {
			log::warn!(
				"failed to stop axis {:?} on release: {err}",
				self.axis.address()
			);
		}
	}
}
