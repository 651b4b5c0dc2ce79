//! Conversion of motion parameters into the integers the controllers accept.

use crate::error::InvalidArgumentError;

/// A value that may be used as a motion parameter.
///
/// The controllers only accept 32-bit signed integers. Integer types convert
/// when their value fits. Floating point values never convert, not even
/// `3.0`: they are rejected with an
/// [`InvalidArgument`](crate::error::ProtocolError::InvalidArgument) error
/// before anything is sent.
pub trait Argument: Copy + std::fmt::Display + private::Sealed {
	/// Convert the value, naming `parameter` in any error.
	fn to_wire(self, parameter: &'static str) -> Result<i32, InvalidArgumentError>;
}

macro_rules! impl_argument_for_int {
	($($t:ty),+ $(,)?) => {
		$(
			impl Argument for $t {
				fn to_wire(self, parameter: &'static str) -> Result<i32, InvalidArgumentError> {
					i32::try_from(self).map_err(|_| InvalidArgumentError::new(parameter, self))
				}
			}

			impl private::Sealed for $t {}
		)+
	};
}

impl_argument_for_int! { i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize }

// Floats type check but are always rejected.
macro_rules! impl_argument_for_float {
	($($t:ty),+ $(,)?) => {
		$(
			impl Argument for $t {
				fn to_wire(self, parameter: &'static str) -> Result<i32, InvalidArgumentError> {
					Err(InvalidArgumentError::new(parameter, self))
				}
			}

			impl private::Sealed for $t {}
		)+
	};
}

impl_argument_for_float! { f32, f64 }

mod private {
	pub trait Sealed {}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn integers_in_range() {
		assert_eq!(5u8.to_wire("position"), Ok(5));
		assert_eq!((-20_000i64).to_wire("position"), Ok(-20_000));
		assert_eq!(i32::MIN.to_wire("position"), Ok(i32::MIN));
	}

	#[test]
	fn integers_out_of_range() {
		let err = (i64::from(i32::MAX) + 1).to_wire("velocity").unwrap_err();
		assert_eq!(err.parameter(), "velocity");
		assert_eq!(err.value(), "2147483648");
		assert!(u32::MAX.to_wire("velocity").is_err());
	}

	#[test]
	fn floats_are_never_integers() {
		let err = 3.0f64.to_wire("position").unwrap_err();
		assert_eq!(err.parameter(), "position");
		assert_eq!(err.value(), "3");
		assert!((-2.0f32).to_wire("position").is_err());
		assert_eq!(3.5f64.to_wire("position").unwrap_err().value(), "3.5");
		assert!(f64::NAN.to_wire("position").is_err());
		assert!(f64::INFINITY.to_wire("position").is_err());
		assert_eq!(0.25f32.to_wire("position").unwrap_err().value(), "0.25");
	}
}
