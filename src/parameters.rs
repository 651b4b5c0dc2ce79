//! A typed view over a bulk parameter dump.

use crate::error::ParseError;
use std::collections::BTreeMap;

/// The command that makes a controller print all of its parameters.
pub(crate) const PRINT_ALL: &str = "PR AL";

/// The parameters printed by a controller, as returned by
/// [`Axis::read_all_parameters`](crate::Axis::read_all_parameters).
///
/// Every line of the dump is kept in order. Lines of the form `NAME=VALUE`
/// are also indexed by name (case-insensitively, surrounding whitespace
/// trimmed) so individual values can be looked up.
///
/// ## Example
///
/// ```rust
/// # use mdrive::{Channel, backend::Backend, error::ProtocolError};
/// # fn wrapper<B: Backend>(channel: Channel<B>) -> Result<(), ProtocolError> {
/// let parameters = channel.axis("1").read_all_parameters()?;
/// if let Some(velocity) = parameters.get_i32("VM")? {
///     println!("max velocity: {velocity}");
/// }
/// for (name, value) in parameters.iter() {
///     println!("{name} = {value}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
	/// Every line, in the order received.
	lines: Vec<String>,
	/// The value of every `NAME=VALUE` line, by upper case name.
	values: BTreeMap<String, String>,
}

impl Parameters {
	/// Index the lines of a parameter dump.
	///
	/// If a name appears more than once, the last value wins.
	pub fn from_lines(lines: Vec<String>) -> Self {
		let values = lines
			.iter()
			.filter_map(|line| line.split_once('='))
			.map(|(name, value)| (name.trim().to_ascii_uppercase(), value.trim().to_string()))
			.filter(|(name, _)| !name.is_empty())
			.collect();
		Parameters { lines, values }
	}

	/// Get the raw value of a parameter.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.values
			.get(&name.trim().to_ascii_uppercase())
			.map(String::as_str)
	}

	/// Get the value of a parameter as an integer.
	///
	/// Returns `Ok(None)` if the parameter is absent and an error if it is
	/// present but not an integer.
	pub fn get_i32(&self, name: &str) -> Result<Option<i32>, ParseError> {
		self.get(name)
			.map(|value| value.parse().map_err(|_| ParseError::new(PRINT_ALL, value)))
			.transpose()
	}

	/// Iterate over the indexed parameters in name order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
		self.values
			.iter()
			.map(|(name, value)| (name.as_str(), value.as_str()))
	}

	/// Every line of the dump, in the order received.
	pub fn lines(&self) -> &[String] {
		&self.lines
	}

	/// The number of indexed parameters.
	pub fn len(&self) -> usize {
		self.values.len()
	}

	/// Whether no parameters were indexed.
	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}
