//! Homes axis 1 on a serial link and jogs it back and forth.

use mdrive::{fleet, Channel};
use simple_logger::SimpleLogger;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
	// Enable logging
	SimpleLogger::new().init().unwrap();

	let path = std::env::args()
		.nth(1)
		.unwrap_or_else(|| "/dev/ttyUSB0".to_string());
	let channel = Channel::open_serial(&path)?;

	// Home axis 1, then jog it back and forth a few times. The axis is
	// stopped when the closure returns, however it returns.
	let result = channel.with_axis("1", |axis| {
		axis.set_motion_timeout(Some(Duration::from_secs(30)));
		axis.set_velocity(768)?;
		axis.home_negative()?;
		for _ in 0..3 {
			axis.move_relative(20_000)?;
			axis.move_relative(-20_000)?;
		}
		axis.wait_for_motion_done()?;
		println!("axis 1 finished at {}", axis.get_position()?);
		Ok::<_, mdrive::error::ProtocolError>(())
	});

	// Something went wrong: make sure nothing on the link keeps moving.
	if let Err(err) = result {
		fleet::emergency_stop(&channel)?;
		return Err(err.into());
	}
	Ok(())
}
