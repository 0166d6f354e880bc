//! Timestamp command implementation.

use ledgersync_protocol::{HulcClock, LogicalTimestamp};

/// Issues a timestamp for `client_id`, or for a fresh node id.
pub fn issue(zero: bool, client_id: Option<&str>) -> Result<LogicalTimestamp, Box<dyn std::error::Error>> {
    let mut clock = match client_id {
        Some(id) => HulcClock::new(id)?,
        None => HulcClock::generate(),
    };
    if zero {
        Ok(clock.zero())
    } else {
        Ok(clock.now()?)
    }
}

/// Runs the timestamp command.
pub fn run(zero: bool, client_id: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", issue(zero, client_id)?);
    Ok(())
}
