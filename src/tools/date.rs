/// Date Tools Implementation
///
/// Two zero-argument tools backed by the host's local clock:
/// - `get_day_name`: full English weekday name (e.g. "Thursday")
/// - `get_iso_date`: current date as zero-padded `YYYY-MM-DD`
///
/// Dates are taken in the local time zone of the server process, matching
/// what a user of the host machine sees on their own calendar.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, NaiveDate};

use crate::core::error::ToolError;
use crate::core::server::{MCPTool, ToolHandler, ToolRegistry};

pub const GET_DAY_NAME: &str = "get_day_name";
pub const GET_ISO_DATE: &str = "get_iso_date";

/// Source of the current calendar date.
pub trait Clock: Send + Sync {
    fn today(&self) -> Result<NaiveDate, ToolError>;
}

/// Reads the wall clock and converts it to the local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> Result<NaiveDate, ToolError> {
        let now = SystemTime::now();
        // A wall clock before 1970 means the host never set its time.
        now.duration_since(UNIX_EPOCH)
            .map_err(|e| ToolError::Clock(e.to_string()))?;
        Ok(DateTime::<Local>::from(now).date_naive())
    }
}

/// Full English name of the weekday, e.g. "Monday".
pub fn day_name(date: NaiveDate) -> String {
    date.format("%A").to_string()
}

/// ISO 8601 calendar date, e.g. "2024-03-14".
pub fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Register both date tools with the tool registry.
///
/// Called once during server initialization. Each handler reads `clock` on
/// every call, so the answer always reflects the date at the moment of the
/// request rather than at startup.
///
/// # Arguments
/// * `registry` - Mutable reference to the registry receiving both tools
/// * `clock` - Date source shared by the two handlers
pub fn register(registry: &mut ToolRegistry, clock: Arc<dyn Clock>) {
    // Weekday name, e.g. "Thursday"
    let day_clock = Arc::clone(&clock);
    let day_handler: ToolHandler = Box::new(move || day_clock.today().map(day_name));
    registry.register(
        MCPTool::without_arguments(
            GET_DAY_NAME,
            "Get the name of the current day of the week (e.g. 'Monday', 'Tuesday').",
        ),
        day_handler,
    );

    // Zero-padded ISO calendar date, e.g. "2024-03-14"
    let iso_handler: ToolHandler = Box::new(move || clock.today().map(iso_date));
    registry.register(
        MCPTool::without_arguments(
            GET_ISO_DATE,
            "Get the current date in ISO 8601 format (YYYY-MM-DD).",
        ),
        iso_handler,
    );
}
