use chrono::{DateTime, Local, TimeZone};

const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Current local time in the wire format used by every outbound message.
pub fn wire_timestamp() -> String {
    format_wire_time(&Local::now())
}

pub fn format_wire_time<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(WIRE_FORMAT).to_string()
}
