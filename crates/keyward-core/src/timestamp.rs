//! `cDate`/`mDate` codec: local wall-clock time, second resolution,
//! `YYYY-MM-DDTHH:MM:SS`.

use chrono::{Local, NaiveDateTime, Timelike};

use crate::error::{KeywardError, KeywardResult};

pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Current local time truncated to whole seconds.
pub fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

pub fn format(ts: &NaiveDateTime) -> String {
    ts.format(FORMAT).to_string()
}

pub fn parse(s: &str) -> KeywardResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, FORMAT).map_err(|_| KeywardError::MalformedDate(s.to_string()))
}

/// Parse a stored timestamp, substituting the current time when it is
/// unreadable. A bad date never aborts loading a record.
pub fn parse_or_now(s: &str) -> NaiveDateTime {
    match parse(s) {
        Ok(ts) => ts,
        Err(e) => {
            tracing::warn!("{e}; using the current time instead");
            now()
        }
    }
}
