use chrono::{DateTime, Utc};

/// One sensor sample, ready to be stored as a row of the readings table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    /// Wall-clock time at which the message was received (not taken from the payload).
    pub time: DateTime<Utc>,
    /// Tank identifier, second topic segment.
    pub tank: String,
    /// Sensor identifier, third topic segment.
    pub sensor: String,
    /// Opaque text, never parsed as a number.
    pub value: String,
}

impl Reading {
    pub fn new(
        time: DateTime<Utc>,
        tank: impl Into<String>,
        sensor: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            time,
            tank: tank.into(),
            sensor: sensor.into(),
            value: value.into(),
        }
    }
}
