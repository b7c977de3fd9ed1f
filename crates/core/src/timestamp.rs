//! Write timestamps
//!
//! The backend stamps a row with the wall-clock time of every successful
//! write. Stored as whole microseconds since the Unix epoch; when written
//! into a property it becomes an `Int` of those microseconds.

use crate::value::{PropertyValue, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const MICROS_PER_SEC: u64 = 1_000_000;

/// Time of a row write, microseconds since the Unix epoch
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Timestamp of a row that has never been written
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Current wall-clock time (EPOCH if the clock reads before 1970)
    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| Timestamp(u64::try_from(d.as_micros()).unwrap_or(u64::MAX)))
            .unwrap_or(Timestamp::EPOCH)
    }

    /// From microseconds since the epoch
    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// From whole seconds since the epoch
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(MICROS_PER_SEC))
    }

    /// Microseconds since the epoch
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Time elapsed since this timestamp, zero if it lies in the future
    pub fn age(&self) -> Duration {
        Duration::from_micros(Timestamp::now().0.saturating_sub(self.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.0 / MICROS_PER_SEC, self.0 % MICROS_PER_SEC)
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        ts.into_value()
    }
}

impl PropertyValue for Timestamp {
    const TYPE_NAME: &'static str = "Int";

    fn from_value(value: &Value) -> Option<Self> {
        value
            .as_int()
            .and_then(|micros| u64::try_from(micros).ok())
            .map(Timestamp)
    }

    fn into_value(self) -> Value {
        Value::Int(i64::try_from(self.0).unwrap_or(i64::MAX))
    }
}
