use std::{fmt::Display, str::FromStr};

/// A non-negative position or duration in a media stream, with millisecond precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1000)
    }

    /// Convert fractional seconds as printed by ffprobe, rounding to the nearest millisecond.
    /// Negative or non-finite values have no representation.
    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        if secs.is_finite() && secs >= 0.0 {
            Some(Self((secs * 1000.0).round() as u64))
        } else {
            None
        }
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    pub const fn as_secs(self) -> u64 {
        self.0 / 1000
    }

    pub const fn hours(self) -> u64 {
        self.0 / 3_600_000
    }

    pub const fn minutes(self) -> u64 {
        self.0 / 60_000 % 60
    }

    pub const fn seconds(self) -> u64 {
        self.0 / 1000 % 60
    }

    pub const fn millis(self) -> u64 {
        self.0 % 1000
    }

    pub const fn saturating_sub(self, other: Timestamp) -> Timestamp {
        Timestamp(self.0.saturating_sub(other.0))
    }

    /// Seconds with a fixed 3-digit fraction, e.g. `10.000`
    pub fn to_secs_string(self) -> String {
        format!("{}.{:03}", self.as_secs(), self.millis())
    }

    /// Rendering usable inside file names on every platform, e.g. `00.02.05.000`
    pub fn to_file_component(self) -> String {
        format!(
            "{:02}.{:02}.{:02}.{:03}",
            self.hours(),
            self.minutes(),
            self.seconds(),
            self.millis()
        )
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}.{:03}",
            self.hours(),
            self.minutes(),
            self.seconds(),
            self.millis()
        )
    }
}

impl FromStr for Timestamp {
    type Err = Box<dyn std::error::Error + Sync + Send>;

    /// Parse `[[h:]m:]s[.fff]`, e.g. `2:05`, `1:02:03.5` or `90.25`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(Box::from(format!("Invalid timestamp '{s}'")));
        }

        let (last, units) = parts.split_last().ok_or("Empty timestamp")?;
        let (whole, fraction) = last.split_once('.').unwrap_or((*last, ""));
        if fraction.len() > 3 || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(Box::from(format!("Invalid fraction of second in '{s}'")));
        }

        let mut secs: u64 = 0;
        for unit in units.iter().chain([&whole]) {
            secs = secs
                .checked_mul(60)
                .and_then(|secs| secs.checked_add(unit.parse::<u64>().ok()?))
                .ok_or_else(|| format!("Invalid timestamp '{s}'"))?;
        }

        let millis = if fraction.is_empty() {
            0
        } else {
            format!("{fraction:0<3}").parse::<u64>()?
        };

        secs.checked_mul(1000)
            .and_then(|ms| ms.checked_add(millis))
            .map(Self)
            .ok_or_else(|| Box::from(format!("Invalid timestamp '{s}': too large")))
    }
}

/// A requested `[start, stop)` range of a stream.
///
/// `start <= stop` is expected but not enforced, callers validate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeframe {
    pub start: Timestamp,
    pub stop: Timestamp,
}

impl Timeframe {
    pub fn new(start: Timestamp, stop: Timestamp) -> Self {
        Self { start, stop }
    }

    pub fn is_ordered(&self) -> bool {
        self.start <= self.stop
    }
}

impl Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.start, self.stop)
    }
}
