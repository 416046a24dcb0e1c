//! UTC datetime parsing for front-matter validation.
//!
//! Accepts the shapes authors actually type into headers:
//!
//! ```text
//! 2024-06-15
//! 2024-06-15 14:30
//! 2024-06-15 14:30:45
//! 2024-06-15T14:30:45Z
//! 2024-06-15T14:30:45+02:00
//! ```
//!
//! Offsets are accepted and ignored; the value is only checked for
//! well-formedness and normalized for display.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("expected YYYY-MM-DD, got `{0}`")]
    Shape(String),
    #[error("unrecognized time in `{0}`")]
    Time(String),
    #[error("unexpected trailing characters in `{0}`")]
    Trailing(String),
    #[error("{field} is out of range: {value}")]
    Range { field: &'static str, value: u16 },
}

/// UTC datetime without timezone complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeUtc {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTimeUtc {
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    pub const fn from_ymd(year: u16, month: u8, day: u8) -> Self {
        Self::new(year, month, day, 0, 0, 0)
    }

    /// Parse a front-matter date, explaining what is wrong on failure.
    pub fn parse(s: &str) -> Result<Self, DateError> {
        let s = s.trim().trim_matches(|c| c == '"' || c == '\'');
        let bytes = s.as_bytes();

        if bytes.len() < 10 {
            return Err(DateError::Shape(s.to_string()));
        }

        let (Some(year), Some(month), Some(day)) = (
            parse_u16(&bytes[0..4]),
            parse_u8(&bytes[5..7]),
            parse_u8(&bytes[8..10]),
        ) else {
            return Err(DateError::Shape(s.to_string()));
        };
        if bytes[4] != b'-' || bytes[7] != b'-' {
            return Err(DateError::Shape(s.to_string()));
        }

        let (hour, minute, second) = match &bytes[10..] {
            [] => (0, 0, 0),
            [b'T' | b' ', time @ ..] => parse_time(time)
                .ok_or_else(|| DateError::Time(s.to_string()))?,
            _ => return Err(DateError::Trailing(s.to_string())),
        };

        let dt = Self::new(year, month, day, hour, minute, second);
        dt.validate()?;
        Ok(dt)
    }

    pub fn validate(&self) -> Result<(), DateError> {
        let out_of_range = |field, value: u8| DateError::Range {
            field,
            value: u16::from(value),
        };

        if !(1..=12).contains(&self.month) {
            return Err(out_of_range("month", self.month));
        }
        if self.day == 0 || self.day > Self::days_in_month(self.year, self.month) {
            return Err(out_of_range("day", self.day));
        }
        if self.hour > 23 {
            return Err(out_of_range("hour", self.hour));
        }
        if self.minute > 59 {
            return Err(out_of_range("minute", self.minute));
        }
        if self.second > 59 {
            return Err(out_of_range("second", self.second));
        }
        Ok(())
    }

    #[inline]
    #[allow(clippy::manual_is_multiple_of)] // Manual impl for const fn
    const fn is_leap_year(year: u16) -> bool {
        year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
    }

    #[inline]
    const fn days_in_month(year: u16, month: u8) -> u8 {
        match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 if Self::is_leap_year(year) => 29,
            2 => 28,
            _ => 0,
        }
    }

    /// Format as RFC 3339: `YYYY-MM-DDTHH:MM:SSZ`
    pub fn to_rfc3339(self) -> String {
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Parse `HH:MM[:SS][Z|±HH:MM]`.
fn parse_time(bytes: &[u8]) -> Option<(u8, u8, u8)> {
    if bytes.len() < 5 || bytes[2] != b':' {
        return None;
    }
    let hour = parse_u8(&bytes[0..2])?;
    let minute = parse_u8(&bytes[3..5])?;

    let (second, rest) = match bytes.get(5) {
        Some(b':') if bytes.len() >= 8 => (parse_u8(&bytes[6..8])?, &bytes[8..]),
        _ => (0, &bytes[5..]),
    };

    // Fractional seconds are dropped.
    let rest = match rest {
        [b'.', tail @ ..] => {
            let digits = tail.iter().take_while(|b| b.is_ascii_digit()).count();
            &tail[digits..]
        }
        _ => rest,
    };

    match rest {
        [] | [b'Z'] => Some((hour, minute, second)),
        [b'+' | b'-', offset @ ..] if is_offset(offset) => Some((hour, minute, second)),
        _ => None,
    }
}

fn is_offset(bytes: &[u8]) -> bool {
    match bytes {
        [h1, h2, b':', m1, m2] | [h1, h2, m1, m2] => [h1, h2, m1, m2]
            .iter()
            .all(|b| b.is_ascii_digit()),
        [h1, h2] => h1.is_ascii_digit() && h2.is_ascii_digit(),
        _ => false,
    }
}

/// Parse 2-digit ASCII number
#[inline]
fn parse_u8(bytes: &[u8]) -> Option<u8> {
    if bytes.len() != 2 {
        return None;
    }
    let d1 = bytes[0].wrapping_sub(b'0');
    let d2 = bytes[1].wrapping_sub(b'0');
    if d1 > 9 || d2 > 9 {
        return None;
    }
    Some(d1 * 10 + d2)
}

/// Parse 4-digit ASCII number
#[inline]
fn parse_u16(bytes: &[u8]) -> Option<u16> {
    if bytes.len() != 4 {
        return None;
    }
    let mut result = 0u16;
    for &b in bytes {
        let d = b.wrapping_sub(b'0');
        if d > 9 {
            return None;
        }
        result = result * 10 + u16::from(d);
    }
    Some(result)
}
