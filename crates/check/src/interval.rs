//! Check intervals.
//!
//! Durations are written the way pipeline authors write them: `30s`, `5m`,
//! `1h30m`, `2d`, `500ms`. A `check_every` may also be `never`.

use std::time::Duration;

/// Error parsing a duration string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    /// Empty input
    #[error("duration cannot be empty")]
    Empty,

    /// A unit without a number in front of it
    #[error("missing number before '{unit}' in duration '{input}'")]
    MissingNumber {
        /// Unit that had no number
        unit: String,
        /// Whole input
        input: String,
    },

    /// A number without a unit after it
    #[error("missing unit after '{number}' in duration '{input}'")]
    MissingUnit {
        /// Dangling number
        number: String,
        /// Whole input
        input: String,
    },

    /// Something that is neither a digit nor a unit
    #[error("invalid character '{found}' in duration '{input}'. Valid units: ms, s, m, h, d")]
    InvalidCharacter {
        /// Offending character
        found: char,
        /// Whole input
        input: String,
    },

    /// Value too large to represent
    #[error("duration '{0}' is too large")]
    Overflow(String),
}

/// Parsed `check_every` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckEvery {
    /// Never check periodically
    Never,
    /// Check when this much time passed since the last check ended
    Interval(Duration),
}

impl CheckEvery {
    /// The interval, unless checking is disabled.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            CheckEvery::Never => None,
            CheckEvery::Interval(d) => Some(*d),
        }
    }
}

/// Parse a `check_every` value.
pub fn parse_check_every(input: &str) -> Result<CheckEvery, DurationError> {
    if input.trim().eq_ignore_ascii_case("never") {
        return Ok(CheckEvery::Never);
    }
    parse_duration(input).map(CheckEvery::Interval)
}

/// Parse a human-readable duration such as `1h30m` or `500ms`.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DurationError::Empty);
    }

    let mut total_millis: u64 = 0;
    let mut current_num = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        let unit_millis: u64 = match c {
            '0'..='9' => {
                current_num.push(c);
                continue;
            }
            ' ' => continue,
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                1
            }
            's' => 1_000,
            'm' => 60 * 1_000,
            'h' => 60 * 60 * 1_000,
            'd' => 24 * 60 * 60 * 1_000,
            other => {
                return Err(DurationError::InvalidCharacter {
                    found: other,
                    input: input.to_string(),
                })
            }
        };

        if current_num.is_empty() {
            let unit = if unit_millis == 1 { "ms".to_string() } else { c.to_string() };
            return Err(DurationError::MissingNumber {
                unit,
                input: input.to_string(),
            });
        }

        let value: u64 = current_num
            .parse()
            .map_err(|_| DurationError::Overflow(input.to_string()))?;
        total_millis = value
            .checked_mul(unit_millis)
            .and_then(|v| total_millis.checked_add(v))
            .ok_or_else(|| DurationError::Overflow(input.to_string()))?;
        current_num.clear();
    }

    if !current_num.is_empty() {
        return Err(DurationError::MissingUnit {
            number: current_num,
            input: input.to_string(),
        });
    }

    Ok(Duration::from_millis(total_millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(2 * 86_400));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_compound() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_duration("1m 30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1s500ms").unwrap(), Duration::from_millis(1_500));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_duration("  "), Err(DurationError::Empty));
        assert!(matches!(parse_duration("h"), Err(DurationError::MissingNumber { .. })));
        assert!(matches!(parse_duration("10"), Err(DurationError::MissingUnit { .. })));
        assert!(matches!(parse_duration("10x"), Err(DurationError::InvalidCharacter { found: 'x', .. })));
        assert!(matches!(
            parse_duration("99999999999999999999s"),
            Err(DurationError::Overflow(_))
        ));
    }

    #[test]
    fn test_check_every_never() {
        assert_eq!(parse_check_every("never").unwrap(), CheckEvery::Never);
        assert_eq!(parse_check_every("Never").unwrap().interval(), None);
        assert_eq!(
            parse_check_every("1m").unwrap().interval(),
            Some(Duration::from_secs(60))
        );
    }
}
