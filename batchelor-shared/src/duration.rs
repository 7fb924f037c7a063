//! Duration-literal parsing: `<number><unit>`, e.g. `500ms`, `30s`, `5min`, `2houres`.
//!
//! Units accepted (case-insensitive, matched longest-first): `ms`, `s`, `sec`,
//! `m`, `min`, `h`, `houres`. A bare number with no unit is rejected — callers
//! that want a default unit should append it before parsing.

use std::time::Duration;

use crate::error::BatchelorError;

pub fn parse_duration(input: &str) -> Result<Duration, BatchelorError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(BatchelorError::invalid_input("empty duration literal"));
    }

    let split_at = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| BatchelorError::invalid_input(format!("no unit in duration literal: {trimmed}")))?;

    let (number_part, unit_part) = trimmed.split_at(split_at);
    if number_part.is_empty() {
        return Err(BatchelorError::invalid_input(format!(
            "missing numeric value in duration literal: {trimmed}"
        )));
    }

    let value: u64 = number_part
        .parse()
        .map_err(|_| BatchelorError::invalid_input(format!("invalid number in duration literal: {trimmed}")))?;

    let unit = unit_part.trim().to_ascii_lowercase();
    let duration = match unit.as_str() {
        "ms" => Duration::from_millis(value),
        "s" | "sec" => Duration::from_secs(value),
        "m" | "min" => Duration::from_secs(value * 60),
        "h" | "houres" => Duration::from_secs(value * 3600),
        other => {
            return Err(BatchelorError::invalid_input(format!(
                "unknown duration unit '{other}' in literal: {trimmed}"
            )))
        }
    };

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_milliseconds() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn parses_seconds_both_spellings() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("30sec").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn parses_minutes_both_spellings() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("5min").unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn parses_hours_both_spellings() {
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("2houres").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn is_case_insensitive() {
        assert_eq!(parse_duration("5MIN").unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn rejects_missing_unit() {
        assert!(parse_duration("500").is_err());
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_duration("5days").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(parse_duration("").is_err());
    }
}
