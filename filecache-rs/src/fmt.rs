//! Provides parsing and formatting helpers for the byte sizes and durations found in the config
//! and in log messages.
use std::fmt::Write;
use std::time::Duration;

use anyhow::anyhow;

/// Formats a duration given in microseconds.
///
/// This picks the unit (microseconds, milliseconds or seconds) which yields a concise
/// representation with at most three significant digits.
///
/// # Examples
///
/// ```
/// assert_eq!(filecache::fmt::format_short_duration(100), "100 us");
/// assert_eq!(filecache::fmt::format_short_duration(8_192), "8.19 ms");
/// assert_eq!(filecache::fmt::format_short_duration(32_768), "32.8 ms");
/// assert_eq!(filecache::fmt::format_short_duration(128_123), "128 ms");
/// assert_eq!(filecache::fmt::format_short_duration(1_128_123), "1.13 s");
/// assert_eq!(filecache::fmt::format_short_duration(101_000_000), "101 s");
/// ```
pub fn format_short_duration(duration_in_micros: u128) -> String {
    if duration_in_micros < 1_000 {
        format!("{} us", duration_in_micros)
    } else if duration_in_micros < 1_000_000 {
        format!("{} ms", three_digits(duration_in_micros as f64 / 1_000.))
    } else {
        format!("{} s", three_digits(duration_in_micros as f64 / 1_000_000.))
    }
}

/// Renders a value with three significant digits (or as integer for values >= 100).
fn three_digits(value: f64) -> String {
    if value < 10. {
        format!("{:.2}", value)
    } else if value < 100. {
        format!("{:.1}", value)
    } else {
        format!("{:.0}", value)
    }
}

/// Formats a given size in bytes.
///
/// This function determines the ideal unit (ranging from bytes to petabytes) to provide
/// a concise representation.
///
/// # Examples
///
/// ```
/// assert_eq!(filecache::fmt::format_size(0), "0 bytes");
/// assert_eq!(filecache::fmt::format_size(1), "1 byte");
/// assert_eq!(filecache::fmt::format_size(100), "100 bytes");
/// assert_eq!(filecache::fmt::format_size(8_734), "8.53 KiB");
/// assert_eq!(filecache::fmt::format_size(873_400), "853 KiB");
/// assert_eq!(filecache::fmt::format_size(64_000_000), "61.0 MiB");
/// assert_eq!(filecache::fmt::format_size(8_734_000_000), "8.13 GiB");
/// assert_eq!(filecache::fmt::format_size(873_400_000_000_000_000), "776 PiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    const UNITS: [&str; 6] = ["Bytes", "KiB", "MiB", "GiB", "TiB", "PiB"];

    match size_in_bytes {
        1 => "1 byte".to_owned(),
        n if n < 1024 => format!("{} bytes", n),
        n => {
            let mut magnitude = 0;
            let mut size = n as f64;
            while size > 1024. && magnitude < UNITS.len() - 1 {
                size /= 1024.;
                magnitude += 1;
            }

            let mut result = three_digits_inclusive(size);
            let _ = write!(result, " {}", UNITS[magnitude]);
            result
        }
    }
}

/// Just like [three_digits] but treats 10 and 100 as the lower bucket ("10.0" and "100.0").
fn three_digits_inclusive(value: f64) -> String {
    if value <= 10. {
        format!("{:.2}", value)
    } else if value <= 100. {
        format!("{:.1}", value)
    } else {
        format!("{:.0}", value)
    }
}

/// Parses a size from a given string.
///
/// This string can have the following suffixes:
/// * **b** or **B**: treats the value as bytes (same as no suffix)
/// * **k** or **K**: multiplies the given value by 1024 thus treats the value as KiB
/// * **m** or **M**: multiplies the given value by 1.048.576 thus treats the value as MiB
/// * **g** or **G**: multiplies the given value by 1.073.741.824 thus treats the value as GiB
/// * **t** or **T**: multiplies the given value by 1.099.511.627.776 thus treats the value as TiB
///
/// # Examples
///
/// ```
/// assert_eq!(filecache::fmt::parse_size("64000000").unwrap(), 64_000_000);
/// assert_eq!(filecache::fmt::parse_size("100b").unwrap(), 100);
/// assert_eq!(filecache::fmt::parse_size("8k").unwrap(), 8192);
/// assert_eq!(filecache::fmt::parse_size("64 M").unwrap(), 64 * 1024 * 1024);
/// assert_eq!(filecache::fmt::parse_size("1g").unwrap(), 1024 * 1024 * 1024);
///
/// // Unknown suffixes, decimal and negative numbers are rejected...
/// assert_eq!(filecache::fmt::parse_size("3 Y").is_err(), true);
/// assert_eq!(filecache::fmt::parse_size("1.2g").is_err(), true);
/// assert_eq!(filecache::fmt::parse_size("-1").is_err(), true);
/// ```
pub fn parse_size(str: impl AsRef<str>) -> anyhow::Result<usize> {
    lazy_static::lazy_static! {
        static ref SIZE_EXPRESSION: regex::Regex =
            regex::Regex::new(r"^ *(\d+) *([bBkKmMgGtT]?) *$").unwrap();
    }

    let input = str.as_ref();
    let captures = SIZE_EXPRESSION.captures(input).ok_or_else(|| {
        anyhow!(
            "Cannot parse '{}' into a size. Expected a positive number and optionally \
             'b', 'k', 'm', 'g' or 't' as suffix.",
            input
        )
    })?;

    let number = captures[1].parse::<usize>()?;
    let exponent = match captures[2].to_ascii_lowercase().as_str() {
        "k" => 1,
        "m" => 2,
        "g" => 3,
        "t" => 4,
        _ => 0,
    };

    1024usize
        .checked_pow(exponent)
        .and_then(|factor| number.checked_mul(factor))
        .ok_or_else(|| anyhow!("The size '{}' is too large.", input))
}

/// Parses a duration from a given string.
///
/// This string can have the following suffixes:
/// * **ms** or no suffix: treats the value as milliseconds
/// * **s**: treats the value as seconds
/// * **m**: treats the value as minutes
/// * **h**: treats the value as hours
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(filecache::fmt::parse_duration("500").unwrap(), Duration::from_millis(500));
/// assert_eq!(filecache::fmt::parse_duration("100 ms").unwrap(), Duration::from_millis(100));
/// assert_eq!(filecache::fmt::parse_duration("30s").unwrap(), Duration::from_secs(30));
/// assert_eq!(filecache::fmt::parse_duration("3 M").unwrap(), Duration::from_secs(3 * 60));
/// assert_eq!(filecache::fmt::parse_duration("2h").unwrap(), Duration::from_secs(2 * 60 * 60));
///
/// assert_eq!(filecache::fmt::parse_duration("3 Y").is_err(), true);
/// assert_eq!(filecache::fmt::parse_duration("-1m").is_err(), true);
/// ```
pub fn parse_duration(str: impl AsRef<str>) -> anyhow::Result<Duration> {
    lazy_static::lazy_static! {
        static ref DURATION_EXPRESSION: regex::Regex =
            regex::Regex::new(r"^ *(\d+) *((ms|s|m|h|MS|S|M|H)?) *$").unwrap();
    }

    let input = str.as_ref();
    let captures = DURATION_EXPRESSION.captures(input).ok_or_else(|| {
        anyhow!(
            "Cannot parse '{}' into a duration. Expected a positive number and optionally \
             'ms', 's', 'm' or 'h' as suffix.",
            input
        )
    })?;

    let number = captures[1].parse::<u64>()?;
    let seconds_per_unit = match captures[2].to_ascii_lowercase().as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => return Ok(Duration::from_millis(number)),
    };

    number
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow!("The duration '{}' is too large.", input))
}

#[cfg(test)]
mod tests {
    use crate::fmt::{format_short_duration, format_size, parse_duration, parse_size};

    #[test]
    fn sizes_are_formatted_at_unit_boundaries() {
        assert_eq!(format_size(1023), "1023 bytes");
        assert_eq!(format_size(1024), "1024 Bytes");
        assert_eq!(format_size(1025), "1.00 KiB");
        assert_eq!(format_size(10 * 1024 + 1), "10.0 KiB");
    }

    #[test]
    fn short_durations_switch_units() {
        assert_eq!(format_short_duration(999), "999 us");
        assert_eq!(format_short_duration(1_000), "1.00 ms");
        assert_eq!(format_short_duration(999_999), "1000 ms");
        assert_eq!(format_short_duration(1_000_000), "1.00 s");
    }

    #[test]
    fn overflowing_sizes_are_rejected() {
        assert_eq!(parse_size(format!("{}t", usize::MAX)).is_err(), true);
        assert_eq!(parse_size("99999999999999999999999999").is_err(), true);
    }

    #[test]
    fn overflowing_durations_are_rejected() {
        assert_eq!(parse_duration(format!("{}h", u64::MAX)).is_err(), true);
        assert_eq!(parse_duration(format!("{}m", u64::MAX / 2)).is_err(), true);
        assert_eq!(
            parse_duration(format!("{}s", u64::MAX)).unwrap(),
            std::time::Duration::from_secs(u64::MAX)
        );
    }
}
