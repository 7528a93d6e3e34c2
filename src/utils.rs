use anyhow::{anyhow, Context, Result};
use clap::builder::{
    styling::{AnsiColor, Effects},
    Styles,
};

/// Parse a simulated instant or duration into seconds.
///
/// Supported formats:
/// - `"HH:MM:SS"`: hours:minutes:seconds
/// - `"MM:SS"`: minutes:seconds
/// - `"90"`, `"1.5"`: plain seconds
/// - `"2h"`, `"30m"`, `"45s"`: a single number with a unit
///
/// # Examples
///
/// ```
/// use vmsim::utils::parse_sim_time;
///
/// assert_eq!(parse_sim_time("90").unwrap(), 90.0);
/// assert_eq!(parse_sim_time("30:45").unwrap(), 1845.0);
/// assert_eq!(parse_sim_time("2:30:45").unwrap(), 9045.0);
/// assert_eq!(parse_sim_time("2h").unwrap(), 7200.0);
/// ```
pub fn parse_sim_time(time_str: &str) -> Result<f64> {
    let time_str = time_str.trim();
    if time_str.is_empty() {
        return Err(anyhow!("Time cannot be empty"));
    }

    let parts: Vec<&str> = time_str.split(':').collect();
    let seconds = match parts.len() {
        1 => {
            let (number, scale) = match time_str.chars().last() {
                Some('h') => (&time_str[..time_str.len() - 1], 3600.0),
                Some('m') => (&time_str[..time_str.len() - 1], 60.0),
                Some('s') => (&time_str[..time_str.len() - 1], 1.0),
                _ => (time_str, 1.0),
            };
            number
                .trim()
                .parse::<f64>()
                .context("Invalid time format. Expected seconds or a number with h/m/s")?
                * scale
        }
        2 => {
            let minutes = parts[0]
                .parse::<u64>()
                .context("Invalid minutes in MM:SS format")?;
            let seconds = parts[1]
                .parse::<f64>()
                .context("Invalid seconds in MM:SS format")?;
            minutes as f64 * 60.0 + seconds
        }
        3 => {
            let hours = parts[0]
                .parse::<u64>()
                .context("Invalid hours in HH:MM:SS format")?;
            let minutes = parts[1]
                .parse::<u64>()
                .context("Invalid minutes in HH:MM:SS format")?;
            let seconds = parts[2]
                .parse::<f64>()
                .context("Invalid seconds in HH:MM:SS format")?;
            hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds
        }
        _ => {
            return Err(anyhow!(
                "Invalid time format. Expected formats: HH:MM:SS, MM:SS, or seconds"
            ))
        }
    };

    if !seconds.is_finite() || seconds < 0.0 {
        return Err(anyhow!("Time must be a non-negative number of seconds"));
    }
    Ok(seconds)
}

/// Format simulated seconds as `HH:MM:SS`, keeping millisecond precision when
/// the value is fractional.
///
/// # Examples
///
/// ```
/// use vmsim::utils::format_sim_time;
///
/// assert_eq!(format_sim_time(45.0), "00:00:45");
/// assert_eq!(format_sim_time(9045.0), "02:30:45");
/// assert_eq!(format_sim_time(1.5), "00:00:01.500");
/// assert_eq!(format_sim_time(90000.0), "25:00:00");
/// ```
pub fn format_sim_time(seconds: f64) -> String {
    let total_millis = (seconds * 1000.0).round() as u64;
    let whole = total_millis / 1000;
    let millis = total_millis % 1000;
    let hours = whole / 3600;
    let minutes = (whole % 3600) / 60;
    let secs = whole % 60;

    if millis == 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
    }
}

/// Format an optional instant, `-` when unset.
pub fn format_opt_time(time: Option<f64>) -> String {
    time.map(format_sim_time).unwrap_or_else(|| "-".to_string())
}

pub const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sim_time_units() {
        assert_eq!(parse_sim_time("30m").unwrap(), 1800.0);
        assert_eq!(parse_sim_time("45s").unwrap(), 45.0);
        assert_eq!(parse_sim_time("0.5h").unwrap(), 1800.0);
        assert_eq!(parse_sim_time(" 12 ").unwrap(), 12.0);
    }

    #[test]
    fn test_parse_sim_time_clock_formats() {
        assert_eq!(parse_sim_time("01:00").unwrap(), 60.0);
        assert_eq!(parse_sim_time("1:00:00").unwrap(), 3600.0);
        assert_eq!(parse_sim_time("0:00:01.5").unwrap(), 1.5);
    }

    #[test]
    fn test_parse_sim_time_invalid() {
        assert!(parse_sim_time("").is_err());
        assert!(parse_sim_time("abc").is_err());
        assert!(parse_sim_time("-5").is_err());
        assert!(parse_sim_time("1:2:3:4").is_err());
        assert!(parse_sim_time("inf").is_err());
    }

    #[test]
    fn test_parse_sim_time_large_values() {
        assert_eq!(
            parse_sim_time("400000000000000000:00").unwrap(),
            400000000000000000.0 * 60.0
        );
        assert!(parse_sim_time("18446744073709551615:59:59").is_ok());
    }

    #[test]
    fn test_format_sim_time_rounds_into_next_second() {
        assert_eq!(format_sim_time(1.9996), "00:00:02");
        assert_eq!(format_sim_time(59.9999), "00:01:00");
        assert_eq!(format_sim_time(1.0004), "00:00:01");
        assert_eq!(format_sim_time(1.25), "00:00:01.250");
    }

    #[test]
    fn test_format_opt_time() {
        assert_eq!(format_opt_time(None), "-");
        assert_eq!(format_opt_time(Some(3600.0)), "01:00:00");
    }
}
