//! Time and unit helpers shared by the replay engine
//!
//! Pure numeric functions: mapping race time onto sample indices, formatting
//! clocks and gaps for display, and the usual clamp/interpolation helpers.

/// Map a race time onto a sample index.
///
/// Truncates rather than rounds, so `time_to_index(10.9, 1) == 10`. An interval
/// of 0 is treated as the default of one second per sample and negative times
/// map to index 0.
pub fn time_to_index(time_seconds: f64, sample_interval_seconds: u32) -> usize {
    let interval = effective_interval(sample_interval_seconds);
    if !time_seconds.is_finite() || time_seconds <= 0.0 {
        return 0;
    }
    (time_seconds / interval as f64).floor() as usize
}

/// Sample interval with the one-second default applied
pub fn effective_interval(sample_interval_seconds: u32) -> u32 {
    if sample_interval_seconds == 0 {
        1
    } else {
        sample_interval_seconds
    }
}

/// Format elapsed seconds as `M:SS`.
///
/// Minutes are unbounded and carry no leading zero; fractional seconds are
/// truncated.
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.trunc() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

/// Format a time gap: `-` when there is no gap, `+Ns` under a minute,
/// `+M:SS` otherwise.
pub fn format_gap(seconds: i64) -> String {
    if seconds <= 0 {
        "-".to_string()
    } else if seconds < 60 {
        format!("+{}s", seconds)
    } else {
        format!("+{}:{:02}", seconds / 60, seconds % 60)
    }
}

/// Format an optional gap, using the `-` sentinel when it is undefined
pub fn format_optional_gap(seconds: Option<i64>) -> String {
    seconds.map(format_gap).unwrap_or_else(|| "-".to_string())
}

/// Parse a clock string (`M:SS`, `H:MM:SS`) or plain seconds into seconds
pub fn parse_clock(input: &str) -> Result<f64, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("Empty time value".to_string());
    }

    if !trimmed.contains(':') {
        let seconds: f64 = trimmed
            .parse()
            .map_err(|_| format!("Invalid time value: {}", input))?;
        if seconds < 0.0 || !seconds.is_finite() {
            return Err(format!("Time must be a non-negative number: {}", input));
        }
        return Ok(seconds);
    }

    let mut total = 0u64;
    for (i, part) in trimmed.split(':').enumerate() {
        let value: u64 = part
            .parse()
            .map_err(|_| format!("Invalid time component '{}' in {}", part, input))?;
        if i > 0 && value >= 60 {
            return Err(format!("Time component out of range in {}", input));
        }
        total = total * 60 + value;
    }
    Ok(total as f64)
}

/// Clamp `value` into `[min, max]`
pub fn clamp<T: PartialOrd>(value: T, min: T, max: T) -> T {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Linear interpolation; extrapolates for `t` outside `[0, 1]`
pub fn lerp(start: f64, end: f64, t: f64) -> f64 {
    start + (end - start) * t
}
