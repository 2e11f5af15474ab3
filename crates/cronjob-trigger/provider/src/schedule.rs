use chrono_tz::Tz;
use croner::Cron;

use crate::{Error, Result};

const FIELDS: usize = 5;

/// Units an `@every` duration may use.
const DURATION_UNITS: &[&str] = &["ns", "us", "µs", "μs", "ms", "s", "m", "h"];

/// Checks a schedule against the dialect Kubernetes CronJobs accept.
pub fn validate_schedule(schedule: &str) -> Result<()> {
    let invalid = |reason: String| Error::InvalidSchedule {
        schedule: schedule.into(),
        reason,
    };

    let expr = strip_time_zone(schedule.trim()).map_err(invalid)?;

    if let Some(duration) = expr.strip_prefix("@every") {
        if !duration.starts_with(char::is_whitespace) {
            return Err(invalid("@every needs a duration".into()));
        }
        return validate_duration(duration.trim()).map_err(invalid);
    }

    let expr = match expr {
        "@midnight" => "@daily",
        expr if expr.starts_with('@') => expr,
        expr => {
            let fields = expr.split_whitespace().count();
            if fields != FIELDS {
                return Err(invalid(format!("expected {FIELDS} fields, found {fields}")));
            }
            expr
        }
    };

    Cron::new(expr)
        .parse()
        .map(|_| ())
        .map_err(|error| invalid(error.to_string()))
}

fn strip_time_zone(expr: &str) -> ::core::result::Result<&str, String> {
    for prefix in ["CRON_TZ=", "TZ="] {
        if let Some(rest) = expr.strip_prefix(prefix) {
            let (zone, rest) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "missing expression after the time zone".to_string())?;
            zone.parse::<Tz>()
                .map_err(|_| format!("unknown time zone {zone:?}"))?;
            return Ok(rest.trim_start());
        }
    }
    Ok(expr)
}

/// Accepts what Go's `time.ParseDuration` accepts, minus fractions.
fn validate_duration(duration: &str) -> ::core::result::Result<(), String> {
    let has_known_units = duration
        .split(|c: char| c.is_ascii_digit())
        .filter(|unit| !unit.is_empty())
        .all(|unit| DURATION_UNITS.contains(&unit));
    if duration.is_empty() || duration.contains(char::is_whitespace) || !has_known_units {
        return Err(format!("invalid duration {duration:?}"));
    }

    match ::humantime::parse_duration(duration) {
        Ok(duration) if !duration.is_zero() => Ok(()),
        Ok(_) => Err("duration must be positive".into()),
        Err(error) => Err(format!("invalid duration {duration:?}: {error}")),
    }
}
