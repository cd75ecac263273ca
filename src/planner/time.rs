use chrono::{Duration, NaiveDate};

use crate::{
    config::EngineConfig,
    error::{QueryError, QueryResult},
    models::{NamedRange, TimeRangeSpec},
    store::DateRange,
};

/// Resolve an optional time specification to a concrete inclusive range.
///
/// Exactly one form may be present: a named hint, a relative window, or an
/// absolute start/end pair. An absent spec defaults to the configured
/// trailing window ending today. Pure in `today` so callers pin the clock.
pub fn resolve_time_range(
    spec: Option<&TimeRangeSpec>,
    today: NaiveDate,
    config: &EngineConfig,
) -> QueryResult<DateRange> {
    let Some(spec) = spec else {
        return Ok(trailing(today, config.default_range_days));
    };

    let relative = spec.last_n_days.is_some();
    let absolute = spec.start.is_some() || spec.end.is_some();
    let named = spec.named.is_some();
    let forms = usize::from(relative) + usize::from(absolute) + usize::from(named);
    if forms > 1 {
        return Err(QueryError::InvalidTimeRange(
            "specify exactly one of last_n_days, start/end, or a named range".to_string(),
        ));
    }

    if let Some(named) = spec.named {
        let day = match named {
            NamedRange::Today => today,
            NamedRange::Yesterday => today - Duration::days(1),
        };
        return Ok(DateRange {
            start: day,
            end: day,
        });
    }

    if let Some(n) = spec.last_n_days {
        if n == 0 || n > config.max_range_days {
            return Err(QueryError::InvalidTimeRange(format!(
                "last_n_days must be between 1 and {}",
                config.max_range_days
            )));
        }
        return Ok(trailing(today, n));
    }

    match (spec.start, spec.end) {
        (Some(start), Some(end)) => {
            if end < start {
                return Err(QueryError::InvalidTimeRange(format!(
                    "end {end} precedes start {start}"
                )));
            }
            Ok(DateRange { start, end })
        }
        _ => Err(QueryError::InvalidTimeRange(
            "absolute ranges need both start and end".to_string(),
        )),
    }
}

/// Window of `days` calendar days ending `today`.
fn trailing(today: NaiveDate, days: u32) -> DateRange {
    DateRange {
        start: today - Duration::days(i64::from(days) - 1),
        end: today,
    }
}
