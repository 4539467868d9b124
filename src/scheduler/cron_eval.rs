//! Six-field cron evaluation, delegated to an off-the-shelf evaluator
//! rather than hand-rolled parsing (design notes recommend this; seconds
//! precision is required).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::errors::{AppError, AppResult};

pub fn validate_cron(expression: &str) -> AppResult<Schedule> {
    Schedule::from_str(expression)
        .map_err(|e| AppError::invalid_argument(format!("invalid cron expression '{expression}': {e}")))
}

/// The next fire time strictly after `after`, or `None` if the schedule
/// has no future occurrences (a degenerate expression that never fires).
pub fn next_fire_after(expression: &str, after: DateTime<Utc>) -> AppResult<Option<DateTime<Utc>>> {
    let schedule = validate_cron(expression)?;
    Ok(schedule.after(&after).next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_expressions() {
        assert!(validate_cron("not a cron").is_err());
    }

    #[test]
    fn accepts_six_field_expression() {
        assert!(validate_cron("0 0 3 * * *").is_ok());
    }

    #[test]
    fn next_fire_is_strictly_after_the_reference_time() {
        let now = Utc::now();
        let next = next_fire_after("0 0/15 * * * *", now).unwrap().unwrap();
        assert!(next > now);
    }
}
