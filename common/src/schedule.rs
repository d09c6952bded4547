// Schedule parsing and next fire time calculation
//
// Cadences are cron expressions. The CI runner uses the 5-field crontab form
// while the `cron` crate expects a leading seconds field and numbers weekdays
// differently, so 5-field expressions are normalized before parsing.

use crate::errors::ScheduleError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;

/// ScheduleTrigger trait defines the interface for calculating next fire times
pub trait ScheduleTrigger {
    /// Calculate the next fire time strictly after the last one (or now)
    fn next_execution_time(
        &self,
        last_execution: Option<DateTime<Utc>>,
    ) -> Result<DateTime<Utc>, ScheduleError>;
}

/// A cron cadence evaluated in a fixed timezone
#[derive(Debug, Clone)]
pub struct Cadence {
    expression: String,
    timezone: Tz,
    schedule: CronSchedule,
}

impl Cadence {
    /// Build a cadence from a crontab or seconds-precision expression
    pub fn new(expression: &str, timezone: &str) -> Result<Self, ScheduleError> {
        let normalized = normalize_cron_expression(expression);
        let schedule = parse_cron_expression(&normalized)?;
        let timezone = parse_timezone(timezone)?;

        Ok(Self {
            expression: expression.trim().to_string(),
            timezone,
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The next `count` fire times after `after`
    pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .take(count)
            .map(|t| t.with_timezone(&Utc))
            .collect()
    }
}

impl ScheduleTrigger for Cadence {
    fn next_execution_time(
        &self,
        last_execution: Option<DateTime<Utc>>,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        let reference_time = last_execution.unwrap_or_else(Utc::now);
        let reference_in_tz = reference_time.with_timezone(&self.timezone);

        self.schedule
            .after(&reference_in_tz)
            .next()
            .map(|next| next.with_timezone(&Utc))
            .ok_or_else(|| ScheduleError::NoNextFireTime(self.expression.clone()))
    }
}

const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Convert a 5-field crontab expression to the `cron` crate's dialect
///
/// A zero seconds field is prefixed and numeric day-of-week values (crontab:
/// 0-7, Sunday = 0 or 7) are rewritten as day names, since the `cron` crate
/// numbers weekdays 1-7 from Sunday. Other expressions are only trimmed.
pub fn normalize_cron_expression(expression: &str) -> String {
    let trimmed = expression.trim();
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    if fields.len() != 5 {
        return trimmed.to_string();
    }

    let day_of_week = crontab_weekdays(fields[4]).unwrap_or_else(|| fields[4].to_string());
    format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], day_of_week
    )
}

/// Rewrite a numeric crontab day-of-week field as a list of day names
///
/// Returns None for fields that need no rewrite (`*`, `?`, names) or that
/// are not valid crontab syntax, leaving them to the cron parser.
fn crontab_weekdays(field: &str) -> Option<String> {
    if field == "*" || field == "?" || field.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut days = [false; 7];
    for element in field.split(',') {
        let (base, step) = match element.split_once('/') {
            Some((base, step)) => (base, step.parse::<u32>().ok().filter(|s| *s > 0)?),
            None => (element, 1),
        };

        let (start, end) = match base {
            "*" => (0, 6),
            _ => match base.split_once('-') {
                Some((a, b)) => (a.parse::<u32>().ok()?, b.parse::<u32>().ok()?),
                // "n/step" runs from n to the end of the week
                None if element.contains('/') => (base.parse::<u32>().ok()?, 7),
                None => {
                    let n = base.parse::<u32>().ok()?;
                    (n, n)
                }
            },
        };
        if start > end || end > 7 {
            return None;
        }

        for day in (start..=end).step_by(step as usize) {
            days[(day % 7) as usize] = true;
        }
    }

    if days.iter().all(|d| *d) {
        return Some("*".to_string());
    }

    let names: Vec<&str> = WEEKDAY_NAMES
        .iter()
        .zip(days)
        .filter(|(_, selected)| *selected)
        .map(|(name, _)| *name)
        .collect();
    Some(names.join(","))
}

/// Parse and validate a seconds-precision cron expression
pub fn parse_cron_expression(expression: &str) -> Result<CronSchedule, ScheduleError> {
    CronSchedule::from_str(expression).map_err(|e| ScheduleError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Parse an IANA timezone name
pub fn parse_timezone(name: &str) -> Result<Tz, ScheduleError> {
    Tz::from_str(name).map_err(|_| ScheduleError::InvalidTimezone(name.to_string()))
}

/// Next fire time of `expression` in `timezone` strictly after `after`
pub fn next_fire_time(
    expression: &str,
    timezone: &str,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    Cadence::new(expression, timezone)?.next_execution_time(Some(after))
}
