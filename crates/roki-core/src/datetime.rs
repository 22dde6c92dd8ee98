use anyhow::{Context, anyhow};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Bucket for exam dates that fall into none of the configured periods.
pub const OUTSIDE_PERIOD: &str = "izven izpitnih obdobij";

const DAYS: [&str; 7] = [
    "ponedeljek",
    "torek",
    "sreda",
    "četrtek",
    "petek",
    "sobota",
    "nedelja",
];

const MONTHS: [&str; 12] = [
    "januar",
    "februar",
    "marec",
    "april",
    "maj",
    "junij",
    "julij",
    "avgust",
    "september",
    "oktober",
    "november",
    "december",
];

/// A named, inclusive date range such as the winter exam period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamPeriod {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Name of the first period containing the date, or the fixed
/// outside-periods bucket.
pub fn assign_period(date: NaiveDate, periods: &[ExamPeriod]) -> String {
    for period in periods {
        if period.start <= date && date <= period.end {
            return period.name.clone();
        }
    }
    OUTSIDE_PERIOD.to_string()
}

pub fn parse_iso_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date (expected YYYY-MM-DD): {raw}"))
}

/// Parses `2022-01-15..2022-02-15` into an inclusive range.
pub fn parse_date_range(raw: &str) -> anyhow::Result<(NaiveDate, NaiveDate)> {
    let (start_raw, end_raw) = raw
        .split_once("..")
        .ok_or_else(|| anyhow!("expected START..END, got: {raw}"))?;
    let start = parse_iso_date(start_raw)?;
    let end = parse_iso_date(end_raw)?;
    if end < start {
        return Err(anyhow!("period ends before it starts: {raw}"));
    }
    Ok((start, end))
}

/// "2022-10-03" becomes "3. oktober 2022 (ponedeljek)".
pub fn format_long_date(date: NaiveDate) -> String {
    let day = DAYS[date.weekday().num_days_from_monday() as usize];
    let month = MONTHS[date.month0() as usize];
    format!("{}. {} {} ({})", date.day(), month, date.year(), day)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{ExamPeriod, OUTSIDE_PERIOD, assign_period, format_long_date, parse_date_range};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn winter_and_summer() -> Vec<ExamPeriod> {
        vec![
            ExamPeriod {
                name: "zimsko".to_string(),
                start: date(2022, 1, 15),
                end: date(2022, 2, 15),
            },
            ExamPeriod {
                name: "letno".to_string(),
                start: date(2022, 6, 15),
                end: date(2022, 7, 15),
            },
        ]
    }

    #[test]
    fn dates_fall_into_the_first_matching_period() {
        let periods = winter_and_summer();
        assert_eq!(assign_period(date(2022, 1, 15), &periods), "zimsko");
        assert_eq!(assign_period(date(2022, 2, 15), &periods), "zimsko");
        assert_eq!(assign_period(date(2022, 7, 1), &periods), "letno");
    }

    #[test]
    fn dates_outside_every_period_get_the_fixed_bucket() {
        let periods = winter_and_summer();
        assert_eq!(assign_period(date(2022, 4, 1), &periods), OUTSIDE_PERIOD);
        assert_eq!(assign_period(date(2022, 4, 1), &[]), OUTSIDE_PERIOD);
    }

    #[test]
    fn long_dates_read_in_slovene() {
        assert_eq!(
            format_long_date(date(2022, 10, 3)),
            "3. oktober 2022 (ponedeljek)"
        );
        assert_eq!(
            format_long_date(date(2022, 6, 29)),
            "29. junij 2022 (sreda)"
        );
    }

    #[test]
    fn ranges_parse_and_reject_reversals() {
        let (start, end) = parse_date_range("2022-01-15..2022-02-15").expect("range");
        assert_eq!(start, date(2022, 1, 15));
        assert_eq!(end, date(2022, 2, 15));
        assert!(parse_date_range("2022-02-15..2022-01-15").is_err());
        assert!(parse_date_range("2022-02-15").is_err());
    }
}
