use chrono::{Datelike, Months, NaiveDate};
use log::warn;

/// Date format used by the institution in every wire payload (`DD/MM/YYYY`).
pub const WIRE_DATE_FORMAT: &str = "%d/%m/%Y";

/// A canonical (year, month) pair identifying one billing month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
}

impl CalendarMonth {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// First day of the month, used to derive the billing-period instant.
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .expect("year/month constructed from a valid NaiveDate")
    }

    /// Value of the `billingDate` query parameter for this month.
    pub fn billing_date_param(&self) -> String {
        self.first_day().format("%Y-%m-%d").to_string()
    }

    /// Two-digit month string required by the transactions endpoint.
    pub fn month_param(&self) -> String {
        format!("{:02}", self.month)
    }

    pub fn year_param(&self) -> String {
        format!("{}", self.year)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

/// Ordered sequence of calendar months from `start` up to and including the
/// month containing `now`. Empty when `start` is in the future.
pub fn month_sequence(start: NaiveDate, now: NaiveDate) -> Vec<CalendarMonth> {
    let end = CalendarMonth::from_date(now);
    let mut current = CalendarMonth::from_date(start);
    let mut months = Vec::new();

    while current <= end {
        months.push(current);
        current = current.next();
    }

    months
}

/// Parse a `DD/MM/YYYY` wire date. Returns `None` on malformed input so the
/// caller can keep the record alive instead of failing the month.
pub fn parse_wire_date(raw: &str) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(raw.trim(), WIRE_DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(_) => {
            warn!("unparseable wire date '{}', keeping record undated", raw);
            None
        }
    }
}

pub fn one_year_before(date: NaiveDate) -> NaiveDate {
    date.checked_sub_months(Months::new(12))
        .unwrap_or(NaiveDate::MIN)
}
