use chrono::{DateTime, Months, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::fmt;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Round and clamp a score into 0..=100
pub fn confidence(score: f64) -> u8 {
    score.clamp(0.0, 100.0).round() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Spring,
    Summer,
    Fall,
    Winter,
}

impl Season {
    /// `month` is 1-based
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Fall,
            _ => Season::Winter,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Fall => "fall",
            Season::Winter => "winter",
        };
        f.write_str(name)
    }
}

pub fn month_name(month: u32) -> &'static str {
    const MONTHS: [&str; 12] = [
        "January", "February", "March", "April", "May", "June",
        "July", "August", "September", "October", "November", "December",
    ];
    MONTHS.get(month.saturating_sub(1) as usize).copied().unwrap_or("Unknown")
}

pub fn years_before(date: NaiveDate, years: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(12 * years))
        .unwrap_or(NaiveDate::MIN)
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::default()).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        assert_eq!(mean(&[20.0, 25.0, 30.0]), 25.0);
        assert!((std_dev(&[20.0, 25.0, 30.0]) - 4.0825).abs() < 0.001);
        assert_eq!(std_dev(&[6.0, 6.0, 6.0]), 0.0);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn test_seasons() {
        assert_eq!(Season::from_month(3), Season::Spring);
        assert_eq!(Season::from_month(8), Season::Summer);
        assert_eq!(Season::from_month(11), Season::Fall);
        assert_eq!(Season::from_month(12), Season::Winter);
        assert_eq!(Season::from_month(2), Season::Winter);
    }

    #[test]
    fn test_years_before_handles_leap_day() {
        let leap = NaiveDate::from_ymd_opt(2028, 2, 29).unwrap();
        assert_eq!(years_before(leap, 2), NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
    }

    #[test]
    fn test_confidence_clamps() {
        assert_eq!(confidence(-12.0), 0);
        assert_eq!(confidence(44.59), 45);
        assert_eq!(confidence(140.0), 100);
        assert_eq!(month_name(6), "June");
    }
}
