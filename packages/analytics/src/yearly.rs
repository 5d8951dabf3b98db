//! Per-year sighting totals.

use std::collections::BTreeMap;

use chrono::Datelike;
use monarch_map_analytics_models::TimeSeries;
use monarch_map_region_models::Observation;

use crate::{AnalyticsError, checked_count};

/// Sums observation counts by calendar year.
///
/// Rows without a parsable date are skipped. When `state` is given only
/// rows whose state matches it (trimmed, case-insensitive) are counted.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidAggregateInput`] if a counted row has a
/// negative count.
pub fn yearly_series(
    name: impl Into<String>,
    observations: &[Observation],
    state: Option<&str>,
) -> Result<TimeSeries<i32>, AnalyticsError> {
    let wanted = state.map(normalize_state);
    let mut totals: BTreeMap<i32, u64> = BTreeMap::new();

    for (index, observation) in observations.iter().enumerate() {
        if let Some(wanted) = &wanted {
            let matches = observation
                .state
                .as_deref()
                .is_some_and(|s| normalize_state(s) == *wanted);
            if !matches {
                continue;
            }
        }

        let count = checked_count(index, observation.effective_count())?;
        let Some(date) = observation.timestamp else {
            continue;
        };

        let entry = totals.entry(date.year()).or_default();
        *entry = entry.saturating_add(count);
    }

    Ok(TimeSeries::new(name, to_points(totals))?)
}

/// Builds one yearly series per distinct state, ordered by state.
///
/// Rows without a state are skipped. Series are named after the state as
/// it first appears in the input.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidAggregateInput`] if a row with a state
/// has a negative count.
pub fn yearly_by_state(
    observations: &[Observation],
) -> Result<Vec<TimeSeries<i32>>, AnalyticsError> {
    let mut by_state: BTreeMap<String, (String, BTreeMap<i32, u64>)> = BTreeMap::new();

    for (index, observation) in observations.iter().enumerate() {
        let Some(state) = observation.state.as_deref().filter(|s| !s.trim().is_empty()) else {
            continue;
        };

        let count = checked_count(index, observation.effective_count())?;
        let (_, totals) = by_state
            .entry(normalize_state(state))
            .or_insert_with(|| (state.trim().to_string(), BTreeMap::new()));

        if let Some(date) = observation.timestamp {
            let entry = totals.entry(date.year()).or_default();
            *entry = entry.saturating_add(count);
        }
    }

    by_state
        .into_values()
        .map(|(name, totals)| {
            TimeSeries::new(name, to_points(totals)).map_err(AnalyticsError::from)
        })
        .collect()
}

fn normalize_state(state: &str) -> String {
    state.trim().to_lowercase()
}

#[allow(clippy::cast_precision_loss)]
fn to_points(totals: BTreeMap<i32, u64>) -> impl Iterator<Item = (i32, f64)> {
    totals.into_iter().map(|(year, total)| (year, total as f64))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn sighting(year: i32, count: Option<i64>, state: Option<&str>) -> Observation {
        let mut observation = Observation::at(30.0, -97.0)
            .with_timestamp(NaiveDate::from_ymd_opt(year, 6, 1).unwrap());
        observation.count = count;
        observation.state = state.map(String::from);
        observation
    }

    fn values(series: &TimeSeries<i32>) -> Vec<(i32, f64)> {
        series.points().iter().map(|p| (p.key, p.value)).collect()
    }

    #[test]
    fn sums_by_year() {
        let rows = vec![
            sighting(2021, Some(3), None),
            sighting(2021, None, None),
            sighting(2022, Some(10), None),
            Observation::at(1.0, 1.0).with_count(99),
        ];

        let series = yearly_series("all", &rows, None).unwrap();
        assert_eq!(series.name(), "all");
        assert_eq!(values(&series), vec![(2021, 4.0), (2022, 10.0)]);
    }

    #[test]
    fn filters_by_state_case_insensitively() {
        let rows = vec![
            sighting(2021, Some(2), Some("Texas")),
            sighting(2021, Some(5), Some("Oklahoma")),
            sighting(2022, Some(1), Some(" TEXAS ")),
            sighting(2022, Some(7), None),
        ];

        let series = yearly_series("texas", &rows, Some("texas")).unwrap();
        assert_eq!(values(&series), vec![(2021, 2.0), (2022, 1.0)]);
    }

    #[test]
    fn negative_count_is_rejected() {
        let rows = vec![sighting(2021, Some(-4), None)];
        assert!(matches!(
            yearly_series("all", &rows, None),
            Err(AnalyticsError::InvalidAggregateInput { index: 0, count: -4 })
        ));
    }

    #[test]
    fn negative_count_outside_filter_is_ignored() {
        let rows = vec![
            sighting(2021, Some(-4), Some("Kansas")),
            sighting(2021, Some(1), Some("Texas")),
        ];
        let series = yearly_series("tx", &rows, Some("Texas")).unwrap();
        assert_eq!(values(&series), vec![(2021, 1.0)]);
    }

    #[test]
    fn groups_series_by_state() {
        let rows = vec![
            sighting(2021, Some(2), Some("Texas")),
            sighting(2022, Some(3), Some("texas")),
            sighting(2021, Some(5), Some("Kansas")),
            sighting(2021, Some(9), None),
        ];

        let all = yearly_by_state(&rows).unwrap();
        let names: Vec<&str> = all.iter().map(TimeSeries::name).collect();
        assert_eq!(names, vec!["Kansas", "Texas"]);
        assert_eq!(values(&all[1]), vec![(2021, 2.0), (2022, 3.0)]);
    }
}
