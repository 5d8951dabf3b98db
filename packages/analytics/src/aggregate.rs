//! Per-region sighting aggregation.

use std::collections::BTreeMap;

use monarch_map_region_models::{
    AggregateSummary, RegionAggregate, RegionKey, Resolution, ResolvedObservation,
};

use crate::{AnalyticsError, checked_count};

/// Groups resolved observations by region and sums their counts.
///
/// Rows without a count contribute 1. Rows tagged
/// [`Resolution::Unresolved`] are summed into
/// [`AggregateSummary::unresolved_count`] rather than dropped, so the
/// resolved total plus the unresolved total always equals
/// [`AggregateSummary::total_count`]. Output is ordered by region key and
/// does not depend on input order.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidAggregateInput`] if any row has a
/// negative count. No partial result is returned in that case.
pub fn aggregate(observations: &[ResolvedObservation]) -> Result<AggregateSummary, AnalyticsError> {
    let mut by_region: BTreeMap<&RegionKey, u64> = BTreeMap::new();
    let mut unresolved_count = 0u64;
    let mut total_count = 0u64;

    for (index, row) in observations.iter().enumerate() {
        let count = checked_count(index, row.observation.effective_count())?;
        total_count = total_count.saturating_add(count);

        match &row.resolution {
            Resolution::Resolved(region) => {
                let entry = by_region.entry(region).or_default();
                *entry = entry.saturating_add(count);
            }
            Resolution::Unresolved => {
                unresolved_count = unresolved_count.saturating_add(count);
            }
        }
    }

    let aggregates: Vec<RegionAggregate> = by_region
        .into_iter()
        .map(|(region, sighting_count)| RegionAggregate {
            region: region.clone(),
            sighting_count,
        })
        .collect();

    log::debug!(
        "Aggregated {} observations into {} regions ({unresolved_count} unresolved)",
        observations.len(),
        aggregates.len()
    );

    Ok(AggregateSummary {
        aggregates,
        unresolved_count,
        observation_rows: observations.len(),
        total_count,
    })
}

#[cfg(test)]
mod tests {
    use monarch_map_region_models::Observation;

    use super::*;

    fn resolved(region: &str, count: Option<i64>) -> ResolvedObservation {
        let mut observation = Observation::at(30.0, -97.0);
        observation.count = count;
        ResolvedObservation {
            observation,
            resolution: Resolution::Resolved(RegionKey::new(region).unwrap()),
        }
    }

    fn unresolved(count: Option<i64>) -> ResolvedObservation {
        let mut observation = Observation::at(0.0, 0.0);
        observation.count = count;
        ResolvedObservation {
            observation,
            resolution: Resolution::Unresolved,
        }
    }

    fn counts(summary: &AggregateSummary) -> Vec<(&str, u64)> {
        summary
            .aggregates
            .iter()
            .map(|a| (a.region.as_str(), a.sighting_count))
            .collect()
    }

    #[test]
    fn sums_counts_per_region() {
        let rows = vec![
            resolved("A", Some(3)),
            resolved("A", Some(4)),
            resolved("B", Some(5)),
        ];
        let summary = aggregate(&rows).unwrap();

        assert_eq!(counts(&summary), vec![("a", 7), ("b", 5)]);
        assert_eq!(summary.unresolved_count, 0);
        assert_eq!(summary.total_count, 12);
    }

    #[test]
    fn missing_count_defaults_to_one() {
        let rows = vec![resolved("A", None), resolved("a", None), unresolved(None)];
        let summary = aggregate(&rows).unwrap();

        assert_eq!(counts(&summary), vec![("a", 2)]);
        assert_eq!(summary.unresolved_count, 1);
        assert_eq!(summary.observation_rows, 3);
    }

    #[test]
    fn conserves_totals() {
        let rows = vec![
            resolved("Travis", Some(2)),
            unresolved(Some(6)),
            resolved("Hays", None),
            unresolved(None),
            resolved("travis", Some(0)),
        ];
        let summary = aggregate(&rows).unwrap();

        assert_eq!(
            summary.resolved_count() + summary.unresolved_count,
            summary.total_count
        );
        assert_eq!(summary.total_count, 10);
    }

    #[test]
    fn order_independent() {
        let mut rows = vec![
            resolved("C", Some(1)),
            resolved("A", Some(2)),
            unresolved(Some(3)),
            resolved("B", Some(4)),
            resolved("A", Some(5)),
        ];
        let forward = aggregate(&rows).unwrap();
        rows.reverse();
        let backward = aggregate(&rows).unwrap();

        assert_eq!(forward, backward);
    }

    #[test]
    fn negative_count_fails_whole_batch() {
        let rows = vec![resolved("A", Some(3)), resolved("B", Some(-1))];
        let err = aggregate(&rows).unwrap_err();

        assert!(matches!(
            err,
            AnalyticsError::InvalidAggregateInput { index: 1, count: -1 }
        ));
    }

    #[test]
    fn empty_input_gives_empty_summary() {
        assert_eq!(aggregate(&[]).unwrap(), AggregateSummary::default());
    }
}
