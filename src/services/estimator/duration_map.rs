use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::features::TrainingRow;
use crate::error::{EstimatorError, Result};

pub const HIGHLIGHT_CHECKPOINTS: [u32; 4] = [100, 50, 25, 5];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationPoint {
    pub soc: f64,
    pub remaining_time: f64,
}

/// SoC -> remaining seconds lookup, ascending by SoC.
///
/// Lookups match the nearest stored SoC rather than interpolating in time,
/// since measured SoC is not strictly monotonic over a discharge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationMap {
    points: Vec<DurationPoint>,
}

impl DurationMap {
    pub fn build(rows: &[TrainingRow]) -> Self {
        let mut points: Vec<DurationPoint> = rows
            .iter()
            .map(|row| DurationPoint {
                soc: row.soc,
                remaining_time: row.remaining_time,
            })
            .collect();
        // Stable so duplicate SoC values keep their series order.
        points.sort_by(|a, b| a.soc.total_cmp(&b.soc));
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[DurationPoint] {
        &self.points
    }

    /// Remaining seconds for the stored SoC closest to `target_soc`
    /// (clipped to 0..=100). Ties resolve to the earliest entry.
    pub fn remaining_seconds(&self, target_soc: f64) -> Result<f64> {
        let idx = self.nearest_index(target_soc)?;
        Ok(self.points[idx].remaining_time)
    }

    fn nearest_index(&self, target_soc: f64) -> Result<usize> {
        if self.points.is_empty() {
            return Err(EstimatorError::DurationMapEmpty);
        }
        let target = target_soc.clamp(0.0, 100.0);
        let upper = self.points.partition_point(|p| p.soc < target);

        let mut best: Option<usize> = None;
        if upper > 0 {
            let below = self.points[upper - 1].soc;
            best = Some(self.points.partition_point(|p| p.soc < below));
        }
        if upper < self.points.len() {
            let above_diff = (self.points[upper].soc - target).abs();
            match best {
                Some(b) if (self.points[b].soc - target).abs() <= above_diff => {}
                _ => best = Some(upper),
            }
        }
        best.ok_or(EstimatorError::DurationMapEmpty)
    }

    /// Remaining time at the standard checkpoints, formatted for display.
    pub fn highlights(&self) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for checkpoint in HIGHLIGHT_CHECKPOINTS {
            let seconds = self.remaining_seconds(f64::from(checkpoint))?;
            out.insert(format!("{checkpoint}%"), format!("{:.1} min", seconds / 60.0));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(soc: f64, remaining_time: f64) -> TrainingRow {
        TrainingRow {
            voltage: 12.0,
            current: 1.0,
            temperature: 25.0,
            soc,
            time: 0.0,
            remaining_time,
        }
    }

    // Index of the first minimum, scanning in order.
    fn linear_scan(map: &DurationMap, target: f64) -> f64 {
        let target = target.clamp(0.0, 100.0);
        let mut best = 0;
        for (i, p) in map.points().iter().enumerate() {
            if (p.soc - target).abs() < (map.points()[best].soc - target).abs() {
                best = i;
            }
        }
        map.points()[best].remaining_time
    }

    #[test]
    fn build_sorts_ascending_for_any_order() {
        let map = DurationMap::build(&[row(40.0, 1.0), row(90.0, 2.0), row(10.0, 3.0), row(55.5, 4.0)]);
        let socs: Vec<f64> = map.points().iter().map(|p| p.soc).collect();
        assert_eq!(socs, vec![10.0, 40.0, 55.5, 90.0]);
    }

    #[test]
    fn exact_soc_returns_its_remaining_time() {
        let map = DurationMap::build(&[row(100.0, 600.0), row(50.0, 300.0), row(0.0, 0.0)]);
        assert_eq!(map.remaining_seconds(50.0).unwrap(), 300.0);
        assert_eq!(map.remaining_seconds(100.0).unwrap(), 600.0);
        assert_eq!(map.remaining_seconds(0.0).unwrap(), 0.0);
    }

    #[test]
    fn target_is_clipped_before_lookup() {
        let map = DurationMap::build(&[row(100.0, 600.0), row(20.0, 100.0)]);
        assert_eq!(map.remaining_seconds(150.0).unwrap(), 600.0);
        assert_eq!(map.remaining_seconds(-20.0).unwrap(), 100.0);
    }

    #[test]
    fn equidistant_targets_resolve_to_lower_soc() {
        let map = DurationMap::build(&[row(60.0, 10.0), row(40.0, 20.0)]);
        assert_eq!(map.remaining_seconds(50.0).unwrap(), 20.0);
    }

    #[test]
    fn duplicate_soc_returns_first_in_series_order() {
        let map = DurationMap::build(&[row(30.0, 111.0), row(70.0, 5.0), row(30.0, 222.0), row(30.0, 333.0)]);
        assert_eq!(map.remaining_seconds(31.0).unwrap(), 111.0);
        assert_eq!(map.remaining_seconds(0.0).unwrap(), 111.0);
    }

    #[test]
    fn matches_linear_scan() {
        let socs = [3.0, 97.5, 42.0, 42.0, 18.25, 64.0, 0.0, 100.0, 64.0, 80.1];
        let rows: Vec<TrainingRow> = socs
            .iter()
            .enumerate()
            .map(|(i, soc)| row(*soc, i as f64 * 10.0))
            .collect();
        let map = DurationMap::build(&rows);
        let mut target = -5.0;
        while target <= 105.0 {
            assert_eq!(
                map.remaining_seconds(target).unwrap(),
                linear_scan(&map, target),
                "target {target}"
            );
            target += 0.25;
        }
    }

    #[test]
    fn empty_map_fails() {
        let map = DurationMap::build(&[]);
        assert!(matches!(
            map.remaining_seconds(50.0),
            Err(EstimatorError::DurationMapEmpty)
        ));
        assert!(map.highlights().is_err());
    }

    #[test]
    fn highlights_cover_checkpoints() {
        let map = DurationMap::build(&[row(100.0, 3600.0), row(50.0, 1800.0), row(25.0, 900.0), row(5.0, 90.0)]);
        let highlights = map.highlights().unwrap();
        assert_eq!(highlights["100%"], "60.0 min");
        assert_eq!(highlights["50%"], "30.0 min");
        assert_eq!(highlights["25%"], "15.0 min");
        assert_eq!(highlights["5%"], "1.5 min");
    }
}
