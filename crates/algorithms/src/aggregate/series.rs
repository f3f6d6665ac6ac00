use std::collections::BTreeMap;

use castor_core::{AggregationPeriod, Label, MetricRecord, PeriodKey, TimeSeriesPoint, ZoneRole};

use super::Mean;

#[derive(Default)]
struct Bucket {
    label: Option<Label>,
    ndvi: Mean,
    ndwi: Mean,
    lst: Mean,
    et: Mean,
    records: usize,
}

/// Mean metrics per (zone, role, period).
///
/// Only periods that hold at least one record appear in the output, ordered
/// by zone id, role and period. LST and ET means skip absent values and are
/// absent themselves when every record lacks them.
pub fn aggregate(records: &[MetricRecord], period: AggregationPeriod) -> Vec<TimeSeriesPoint> {
    let mut buckets: BTreeMap<(String, ZoneRole, PeriodKey), Bucket> = BTreeMap::new();

    for r in records {
        let bucket = buckets
            .entry((r.zone_id.clone(), r.role, period.key(r.date)))
            .or_default();
        bucket.label.get_or_insert(r.label);
        bucket.ndvi.push(Some(r.ndvi));
        bucket.ndwi.push(Some(r.ndwi));
        bucket.lst.push(r.lst);
        bucket.et.push(r.et);
        bucket.records += 1;
    }

    buckets
        .into_iter()
        .filter_map(|((zone_id, role, period), b)| {
            Some(TimeSeriesPoint {
                zone_id,
                label: b.label?,
                role,
                period,
                ndvi: b.ndvi.value()?,
                ndwi: b.ndwi.value()?,
                lst: b.lst.value(),
                et: b.et.value(),
                records: b.records,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn record(zone: &str, ymd: (i32, u32, u32), ndvi: f64, lst: Option<f64>) -> MetricRecord {
        MetricRecord {
            zone_id: zone.into(),
            point_id: zone.into(),
            label: Label::Dam,
            role: ZoneRole::Whole,
            date: NaiveDate::from_ymd_opt(ymd.0, ymd.1, ymd.2).unwrap(),
            ndvi,
            ndwi: -0.1,
            lst,
            et: None,
            clamped_pixels: 0,
        }
    }

    #[test]
    fn monthly_means() {
        let records = vec![
            record("P1", (2020, 7, 2), 0.4, Some(20.0)),
            record("P1", (2020, 7, 18), 0.6, None),
            record("P1", (2020, 8, 3), 0.5, Some(25.0)),
        ];
        let series = aggregate(&records, AggregationPeriod::Month);

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].period, PeriodKey::month(2020, 7));
        assert_relative_eq!(series[0].ndvi, 0.5, epsilon = 1e-12);
        assert_eq!(series[0].lst, Some(20.0));
        assert_eq!(series[0].et, None);
        assert_eq!(series[0].records, 2);
    }

    #[test]
    fn empty_periods_are_absent() {
        let records = vec![
            record("P1", (2020, 5, 10), 0.4, None),
            record("P1", (2020, 9, 10), 0.6, None),
        ];
        let series = aggregate(&records, AggregationPeriod::Month);
        let periods: Vec<_> = series.iter().map(|p| p.period).collect();
        assert_eq!(periods, vec![PeriodKey::month(2020, 5), PeriodKey::month(2020, 9)]);
        assert!(aggregate(&[], AggregationPeriod::Month).is_empty());
    }

    #[test]
    fn yearly_buckets() {
        let records = vec![
            record("P1", (2020, 5, 10), 0.4, None),
            record("P1", (2020, 9, 10), 0.6, None),
            record("P2", (2021, 1, 10), 0.1, None),
        ];
        let series = aggregate(&records, AggregationPeriod::Year);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].zone_id, "P1");
        assert_eq!(series[0].period, PeriodKey::year(2020));
        assert_eq!(series[1].zone_id, "P2");
    }
}
