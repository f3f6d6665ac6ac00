use std::collections::BTreeMap;

use castor_core::{ComparisonGroup, ComparisonPoint, Label, PeriodKey, TimeSeriesPoint, ZoneRole};

use super::Mean;

/// Comparison group of a zone's series.
pub fn group_of(label: Label, role: ZoneRole) -> ComparisonGroup {
    match (role, label) {
        (ZoneRole::Upstream, _) => ComparisonGroup::Upstream,
        (ZoneRole::Downstream, _) => ComparisonGroup::Downstream,
        (ZoneRole::Whole, Label::Dam) => ComparisonGroup::Dam,
        (ZoneRole::Whole, Label::NonDam) => ComparisonGroup::NonDam,
    }
}

/// Mean of zone means per (group, period).
///
/// Whole dam zones form the `dam` group and whole control zones `non-dam`;
/// sub-zones, when present, form `upstream` and `downstream`. Every zone
/// weighs the same regardless of how many records it averaged.
pub fn compare(points: &[TimeSeriesPoint]) -> Vec<ComparisonPoint> {
    #[derive(Default)]
    struct Acc {
        ndvi: Mean,
        ndwi: Mean,
        lst: Mean,
        et: Mean,
        zones: usize,
    }

    let mut groups: BTreeMap<(ComparisonGroup, PeriodKey), Acc> = BTreeMap::new();
    for p in points {
        let acc = groups
            .entry((group_of(p.label, p.role), p.period))
            .or_default();
        acc.ndvi.push(Some(p.ndvi));
        acc.ndwi.push(Some(p.ndwi));
        acc.lst.push(p.lst);
        acc.et.push(p.et);
        acc.zones += 1;
    }

    groups
        .into_iter()
        .filter_map(|((group, period), acc)| {
            Some(ComparisonPoint {
                group,
                period,
                ndvi: acc.ndvi.value()?,
                ndwi: acc.ndwi.value()?,
                lst: acc.lst.value(),
                et: acc.et.value(),
                zones: acc.zones,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(zone: &str, label: Label, role: ZoneRole, month: u32, ndvi: f64) -> TimeSeriesPoint {
        TimeSeriesPoint {
            zone_id: zone.into(),
            label,
            role,
            period: PeriodKey::month(2020, month),
            ndvi,
            ndwi: 0.0,
            lst: None,
            et: Some(2.0),
            records: 3,
        }
    }

    #[test]
    fn dam_versus_control() {
        let series = vec![
            point("P1", Label::Dam, ZoneRole::Whole, 7, 0.6),
            point("P2", Label::Dam, ZoneRole::Whole, 7, 0.4),
            point("N1", Label::NonDam, ZoneRole::Whole, 7, 0.2),
        ];
        let cmp = compare(&series);

        assert_eq!(cmp.len(), 2);
        assert_eq!(cmp[0].group, ComparisonGroup::Dam);
        assert_relative_eq!(cmp[0].ndvi, 0.5, epsilon = 1e-12);
        assert_eq!(cmp[0].zones, 2);
        assert_eq!(cmp[1].group, ComparisonGroup::NonDam);
        assert_eq!(cmp[1].et, Some(2.0));
    }

    #[test]
    fn upstream_and_downstream_groups() {
        let series = vec![
            point("P1", Label::Dam, ZoneRole::Whole, 7, 0.6),
            point("P1-up", Label::Dam, ZoneRole::Upstream, 7, 0.7),
            point("P1-down", Label::Dam, ZoneRole::Downstream, 7, 0.3),
        ];
        let groups: Vec<_> = compare(&series).iter().map(|c| c.group).collect();
        assert_eq!(
            groups,
            vec![ComparisonGroup::Dam, ComparisonGroup::Upstream, ComparisonGroup::Downstream]
        );
    }
}
