use super::types::{PlainRow, SpecialRow};
use crate::model::{RangeBounds, RangeDefinition};
use chrono::NaiveDateTime;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug)]
pub struct RangeContext<'a> {
    pub material: &'a str,
    pub family: &'a str,
    pub area: &'a str,
    pub description: &'a str,
    pub launch_date: Option<NaiveDateTime>,
}

pub trait RangeLookup {
    fn lookup_range(&self, context: &RangeContext<'_>) -> Option<RangeBounds>;
}

/// Range definitions bucketed by material, newest validity window first.
#[derive(Clone, Debug, Default)]
pub struct RangeIndex {
    by_material: HashMap<String, Vec<RangeDefinition>>,
}

impl RangeIndex {
    pub fn new(definitions: Vec<RangeDefinition>) -> Self {
        let mut by_material: HashMap<String, Vec<RangeDefinition>> = HashMap::new();
        for def in definitions {
            by_material.entry(def.material.clone()).or_default().push(def);
        }
        for bucket in by_material.values_mut() {
            // None sorts first ascending, so descending puts windowless definitions last.
            bucket.sort_by(|a, b| b.valid_from.cmp(&a.valid_from));
        }
        Self { by_material }
    }
}

fn covers(def: &RangeDefinition, launch_date: Option<NaiveDateTime>) -> bool {
    if def.valid_from.is_none() && def.valid_to.is_none() {
        return true;
    }
    let Some(date) = launch_date else {
        return false;
    };
    def.valid_from.map_or(true, |from| from <= date) && def.valid_to.map_or(true, |to| date < to)
}

impl RangeLookup for RangeIndex {
    fn lookup_range(&self, context: &RangeContext<'_>) -> Option<RangeBounds> {
        self.by_material
            .get(context.material)?
            .iter()
            .find(|def| {
                def.family == context.family
                    && def.area == context.area
                    && def.description == context.description
                    && covers(def, context.launch_date)
            })
            .map(|def| def.bounds)
    }
}

pub trait Annotatable {
    fn range_context(&self) -> RangeContext<'_>;
    fn set_ranges(&mut self, bounds: RangeBounds);

    /// Bounds to use when the lookup finds nothing.
    fn fallback_ranges(&self) -> Option<RangeBounds> {
        None
    }
}

impl Annotatable for PlainRow {
    fn range_context(&self) -> RangeContext<'_> {
        RangeContext {
            material: &self.material,
            family: &self.family,
            area: &self.area,
            description: &self.description,
            launch_date: self.launch_date,
        }
    }

    fn set_ranges(&mut self, bounds: RangeBounds) {
        self.ranges = bounds;
    }

    fn fallback_ranges(&self) -> Option<RangeBounds> {
        Some(self.catalog_range).filter(|bounds| !bounds.is_empty())
    }
}

impl Annotatable for SpecialRow {
    fn range_context(&self) -> RangeContext<'_> {
        RangeContext {
            material: &self.material,
            family: &self.family,
            area: &self.area,
            description: &self.description,
            launch_date: self.launch_date,
        }
    }

    fn set_ranges(&mut self, bounds: RangeBounds) {
        self.ranges = bounds;
    }
}

/// Attaches range bounds to each row. Rows without a matching range keep
/// unset bounds. Returns how many rows received bounds.
pub fn annotate<R: Annotatable>(rows: &mut [R], lookup: &dyn RangeLookup) -> usize {
    let mut annotated = 0;
    for row in rows.iter_mut() {
        let found = lookup
            .lookup_range(&row.range_context())
            .or_else(|| row.fallback_ranges());
        if let Some(bounds) = found {
            row.set_ranges(bounds);
            annotated += 1;
        }
    }
    tracing::debug!(rows = rows.len(), annotated, "attached ranges");
    annotated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReadingValue;
    use chrono::NaiveDate;

    fn date(year: i32, month: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn bounds(min: f64, max: f64) -> RangeBounds {
        RangeBounds {
            value_min: Some(min),
            value_max: Some(max),
            tolerance_min: Some(min - 1.0),
            tolerance_max: Some(max + 1.0),
        }
    }

    fn definition(
        valid_from: Option<NaiveDateTime>,
        valid_to: Option<NaiveDateTime>,
        bounds: RangeBounds,
    ) -> RangeDefinition {
        RangeDefinition {
            material: "MAT".into(),
            family: "f".into(),
            area: "a".into(),
            description: "Weight".into(),
            valid_from,
            valid_to,
            bounds,
        }
    }

    fn context(launch_date: Option<NaiveDateTime>) -> RangeContext<'static> {
        RangeContext {
            material: "MAT",
            family: "f",
            area: "a",
            description: "Weight",
            launch_date,
        }
    }

    fn plain_row(catalog_range: RangeBounds) -> PlainRow {
        PlainRow {
            order_id: "P1".into(),
            master_emi: "M".into(),
            material: "MAT".into(),
            launch_date: None,
            parameter: "W".into(),
            family: "f".into(),
            area: "a".into(),
            description: "Weight".into(),
            data_format: "g".into(),
            value: ReadingValue::Number(1.0),
            input_index: 1,
            input_date: None,
            catalog_range,
            ranges: RangeBounds::default(),
        }
    }

    #[test]
    fn windowless_definition_matches_any_order() {
        let index = RangeIndex::new(vec![definition(None, None, bounds(1.0, 2.0))]);
        assert_eq!(index.lookup_range(&context(None)), Some(bounds(1.0, 2.0)));
        assert_eq!(
            index.lookup_range(&context(Some(date(2020, 1)))),
            Some(bounds(1.0, 2.0))
        );
    }

    #[test]
    fn launch_date_selects_the_covering_window() {
        let index = RangeIndex::new(vec![
            definition(None, None, bounds(0.0, 100.0)),
            definition(Some(date(2020, 1)), Some(date(2022, 1)), bounds(1.0, 2.0)),
            definition(Some(date(2022, 1)), None, bounds(3.0, 4.0)),
        ]);
        assert_eq!(
            index.lookup_range(&context(Some(date(2021, 6)))),
            Some(bounds(1.0, 2.0))
        );
        assert_eq!(
            index.lookup_range(&context(Some(date(2022, 1)))),
            Some(bounds(3.0, 4.0))
        );
        assert_eq!(
            index.lookup_range(&context(Some(date(2019, 1)))),
            Some(bounds(0.0, 100.0))
        );
        assert_eq!(index.lookup_range(&context(None)), Some(bounds(0.0, 100.0)));
    }

    #[test]
    fn unknown_material_or_identity_has_no_range() {
        let index = RangeIndex::new(vec![definition(None, None, bounds(1.0, 2.0))]);
        let mut ctx = context(None);
        ctx.material = "OTHER";
        assert_eq!(index.lookup_range(&ctx), None);
        let mut ctx = context(None);
        ctx.description = "Height";
        assert_eq!(index.lookup_range(&ctx), None);
    }

    #[test]
    fn annotate_leaves_unmatched_rows_unset() {
        let index = RangeIndex::default();
        let mut rows = vec![plain_row(RangeBounds::default())];
        assert_eq!(annotate(&mut rows, &index), 0);
        assert!(rows[0].ranges.is_empty());
    }

    #[test]
    fn plain_rows_fall_back_to_catalog_limits() {
        let index = RangeIndex::default();
        let catalog_range = RangeBounds {
            value_min: Some(5.0),
            value_max: Some(6.0),
            ..RangeBounds::default()
        };
        let mut rows = vec![plain_row(catalog_range)];
        assert_eq!(annotate(&mut rows, &index), 1);
        assert_eq!(rows[0].ranges, catalog_range);
    }

    #[test]
    fn range_definition_wins_over_catalog_limits() {
        let index = RangeIndex::new(vec![definition(None, None, bounds(1.0, 2.0))]);
        let mut rows = vec![plain_row(RangeBounds {
            value_min: Some(5.0),
            value_max: Some(6.0),
            ..RangeBounds::default()
        })];
        annotate(&mut rows, &index);
        assert_eq!(rows[0].ranges, bounds(1.0, 2.0));
    }
}
