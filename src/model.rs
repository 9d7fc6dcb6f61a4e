use chrono::NaiveDateTime;
use std::collections::HashSet;

pub const WATERMARK_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A reading value as captured by the source system.
///
/// Non-finite numbers never survive construction: `ReadingValue::number`
/// turns them into `Missing`, so the rest of the pipeline only sees
/// optional finite numerics.
#[derive(Clone, Debug, PartialEq)]
pub enum ReadingValue {
    Number(f64),
    Text(String),
    Date(NaiveDateTime),
    Missing,
}

impl ReadingValue {
    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            Self::Number(value)
        } else {
            Self::Missing
        }
    }

    pub fn from_optional(value: Option<f64>) -> Self {
        value.map(Self::number).unwrap_or(Self::Missing)
    }

    /// Picks the populated column of a source row: numeric first, then date,
    /// then non-blank text.
    pub fn from_columns(
        numeric: Option<f64>,
        text: Option<&str>,
        date: Option<NaiveDateTime>,
    ) -> Self {
        if let Some(value) = numeric.filter(|v| v.is_finite()) {
            return Self::Number(value);
        }
        if let Some(date) = date {
            return Self::Date(date);
        }
        match text.map(str::trim).filter(|v| !v.is_empty()) {
            Some(text) => Self::Text(text.to_string()),
            None => Self::Missing,
        }
    }

    /// Numeric view used by aggregation. Text that parses as a finite number
    /// counts; everything else is excluded.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(raw) => raw.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Self::Date(_) | Self::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn to_db_text(&self) -> Option<String> {
        match self {
            Self::Number(v) => Some(v.to_string()),
            Self::Text(v) => Some(v.clone()),
            Self::Date(v) => Some(v.format(WATERMARK_FORMAT).to_string()),
            Self::Missing => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlainParameter {
    pub master_emi: String,
    pub parameter: String,
    pub family: String,
    pub area: String,
    pub description: String,
    pub data_format: String,
    pub range_min: Option<f64>,
    pub range_max: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpecialParameter {
    pub master_emi: String,
    pub parent_emi: String,
    pub sub_emi: String,
    pub parameter: String,
    pub sub_emi_name: Option<String>,
    pub group_id: String,
    pub area: String,
    pub family: String,
    pub description: String,
    /// Raw label from the catalog; validated per group by the aggregator.
    pub agg_function: String,
    pub data_format: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    pub plain: Vec<PlainParameter>,
    pub special: Vec<SpecialParameter>,
}

impl Catalog {
    /// Union of plain and special parameter codes, first occurrence order.
    pub fn parameter_codes(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.plain
            .iter()
            .map(|p| p.parameter.as_str())
            .chain(self.special.iter().map(|p| p.parameter.as_str()))
            .filter(|code| seen.insert(*code))
            .map(str::to_string)
            .collect()
    }

    pub fn special_codes(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.special
            .iter()
            .map(|p| p.parameter.as_str())
            .filter(|code| seen.insert(*code))
            .map(str::to_string)
            .collect()
    }

    /// Splits readings into the plain and special streams. A code listed in
    /// both catalogs feeds both streams.
    pub fn partition_readings(&self, readings: Vec<Reading>) -> (Vec<Reading>, Vec<Reading>) {
        let plain_codes: HashSet<&str> = self.plain.iter().map(|p| p.parameter.as_str()).collect();
        let special_codes: HashSet<&str> =
            self.special.iter().map(|p| p.parameter.as_str()).collect();

        let mut plain = Vec::new();
        let mut special = Vec::new();
        for reading in readings {
            let is_plain = plain_codes.contains(reading.parameter.as_str());
            let is_special = special_codes.contains(reading.parameter.as_str());
            match (is_plain, is_special) {
                (true, true) => {
                    special.push(reading.clone());
                    plain.push(reading);
                }
                (true, false) => plain.push(reading),
                (false, true) => special.push(reading),
                (false, false) => {}
            }
        }
        (plain, special)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProcessOrder {
    pub order_id: String,
    pub master_emi: String,
    pub batch: Option<String>,
    pub material: String,
    pub description: Option<String>,
    pub launch_date: Option<NaiveDateTime>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub strength: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TaskRecord {
    pub order_id: String,
    pub man_index: i64,
    pub task_id: String,
    pub batch_id: String,
    pub element_id: String,
    pub title: Option<String>,
    pub code: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub order_id: String,
    pub parameter: String,
    pub batch_id: String,
    pub operation_number: String,
    pub value: ReadingValue,
    pub input_index: i64,
    pub input_date: Option<NaiveDateTime>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RangeBounds {
    pub value_min: Option<f64>,
    pub value_max: Option<f64>,
    pub tolerance_min: Option<f64>,
    pub tolerance_max: Option<f64>,
}

impl RangeBounds {
    pub fn is_empty(&self) -> bool {
        self.value_min.is_none()
            && self.value_max.is_none()
            && self.tolerance_min.is_none()
            && self.tolerance_max.is_none()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RangeDefinition {
    pub material: String,
    pub family: String,
    pub area: String,
    pub description: String,
    pub valid_from: Option<NaiveDateTime>,
    pub valid_to: Option<NaiveDateTime>,
    pub bounds: RangeBounds,
}

/// Terminal output of the pipeline, handed to the sink.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconciledRecord {
    pub order_id: String,
    pub family: String,
    pub area: String,
    pub description: String,
    pub value: ReadingValue,
    pub data_format: String,
    pub input_date: Option<NaiveDateTime>,
    pub ranges: RangeBounds,
}

impl ReconciledRecord {
    /// Destination merge key.
    pub fn sink_key(&self) -> (String, String, String, String) {
        (
            self.order_id.clone(),
            self.family.clone(),
            self.area.clone(),
            self.description.clone(),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Watermark {
    pub key: String,
    pub timestamp: NaiveDateTime,
}

impl Watermark {
    pub fn new(key: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            key: key.into(),
            timestamp,
        }
    }

    pub fn encode(&self) -> String {
        self.timestamp.format(WATERMARK_FORMAT).to_string()
    }

    pub fn decode(key: &str, raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        NaiveDateTime::parse_from_str(trimmed, WATERMARK_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
            .ok()
            .map(|timestamp| Self::new(key, timestamp))
    }
}
