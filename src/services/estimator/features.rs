use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::error::{EstimatorError, Result};

/// Uploaded sensor table, kept as raw strings until a mapping is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    records: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, records: Vec<Vec<String>>) -> Self {
        Self { headers, records }
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let mut records = Vec::new();
        for result in rdr.records() {
            let record = result?;
            if record.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            records.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, records })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for record in &self.records {
            writer.write_record(record)?;
        }
        writer
            .into_inner()
            .map_err(|err| EstimatorError::Io(err.into_error()))
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name.trim())
    }
}

/// Logical field -> user CSV header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ColumnMapping {
    #[serde(default)]
    pub voltage: Option<String>,
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub temp: Option<String>,
    #[serde(default)]
    pub soc: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

impl ColumnMapping {
    pub fn identity(voltage: &str, current: &str, temp: &str, soc: &str, time: &str) -> Self {
        Self {
            voltage: Some(voltage.to_string()),
            current: Some(current.to_string()),
            temp: Some(temp.to_string()),
            soc: Some(soc.to_string()),
            time: Some(time.to_string()),
        }
    }

    fn resolve(&self, table: &RawTable) -> Result<ColumnIndices> {
        let lookup = |field: &str, header: &Option<String>| -> Result<usize> {
            let header = header
                .as_deref()
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .ok_or_else(|| EstimatorError::Schema(format!("mapping is missing '{field}'")))?;
            table.column(header).ok_or_else(|| {
                EstimatorError::Schema(format!("column '{header}' (for '{field}') not found"))
            })
        };

        Ok(ColumnIndices {
            voltage: lookup("voltage", &self.voltage)?,
            current: lookup("current", &self.current)?,
            temp: lookup("temp", &self.temp)?,
            soc: lookup("soc", &self.soc)?,
            time: lookup("time", &self.time)?,
        })
    }
}

struct ColumnIndices {
    voltage: usize,
    current: usize,
    temp: usize,
    soc: usize,
    time: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub voltage: f64,
    pub current: f64,
    pub temperature: f64,
    pub soc: f64,
    pub time: f64,
    /// Seconds until the last observed sample of the series.
    pub remaining_time: f64,
}

impl TrainingRow {
    pub fn features(&self) -> [f64; 3] {
        [self.voltage, self.current, self.temperature]
    }
}

#[derive(Debug, Clone)]
pub struct ExtractedSeries {
    pub rows: Vec<TrainingRow>,
    pub max_time: f64,
}

impl ExtractedSeries {
    pub fn max_voltage(&self) -> f64 {
        self.rows
            .iter()
            .map(|row| row.voltage)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Applies `mapping` to `table`, drops rows without a positive voltage and
/// derives remaining time against the latest surviving sample.
pub fn extract(table: &RawTable, mapping: &ColumnMapping) -> Result<ExtractedSeries> {
    let idx = mapping.resolve(table)?;

    let mut rows = Vec::with_capacity(table.len());
    for (row_num, record) in table.records.iter().enumerate() {
        let cell = |col: usize, field: &str| -> Result<Option<f64>> {
            parse_cell(record.get(col).map(String::as_str), row_num, field)
        };
        let (Some(voltage), Some(current), Some(temperature), Some(soc), Some(time)) = (
            cell(idx.voltage, "voltage")?,
            cell(idx.current, "current")?,
            cell(idx.temp, "temp")?,
            cell(idx.soc, "soc")?,
            cell(idx.time, "time")?,
        ) else {
            continue;
        };
        if voltage <= 0.0 {
            continue;
        }
        rows.push(TrainingRow {
            voltage,
            current,
            temperature,
            soc,
            time,
            remaining_time: 0.0,
        });
    }

    let max_time = rows
        .iter()
        .map(|row| row.time)
        .fold(f64::NEG_INFINITY, f64::max);
    for row in &mut rows {
        row.remaining_time = max_time - row.time;
    }

    tracing::debug!(
        raw_rows = table.len(),
        kept_rows = rows.len(),
        max_time,
        "extracted training rows"
    );

    Ok(ExtractedSeries { rows, max_time })
}

// Blank or NaN cells mark an incomplete row; anything else must parse.
fn parse_cell(raw: Option<&str>, row_num: usize, field: &str) -> Result<Option<f64>> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| EstimatorError::invalid_number(format!("{field} (row {row_num})"), raw))?;
    Ok(value.is_finite().then_some(value))
}
