//! KOI table reader backing the listing endpoint.
//!
//! The cumulative KOI export carries well over a hundred columns and `#`
//! comment lines at the top. Only the identifying columns and the model
//! features are kept; missing or unparsable cells become `None`.

use crate::error::DatasetError;
use crate::types::koi::KoiRow;
use csv::StringRecord;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// CSV-backed KOI table
#[derive(Debug, Clone)]
pub struct KoiDataset {
    path: PathBuf,
    max_rows: usize,
}

impl KoiDataset {
    pub fn new(path: impl Into<PathBuf>, max_rows: usize) -> Self {
        Self {
            path: path.into(),
            max_rows,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read up to `max_rows` rows. Rows without a usable `kepid` are skipped.
    pub fn list(&self) -> Result<Vec<KoiRow>, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|source| DatasetError::Open {
                path: self.path.clone(),
                source,
            })?;

        let headers = reader.headers()?.clone();
        let columns = Columns::new(&headers)?;

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for (line, record) in reader.records().enumerate() {
            if rows.len() >= self.max_rows {
                break;
            }
            let record = record?;
            match columns.parse(&record) {
                Some(row) => rows.push(row),
                None => {
                    skipped += 1;
                    debug!(line = line + 1, "Skipping KOI row without kepid");
                }
            }
        }

        info!(
            path = %self.path.display(),
            rows = rows.len(),
            skipped = skipped,
            "KOI rows loaded"
        );

        Ok(rows)
    }
}

/// Header positions of the kept columns
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &StringRecord) -> Result<Self, DatasetError> {
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i))
            .collect();
        if !index.contains_key("kepid") {
            return Err(DatasetError::MissingColumn("kepid"));
        }
        Ok(Self { index })
    }

    fn cell<'r>(&self, record: &'r StringRecord, name: &str) -> Option<&'r str> {
        self.index
            .get(name)
            .and_then(|&i| record.get(i))
            .filter(|v| !v.is_empty())
    }

    fn text(&self, record: &StringRecord, name: &str) -> Option<String> {
        self.cell(record, name).map(str::to_string)
    }

    fn float(&self, record: &StringRecord, name: &str) -> Option<f64> {
        self.cell(record, name)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }

    fn flag(&self, record: &StringRecord, name: &str) -> Option<i64> {
        let cell = self.cell(record, name)?;
        cell.parse::<i64>().ok().or_else(|| {
            cell.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && v.fract() == 0.0)
                .map(|v| v as i64)
        })
    }

    fn parse(&self, record: &StringRecord) -> Option<KoiRow> {
        let kepid = self.flag(record, "kepid")?;
        Some(KoiRow {
            kepid,
            kepoi_name: self.text(record, "kepoi_name"),
            koi_disposition: self.text(record, "koi_disposition"),
            koi_period: self.float(record, "koi_period"),
            koi_duration: self.float(record, "koi_duration"),
            koi_depth: self.float(record, "koi_depth"),
            koi_prad: self.float(record, "koi_prad"),
            koi_model_snr: self.float(record, "koi_model_snr"),
            koi_snr: self.float(record, "koi_snr"),
            koi_score: self.float(record, "koi_score"),
            koi_ror: self.float(record, "koi_ror"),
            koi_impact: self.float(record, "koi_impact"),
            koi_max_mult_ev: self.float(record, "koi_max_mult_ev"),
            koi_fpflag_ss: self.flag(record, "koi_fpflag_ss"),
            koi_fpflag_co: self.flag(record, "koi_fpflag_co"),
            koi_fpflag_nt: self.flag(record, "koi_fpflag_nt"),
            koi_fpflag_ec: self.flag(record, "koi_fpflag_ec"),
        })
    }
}
