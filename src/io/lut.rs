//! Look-up tables mapping physical component parameters to raw data files.
//!
//! A library's characterisation sweep ships as a CSV sidecar whose last
//! column names the data file and whose other columns are numeric parameter
//! values:
//!
//! ```text
//! wg_length,wg_width,filename
//! 5e-05,5e-07,wg_50um_500nm.sparam
//! ```
//!
//! Resolution is exact on the stored values; the core only ever needs the
//! `(freqs, S)` arrays the resolved file yields.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use log::debug;
use ordered_float::OrderedFloat;

use crate::basic::element::Element;
use crate::basic::error::SimError;
use crate::basic::freq::{resample, FrequencyGrid};

use super::sparams_file;

/// Parameter-keyed index of raw S-parameter files.
#[derive(Debug, Clone)]
pub struct LookupTable {
    params: Vec<String>,
    rows: BTreeMap<Vec<OrderedFloat<f64>>, String>,
}

impl LookupTable {
    pub fn from_reader<R: Read>(r: R) -> Result<Self, SimError> {
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(r);
        let headers = rdr
            .headers()
            .map_err(|e| SimError::DataError(e.to_string()))?
            .clone();
        if headers.len() < 2 || &headers[headers.len() - 1] != "filename" {
            return Err(SimError::DataError(
                "look-up table needs parameter columns and a trailing 'filename'".into(),
            ));
        }
        let params: Vec<String> = headers
            .iter()
            .take(headers.len() - 1)
            .map(str::to_owned)
            .collect();

        let mut rows = BTreeMap::new();
        for record in rdr.records() {
            let record = record.map_err(|e| SimError::DataError(e.to_string()))?;
            if record.len() != headers.len() {
                return Err(SimError::DataError(format!(
                    "row has {} fields, expected {}",
                    record.len(),
                    headers.len()
                )));
            }
            let key: Vec<OrderedFloat<f64>> = record
                .iter()
                .take(params.len())
                .map(|v| {
                    v.parse::<f64>()
                        .map(OrderedFloat)
                        .map_err(|e| SimError::DataError(format!("bad value '{}': {}", v, e)))
                })
                .collect::<Result<_, _>>()?;
            rows.insert(key, record[params.len()].to_owned());
        }
        debug!("look-up table: {} parameter(s), {} row(s)", params.len(), rows.len());
        Ok(Self { params, rows })
    }

    pub fn from_file(path: &Path) -> Result<Self, SimError> {
        let file = File::open(path)
            .map_err(|e| SimError::DataError(format!("cannot open '{}': {}", path.display(), e)))?;
        Self::from_reader(file)
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The data file characterised at exactly the queried parameter values.
    pub fn resolve(&self, query: &[(&str, f64)]) -> Result<&str, SimError> {
        let mut key = Vec::with_capacity(self.params.len());
        for param in &self.params {
            let value = query
                .iter()
                .find(|(name, _)| name == param)
                .map(|(_, v)| *v)
                .ok_or_else(|| {
                    SimError::DataError(format!("query is missing parameter '{}'", param))
                })?;
            key.push(OrderedFloat(value));
        }
        self.rows
            .get(&key)
            .map(String::as_str)
            .ok_or_else(|| SimError::DataError("no matching look-up table entry".into()))
    }
}

/// Build an [`Element`] from a library data folder: resolve the look-up
/// table, read the raw file, and resample onto the target grid.
pub fn load_component(
    data_dir: &Path,
    lut_file: &str,
    query: &[(&str, f64)],
    id: &str,
    target: &FrequencyGrid,
) -> Result<Element, SimError> {
    let lut = LookupTable::from_file(&data_dir.join(lut_file))?;
    let data_file = lut.resolve(query)?.to_owned();
    let file = File::open(data_dir.join(&data_file))
        .map_err(|e| SimError::DataError(format!("cannot open '{}': {}", data_file, e)))?;
    let (freq, smat) = sparams_file::read_sparameters(file)?;
    let smat = if &freq == target {
        smat
    } else {
        resample(target, &freq, &smat)?
    };
    Element::new(id, target.clone(), smat)
}
