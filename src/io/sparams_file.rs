//! The per-port-pair text format for raw and simulated S-parameter data.
//!
//! Each `(i, j)` pair contributes a header, a shape line, and `n_f` rows of
//! `frequency |S| angle` (magnitudes linear, phases in radians):
//!
//! ```text
//! ('port 1','TE',1,'port 2',1,'transmission')
//! (2000,3)
//! 193414489843086 0.982213 -2.214312
//! ...
//! ```
//!
//! Component libraries ship these files zipped; `load_sparameters_zip` reads
//! a member straight out of the archive.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use log::debug;
use nalgebra::DVector;
use num_complex::Complex64;

use crate::basic::error::SimError;
use crate::basic::freq::FrequencyGrid;
use crate::basic::sparams::ScatterMatrix;

/// Write scattering data in the per-port-pair block format, row-major over
/// `(i, j)`.
pub fn write_sparameters<W: Write>(
    mut w: W,
    freq: &FrequencyGrid,
    smat: &ScatterMatrix,
) -> std::io::Result<()> {
    let n = smat.nports();
    let nf = freq.len();
    for i in 0..n {
        for j in 0..n {
            writeln!(w, "('port {}','TE',1,'port {}',1,'transmission')", i + 1, j + 1)?;
            writeln!(w, "({},3)", nf)?;
            for t in 0..nf {
                let z = smat.at(t, i, j);
                writeln!(w, "{:.0} {:.9} {:.9}", freq.values()[t], z.norm(), z.arg())?;
            }
        }
    }
    Ok(())
}

/// Parse per-port-pair block data back into `(grid, scattering matrix)`.
///
/// The port count is inferred from the block count; every block must carry
/// the same number of rows and the first block's frequency column becomes
/// the grid.
pub fn read_sparameters<R: Read>(r: R) -> Result<(FrequencyGrid, ScatterMatrix), SimError> {
    let reader = BufReader::new(r);
    let mut blocks: Vec<Vec<(f64, f64, f64)>> = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| SimError::DataError(e.to_string()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("('") {
            blocks.push(Vec::new());
        } else if line.starts_with('(') {
            // Shape line; row counts are validated against the data below.
        } else {
            let mut cols = line.split_whitespace();
            let mut next = || -> Result<f64, SimError> {
                cols.next()
                    .ok_or_else(|| SimError::DataError(format!("short data row '{}'", line)))?
                    .parse::<f64>()
                    .map_err(|e| SimError::DataError(format!("bad number in '{}': {}", line, e)))
            };
            let row = (next()?, next()?, next()?);
            blocks
                .last_mut()
                .ok_or_else(|| SimError::DataError("data row before any block header".into()))?
                .push(row);
        }
    }

    let nports = (blocks.len() as f64).sqrt().round() as usize;
    if nports * nports != blocks.len() || blocks.is_empty() {
        return Err(SimError::DataError(format!(
            "{} blocks do not form a square port matrix",
            blocks.len()
        )));
    }
    let nf = blocks[0].len();
    if blocks.iter().any(|b| b.len() != nf) {
        return Err(SimError::DataError("blocks differ in row count".into()));
    }
    debug!("read {} port(s) over {} bins", nports, nf);

    let freq = FrequencyGrid::new(DVector::from_fn(nf, |t, _| blocks[0][t].0))?;
    let smat = ScatterMatrix::from_fn(nf, nports, |t, i, j| {
        let (_, mag, phase) = blocks[i * nports + j][t];
        Complex64::from_polar(mag, phase)
    });
    Ok((freq, smat))
}

/// Read one S-parameter file out of a zipped library archive.
pub fn load_sparameters_zip(
    archive: &Path,
    member: &str,
) -> Result<(FrequencyGrid, ScatterMatrix), SimError> {
    let file = File::open(archive).map_err(|e| {
        SimError::DataError(format!("cannot open '{}': {}", archive.display(), e))
    })?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| SimError::DataError(format!("bad archive '{}': {}", archive.display(), e)))?;
    let entry = zip
        .by_name(member)
        .map_err(|e| SimError::DataError(format!("no member '{}': {}", member, e)))?;
    read_sparameters(entry)
}
