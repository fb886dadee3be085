use std::collections::HashMap;
use std::fmt;

use super::error::SimError;
use super::freq::{resample, FrequencyGrid};
use super::sparams::ScatterMatrix;

/// A port referenced either by dense index or by an assigned name.
///
/// Every network-level API accepts both forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PortRef {
    Index(usize),
    Name(String),
}

impl From<usize> for PortRef {
    fn from(index: usize) -> Self {
        PortRef::Index(index)
    }
}

impl From<&str> for PortRef {
    fn from(name: &str) -> Self {
        PortRef::Name(name.to_owned())
    }
}

impl From<String> for PortRef {
    fn from(name: String) -> Self {
        PortRef::Name(name)
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortRef::Index(i) => write!(f, "{}", i),
            PortRef::Name(n) => write!(f, "{}", n),
        }
    }
}

/// Bijective port-name table: one map per direction, kept in lockstep.
#[derive(Debug, Clone, Default)]
pub struct PortTable {
    names: HashMap<String, usize>,
    labels: Vec<Option<String>>,
}

impl PortTable {
    pub fn new(nports: usize) -> Self {
        Self {
            names: HashMap::new(),
            labels: vec![None; nports],
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Assign `name` to `index`. A name bound to a different index conflicts;
    /// renaming an index releases its previous name.
    pub fn set(&mut self, index: usize, name: &str) -> Result<(), SimError> {
        if index >= self.labels.len() {
            return Err(SimError::InvalidPort {
                k: index,
                l: index,
                nports: self.labels.len(),
            });
        }
        if let Some(&bound) = self.names.get(name) {
            if bound != index {
                return Err(SimError::PortNameConflict {
                    name: name.to_owned(),
                    index: bound,
                });
            }
            return Ok(());
        }
        if let Some(old) = self.labels[index].take() {
            self.names.remove(&old);
        }
        self.names.insert(name.to_owned(), index);
        self.labels[index] = Some(name.to_owned());
        Ok(())
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.labels.get(index).and_then(|n| n.as_deref())
    }

    /// Resolve a port reference to a dense index, if it exists.
    pub fn resolve(&self, port: &PortRef) -> Option<usize> {
        match port {
            PortRef::Index(i) if *i < self.labels.len() => Some(*i),
            PortRef::Index(_) => None,
            PortRef::Name(n) => self.names.get(n).copied(),
        }
    }
}

/// The narrow capability set every circuit component exposes.
///
/// The reduction engine sees nothing but this: an identifying label, the
/// port count, scattering data on a requested grid, and port names. Whether
/// the implementor is a raw component or an already-reduced sub-network is
/// invisible downstream.
pub trait ScatterModel {
    /// Preferred identifier; the network may suffix it for uniqueness.
    fn label(&self) -> &str;

    fn nports(&self) -> usize;

    fn freq(&self) -> &FrequencyGrid;

    fn smat(&self) -> &ScatterMatrix;

    fn port_name(&self, index: usize) -> Option<&str>;

    /// Scattering data on `grid`, interpolating when the grids differ.
    ///
    /// The stored grid must cover the requested span.
    fn s_on(&self, grid: &FrequencyGrid) -> Result<ScatterMatrix, SimError> {
        if grid == self.freq() {
            return Ok(self.smat().clone());
        }
        if !self.freq().covers(grid) {
            return Err(SimError::FrequencyMismatch {
                child_lo: self.freq().min(),
                child_hi: self.freq().max(),
                parent_lo: grid.min(),
                parent_hi: grid.max(),
            });
        }
        resample(grid, self.freq(), self.smat())
    }
}

/// A component instance: scattering data plus port bookkeeping.
#[derive(Debug, Clone)]
pub struct Element {
    id: String,
    freq: FrequencyGrid,
    smat: ScatterMatrix,
    ports: PortTable,
}

impl Element {
    pub fn new(
        id: impl Into<String>,
        freq: FrequencyGrid,
        smat: ScatterMatrix,
    ) -> Result<Self, SimError> {
        if smat.nf() != freq.len() {
            return Err(SimError::DataError(format!(
                "scattering data has {} bins but the grid has {} points",
                smat.nf(),
                freq.len()
            )));
        }
        let nports = smat.nports();
        Ok(Self {
            id: id.into(),
            freq,
            smat,
            ports: PortTable::new(nports),
        })
    }

    pub fn with_port_names(
        id: impl Into<String>,
        freq: FrequencyGrid,
        smat: ScatterMatrix,
        names: &[&str],
    ) -> Result<Self, SimError> {
        let mut el = Self::new(id, freq, smat)?;
        for (index, name) in names.iter().enumerate() {
            el.set_port_name(index, name)?;
        }
        Ok(el)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    pub fn s(&self) -> &ScatterMatrix {
        &self.smat
    }

    pub fn nports(&self) -> usize {
        self.smat.nports()
    }

    pub fn ports(&self) -> &PortTable {
        &self.ports
    }

    pub fn set_port_name(&mut self, index: usize, name: &str) -> Result<(), SimError> {
        self.ports.set(index, name)
    }

    pub fn port_index(&self, port: &PortRef) -> Result<usize, SimError> {
        self.ports
            .resolve(port)
            .ok_or_else(|| SimError::UnknownPort {
                component: self.id.clone(),
                port: port.to_string(),
            })
    }
}

impl ScatterModel for Element {
    fn label(&self) -> &str {
        &self.id
    }

    fn nports(&self) -> usize {
        self.smat.nports()
    }

    fn freq(&self) -> &FrequencyGrid {
        &self.freq
    }

    fn smat(&self) -> &ScatterMatrix {
        &self.smat
    }

    fn port_name(&self, index: usize) -> Option<&str> {
        self.ports.name(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    fn two_port() -> Element {
        let grid = FrequencyGrid::single(1.93e14);
        let s = ScatterMatrix::from_fn(1, 2, |_, i, j| {
            if i == j {
                Complex64::default()
            } else {
                Complex64::new(1.0, 0.0)
            }
        });
        Element::new("wg", grid, s).unwrap()
    }

    #[test]
    fn port_names_stay_bijective() {
        let mut el = two_port();
        el.set_port_name(0, "in").unwrap();
        el.set_port_name(1, "out").unwrap();
        assert_eq!(el.port_index(&"out".into()).unwrap(), 1);
        assert_eq!(el.port_index(&1usize.into()).unwrap(), 1);

        // Same name on another port conflicts.
        assert!(matches!(
            el.set_port_name(1, "in"),
            Err(SimError::PortNameConflict { .. })
        ));
        // Renaming releases the old label.
        el.set_port_name(0, "west").unwrap();
        assert!(el.port_index(&"in".into()).is_err());
        assert_eq!(el.port_index(&"west".into()).unwrap(), 0);
    }

    #[test]
    fn shape_mismatch_rejected() {
        let grid = FrequencyGrid::linspace(1.8e14, 2.0e14, 5).unwrap();
        let s = ScatterMatrix::zeros(4, 2);
        assert!(matches!(
            Element::new("bad", grid, s),
            Err(SimError::DataError(_))
        ));
    }

    #[test]
    fn unknown_port_names_error() {
        let el = two_port();
        match el.port_index(&"north".into()) {
            Err(SimError::UnknownPort { component, port }) => {
                assert_eq!(component, "wg");
                assert_eq!(port, "north");
            }
            other => panic!("expected UnknownPort, got {:?}", other),
        }
        assert!(el.port_index(&7usize.into()).is_err());
    }
}
