use std::fmt;
use std::io::Write;
use std::str::FromStr;

use nalgebra::DVector;
use num_complex::Complex64;

use super::element::{PortRef, ScatterModel};
use super::error::SimError;
use super::freq::FrequencyGrid;
use super::sparams::ScatterMatrix;

/// Amplitude scaling for magnitude views of S-parameter data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// `|S|`
    Abs,
    /// `|S|^2`
    AbsSq,
    /// `10 log10 |S|^2`, in dB
    Log,
}

impl Scale {
    pub fn apply(&self, response: &DVector<Complex64>) -> DVector<f64> {
        match self {
            Scale::Abs => response.map(|z| z.norm()),
            Scale::AbsSq => response.map(|z| z.norm_sqr()),
            Scale::Log => response.map(|z| 10.0 * z.norm_sqr().log10()),
        }
    }
}

impl FromStr for Scale {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abs" => Ok(Scale::Abs),
            "abs_sq" => Ok(Scale::AbsSq),
            "log" => Ok(Scale::Log),
            other => Err(SimError::DataError(format!("unknown scale '{}'", other))),
        }
    }
}

/// Recorded near-singular contraction: which fusion step, which bins.
#[derive(Debug, Clone)]
pub struct NearSingular {
    /// Human-readable description of the contraction that was affected.
    pub context: String,
    /// Frequency-bin indices whose determinant sat below the floor.
    pub bins: Vec<usize>,
}

impl fmt::Display for NearSingular {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "near-singular contraction {} at {} bin(s)",
            self.context,
            self.bins.len()
        )
    }
}

/// Provenance of one externally visible port of a reduced network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalPort {
    /// Id of the original component inside the reduced network.
    pub element: String,
    /// Port index on that component.
    pub port: usize,
    /// Name the component assigned to that port, if any.
    pub name: Option<String>,
}

impl ExternalPort {
    /// Stable label: the assigned name, else `element:port`.
    pub fn label(&self) -> String {
        match &self.name {
            Some(n) => n.clone(),
            None => format!("{}:{}", self.element, self.port),
        }
    }
}

/// The residual S-matrix of a fully reduced network, with the port map back
/// to externally visible names and the numerical diagnostics gathered along
/// the way. Implements [`ScatterModel`], so a result embeds directly into a
/// parent network as a component.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    id: String,
    freq: FrequencyGrid,
    smat: ScatterMatrix,
    ports: Vec<ExternalPort>,
    labels: Vec<String>,
    diagnostics: Vec<NearSingular>,
}

impl SimulationResult {
    pub(crate) fn new(
        id: String,
        freq: FrequencyGrid,
        smat: ScatterMatrix,
        ports: Vec<ExternalPort>,
        diagnostics: Vec<NearSingular>,
    ) -> Self {
        debug_assert_eq!(smat.nports(), ports.len());
        let labels = ports.iter().map(ExternalPort::label).collect();
        Self {
            id,
            freq,
            smat,
            ports,
            labels,
            diagnostics,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn freq(&self) -> &FrequencyGrid {
        &self.freq
    }

    pub fn s(&self) -> &ScatterMatrix {
        &self.smat
    }

    pub fn nports(&self) -> usize {
        self.smat.nports()
    }

    /// Frequency response from external port `j` into external port `i`.
    pub fn response(&self, i: usize, j: usize) -> DVector<Complex64> {
        self.smat.response(i, j).into_owned()
    }

    pub fn magnitude(&self, i: usize, j: usize, scale: Scale) -> DVector<f64> {
        scale.apply(&self.response(i, j))
    }

    pub fn external_ports(&self) -> &[ExternalPort] {
        &self.ports
    }

    pub fn diagnostics(&self) -> &[NearSingular] {
        &self.diagnostics
    }

    /// Resolve an external port by index, assigned name, or provenance label
    /// (`element:port`).
    pub fn port_index(&self, port: &PortRef) -> Result<usize, SimError> {
        let found = match port {
            PortRef::Index(i) if *i < self.ports.len() => Some(*i),
            PortRef::Index(_) => None,
            PortRef::Name(n) => self.labels.iter().position(|l| l == n),
        };
        found.ok_or_else(|| SimError::UnknownPort {
            component: self.id.clone(),
            port: port.to_string(),
        })
    }

    /// Locate the external port carrying `(element, port)` provenance.
    pub fn find_port(&self, element: &str, port: usize) -> Option<usize> {
        self.ports
            .iter()
            .position(|p| p.element == element && p.port == port)
    }

    /// Export the residual in the per-port-pair text format.
    pub fn write_sparameters<W: Write>(&self, w: W) -> std::io::Result<()> {
        crate::io::sparams_file::write_sparameters(w, &self.freq, &self.smat)
    }
}

impl ScatterModel for SimulationResult {
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
        self.labels.get(index).map(|s| s.as_str())
    }
}
