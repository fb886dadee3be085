use thiserror::Error;

/// Errors surfaced by network assembly and reduction.
///
/// Validation failures are raised at the API boundary and leave the network
/// usable; numerical diagnostics (near-singular contractions) are not errors
/// and travel with the simulation result instead.
#[derive(Debug, Clone, Error)]
pub enum SimError {
    #[error("invalid port pair ({k}, {l}) for a {nports}-port network")]
    InvalidPort { k: usize, l: usize, nports: usize },

    #[error("port {port} of '{component}' is already connected")]
    PortAlreadyConnected { component: String, port: usize },

    #[error("component id '{0}' is already in use")]
    DuplicateId(String),

    #[error("unknown component '{0}'")]
    UnknownComponent(String),

    #[error("unknown port '{port}' on component '{component}'")]
    UnknownPort { component: String, port: String },

    #[error("port name '{name}' is already bound to port {index}")]
    PortNameConflict { name: String, index: usize },

    #[error("component grid [{child_lo:.6e}, {child_hi:.6e}] Hz does not cover the network grid [{parent_lo:.6e}, {parent_hi:.6e}] Hz")]
    FrequencyMismatch {
        child_lo: f64,
        child_hi: f64,
        parent_lo: f64,
        parent_hi: f64,
    },

    #[error("target frequency {value:.6e} Hz outside the source range [{lo:.6e}, {hi:.6e}] Hz")]
    DomainError { value: f64, lo: f64, hi: f64 },

    #[error("invalid data: {0}")]
    DataError(String),

    #[error("network is being simulated; mutation is not allowed")]
    ConcurrentMutation,

    #[error("worker failed during parallel reduction: {0}")]
    WorkerFailure(String),
}
