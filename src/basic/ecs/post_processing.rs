use std::fmt;

use bevy_ecs::prelude::*;
use tabled::{Table, Tabled};

use crate::basic::result::{Scale, SimulationResult};

use super::elements::ReductionResult;

/// A float that limits the number of decimal places when printed.
#[derive(Clone, Copy, PartialEq, PartialOrd)]
pub(crate) struct FloatWrapper {
    pub(crate) value: f64,
    pub(crate) precision: usize,
}

impl FloatWrapper {
    pub fn new(value: f64, precision: usize) -> Self {
        FloatWrapper { value, precision }
    }
}

impl Default for FloatWrapper {
    fn default() -> Self {
        Self {
            value: Default::default(),
            precision: 4,
        }
    }
}

impl fmt::Display for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

impl fmt::Debug for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

/// Table row summarising one port pair of the residual.
#[derive(Debug, Tabled)]
pub(crate) struct PortPairRow {
    #[tabled(rename = "S(i,j)")]
    pub(crate) pair: String,
    #[tabled(rename = "min |S|^2")]
    pub(crate) min_power: FloatWrapper,
    #[tabled(rename = "max |S|^2")]
    pub(crate) max_power: FloatWrapper,
    #[tabled(rename = "mean |S|^2")]
    pub(crate) mean_power: FloatWrapper,
}

pub(crate) fn result_table(res: &SimulationResult) -> Table {
    let n = res.nports();
    let mut rows = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            let power = res.magnitude(i, j, Scale::AbsSq);
            let min = power.iter().fold(f64::INFINITY, |a, &b| a.min(b));
            let max = power.iter().fold(0.0f64, |a, &b| a.max(b));
            let mean = power.iter().sum::<f64>() / power.len().max(1) as f64;
            rows.push(PortPairRow {
                pair: format!(
                    "{} <- {}",
                    res.external_ports()[i].label(),
                    res.external_ports()[j].label()
                ),
                min_power: FloatWrapper::new(min, 4),
                max_power: FloatWrapper::new(max, 4),
                mean_power: FloatWrapper::new(mean, 4),
            });
        }
    }
    Table::new(rows)
}

/// ECS system printing the port-pair summary of the latest reduction.
pub fn print_result_table(res: Option<Res<ReductionResult>>) {
    let Some(outcome) = res else {
        return;
    };
    let Some(sim) = outcome.result.as_ref() else {
        return;
    };
    println!("{}", result_table(sim));
}
