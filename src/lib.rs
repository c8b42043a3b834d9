//! Leximin-optimal fractional allocation of divisible objects.
//!
//! An allocation is leximin-optimal when its utility vector, sorted ascending, is
//! lexicographically maximal among all feasible allocations. It is found by saturating agents
//! level by level on top of a linear optimizer (S. J. Willson, "Fair Division Using Linear
//! Programming", part 6).
//!
//! ```no_run
//! use leximin_allocation::{leximin_optimal_allocation, ValueMatrix};
//!
//! let values = ValueMatrix::new(vec![vec![5, 0], vec![3, 3]])?;
//! let allocation = leximin_optimal_allocation(&values)?;
//! println!("{}", allocation.round(3));
//! # Ok::<(), leximin_allocation::LeximinError>(())
//! ```

pub mod error;
pub mod family;
pub mod model;
pub mod optimizer;
pub mod solution;
pub mod solver;
pub mod valuation;
pub mod variables;

pub use crate::error::{LeximinError, Result};
pub use crate::family::Families;
pub use crate::optimizer::{GoodLpOptimizer, Optimizer};
pub use crate::solution::{is_leximin_better, Allocation};
pub use crate::solver::{LeximinSolver, SaturationOptions, SolverStats};
pub use crate::valuation::ValueMatrix;

use crate::error::ensure_input;
use crate::model::Variables;
use crate::variables::{utility_expressions, AllocationVariables};
use tracing::info;

///
/// Leximin allocation problem
///
/// Optional families make agents share one allocation row; optional minimum utilities add a
/// lower bound on each agent's utility. All input is validated before the optimizer is called.
///
#[derive(Debug, Clone)]
pub struct LeximinProblem {
    values: ValueMatrix,
    families: Option<Vec<Vec<usize>>>,
    min_utilities: Option<Vec<f64>>,
    options: SaturationOptions,
}

impl LeximinProblem {
    pub fn new(values: ValueMatrix) -> LeximinProblem {
        LeximinProblem {
            values,
            families: None,
            min_utilities: None,
            options: SaturationOptions::default(),
        }
    }

    pub fn families(mut self, families: Vec<Vec<usize>>) -> Self {
        self.families = Some(families);
        self
    }

    /// index i gives the utility agent i must receive at least
    pub fn min_utilities(mut self, thresholds: Vec<f64>) -> Self {
        self.min_utilities = Some(thresholds);
        self
    }

    pub fn options(mut self, options: SaturationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn solve(&self) -> Result<Allocation> {
        self.solve_with(GoodLpOptimizer::new())
    }

    pub fn solve_with<O: Optimizer>(&self, optimizer: O) -> Result<Allocation> {
        let values = &self.values;
        let num_of_agents = values.num_of_agents();
        ensure_input!(num_of_agents > 0, "there must be at least one agent");
        let families = self
            .families
            .as_ref()
            .map(|members| Families::new(members.clone(), num_of_agents))
            .transpose()?;
        if let Some(thresholds) = &self.min_utilities {
            ensure_input!(
                thresholds.len() == num_of_agents,
                "number of agents {} differs from number of minimum utilities {}",
                num_of_agents,
                thresholds.len()
            );
            ensure_input!(
                thresholds.iter().all(|t| t.is_finite()),
                "minimum utilities must be finite"
            );
        }
        self.options.validate()?;
        if let Some(families) = &families {
            info!("map agent to family: {:?}", families.agent_to_family());
        }

        let num_units = families.as_ref().map_or(num_of_agents, Families::len);
        let mut variables = Variables::new();
        let (alloc, mut constraints) =
            AllocationVariables::build(&mut variables, num_units, values.num_of_objects());
        let utilities = match &families {
            Some(families) => utility_expressions(values, &alloc, |agent| families.family_of(agent)),
            None => utility_expressions(values, &alloc, |agent| agent),
        }?;
        if let Some(thresholds) = &self.min_utilities {
            constraints.extend(
                utilities
                    .iter()
                    .zip(thresholds)
                    .map(|(utility, &threshold)| utility.at_least(threshold)),
            );
        }

        let solved = LeximinSolver::new(optimizer)
            .with_options(self.options)
            .solve(&variables, &utilities, &constraints)?;
        Ok(Allocation::new(
            values.clone(),
            alloc.values_from(&solved.values),
            families,
            solved.stats,
        ))
    }
}

/// Finds the leximin-optimal (egalitarian) allocation among individual agents.
pub fn leximin_optimal_allocation(values: &ValueMatrix) -> Result<Allocation> {
    LeximinProblem::new(values.clone()).solve()
}

/// Finds the leximin-optimal allocation among families; `families[f]` lists the agents of family `f`.
pub fn leximin_optimal_allocation_for_families(
    values: &ValueMatrix,
    families: Vec<Vec<usize>>,
) -> Result<Allocation> {
    LeximinProblem::new(values.clone()).families(families).solve()
}
