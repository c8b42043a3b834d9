use crate::error::{ensure_input, LeximinError, Result};
use crate::model::{Constraint, LinearExpr, Variables};
use crate::optimizer::Optimizer;
use tracing::{debug, info, trace, warn};

/// Relative factor under which a utility is considered equal to the saturation level.
pub const DEFAULT_TOLERANCE_FACTOR: f64 = 1.001;
/// Smallest band around a level, so that a level of 0 still tolerates solver noise.
pub const DEFAULT_ABSOLUTE_TOLERANCE: f64 = 1e-9;

/// Numeric knobs of the saturation loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaturationOptions {
    pub tolerance_factor: f64,
    pub absolute_tolerance: f64,
    /// Upper bound on the number of rounds; defaults to the number of agents.
    pub max_rounds: Option<usize>,
}

impl Default for SaturationOptions {
    fn default() -> Self {
        SaturationOptions {
            tolerance_factor: DEFAULT_TOLERANCE_FACTOR,
            absolute_tolerance: DEFAULT_ABSOLUTE_TOLERANCE,
            max_rounds: None,
        }
    }
}

impl SaturationOptions {
    pub fn tolerance_factor(mut self, tolerance_factor: f64) -> Self {
        self.tolerance_factor = tolerance_factor;
        self
    }

    pub fn absolute_tolerance(mut self, absolute_tolerance: f64) -> Self {
        self.absolute_tolerance = absolute_tolerance;
        self
    }

    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure_input!(
            self.tolerance_factor.is_finite() && self.tolerance_factor >= 1.,
            "tolerance factor must be a finite number >= 1, got {}",
            self.tolerance_factor
        );
        ensure_input!(
            self.absolute_tolerance.is_finite() && self.absolute_tolerance >= 0.,
            "absolute tolerance must be a finite non-negative number, got {}",
            self.absolute_tolerance
        );
        if self.tolerance_factor > 1.1 {
            warn!(
                "tolerance factor {} is wide; distinct utility levels may be merged",
                self.tolerance_factor
            );
        }
        Ok(())
    }

    /// Whether `value` lies above the tolerance band of `level`.
    ///
    /// For a positive level this is `value > level * tolerance_factor`.
    #[inline]
    pub fn exceeds(&self, value: f64, level: f64) -> bool {
        let band = (level.abs() * (self.tolerance_factor - 1.)).max(self.absolute_tolerance);
        value > level + band
    }
}

///
/// Free/saturated partition of agents during one solver run
///
#[derive(Debug, Clone, PartialEq)]
pub struct SaturationState {
    // ascending agent indices
    free_agents: Vec<usize>,
    saturated_utilities: Vec<Option<f64>>,
    saturation_order: Vec<usize>,
    saturation_constraints: Vec<Constraint>,
}

impl SaturationState {
    pub fn new(num_of_agents: usize) -> SaturationState {
        SaturationState {
            free_agents: (0..num_of_agents).collect(),
            saturated_utilities: vec![None; num_of_agents],
            saturation_order: Vec::with_capacity(num_of_agents),
            saturation_constraints: Vec::with_capacity(num_of_agents),
        }
    }

    pub fn free_agents(&self) -> &[usize] {
        &self.free_agents
    }

    #[inline]
    pub fn is_saturated(&self, agent: usize) -> bool {
        self.saturated_utilities[agent].is_some()
    }

    pub fn saturated_utilities(&self) -> &[Option<f64>] {
        &self.saturated_utilities
    }

    pub fn saturation_order(&self) -> &[usize] {
        &self.saturation_order
    }

    /// Permanent `utility >= level` constraints of saturated agents.
    pub fn saturation_constraints(&self) -> &[Constraint] {
        &self.saturation_constraints
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.free_agents.is_empty()
    }

    fn saturate(&mut self, agent: usize, level: f64, utility: &LinearExpr) {
        debug_assert!(!self.is_saturated(agent));
        self.saturated_utilities[agent] = Some(level);
        self.saturation_order.push(agent);
        self.saturation_constraints.push(utility.at_least(level));
    }

    /// Drops saturated agents from the free list and returns how many were dropped.
    fn retain_free(&mut self) -> usize {
        let before = self.free_agents.len();
        let saturated = &self.saturated_utilities;
        self.free_agents.retain(|&agent| saturated[agent].is_none());
        before - self.free_agents.len()
    }
}

/// Metrics of one solver run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverStats {
    pub optimizer_calls: u32,
    pub rounds: u32,
    /// agents in the order they were saturated
    pub saturation_order: Vec<usize>,
    /// index i gives the level at which agent i was saturated
    pub saturated_utilities: Vec<f64>,
}

/// Variable assignment with a leximin-optimal utility vector.
#[derive(Debug, Clone, PartialEq)]
pub struct SolvedProgram {
    /// index i gives the value of the variable with index i
    pub values: Vec<f64>,
    pub stats: SolverStats,
}

///
/// Leximin solver
///
/// Raises the minimum utility of the free agents as far as possible, saturates every free agent
/// whose utility cannot exceed that level without lowering another free agent below it, and
/// repeats with the remaining free agents. Each round saturates at least one agent, so there are
/// at most n rounds and O(n^2) optimizer calls.
///
#[derive(Debug, Clone)]
pub struct LeximinSolver<O: Optimizer> {
    optimizer: O,
    options: SaturationOptions,
}

impl<O: Optimizer> LeximinSolver<O> {
    pub fn new(optimizer: O) -> LeximinSolver<O> {
        LeximinSolver {
            optimizer,
            options: SaturationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SaturationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &SaturationOptions {
        &self.options
    }

    pub fn into_optimizer(self) -> O {
        self.optimizer
    }

    fn validate_input(
        &self,
        variables: &Variables,
        utilities: &[LinearExpr],
        constraints: &[Constraint],
    ) -> Result<()> {
        self.options.validate()?;
        ensure_input!(!utilities.is_empty(), "there must be at least one agent");
        let declared = |max_index: Option<usize>| max_index.map_or(true, |i| i < variables.len());
        for (agent, utility) in utilities.iter().enumerate() {
            ensure_input!(
                declared(utility.terms().iter().map(|(v, _)| v.index()).max()),
                "utility of agent {} uses an undeclared variable",
                agent
            );
        }
        for (i, c) in constraints.iter().enumerate() {
            ensure_input!(
                declared(c.max_var_index()),
                "constraint {} uses an undeclared variable",
                i
            );
        }
        Ok(())
    }

    fn maximize(
        &mut self,
        variables: &Variables,
        objective: &LinearExpr,
        constraints: &[&Constraint],
        round: usize,
        stats: &mut SolverStats,
    ) -> Result<Vec<f64>> {
        stats.optimizer_calls += 1;
        let values = self
            .optimizer
            .maximize(variables, objective, constraints)
            .map_err(|source| LeximinError::Optimization { round, source })?;
        if values.len() != variables.len() {
            return Err(LeximinError::Optimization {
                round,
                source: anyhow::anyhow!(
                    "optimizer returned {} values for {} variables",
                    values.len(),
                    variables.len()
                ),
            });
        }
        trace!("round {} assignment: {:?}", round, values);
        Ok(values)
    }

    /// Finds an assignment of `variables` satisfying `constraints` whose `utilities` vector is
    /// leximin-maximal.
    pub fn solve(
        &mut self,
        variables: &Variables,
        utilities: &[LinearExpr],
        constraints: &[Constraint],
    ) -> Result<SolvedProgram> {
        self.validate_input(variables, utilities, constraints)?;
        let num_of_agents = utilities.len();
        let max_rounds = self.options.max_rounds.unwrap_or(num_of_agents);

        let mut state = SaturationState::new(num_of_agents);
        let mut stats = SolverStats::default();

        // the floor variable of a round is declared on a copy, so agent tests see only `variables`
        let mut floor_variables = variables.clone();
        let floor = floor_variables.add();
        let floor_objective = LinearExpr::from(floor);

        for round in 0..max_rounds {
            stats.rounds += 1;
            info!(
                "round {}: saturated utilities {:?}",
                round,
                state.saturated_utilities()
            );

            // maximize the minimum utility of the free agents
            let floor_constraints: Vec<Constraint> = state
                .free_agents()
                .iter()
                .map(|&agent| utilities[agent].at_least_var(floor))
                .collect();
            let all: Vec<&Constraint> = constraints
                .iter()
                .chain(state.saturation_constraints())
                .chain(&floor_constraints)
                .collect();
            let mut assignment =
                self.maximize(&floor_variables, &floor_objective, &all, round, &mut stats)?;
            let level = assignment[floor.index()];
            assignment.truncate(variables.len());
            let profile: Vec<f64> = utilities.iter().map(|u| u.eval(&assignment)).collect();
            info!("  max min value: {}, utility profile: {:?}", level, profile);

            let candidates = state.free_agents().to_vec();
            for &agent in &candidates {
                if self.options.exceeds(profile[agent], level) {
                    debug!(
                        "  utility of agent #{} is at least {}, so agent remains free",
                        agent, profile[agent]
                    );
                    continue;
                }
                let others: Vec<Constraint> = candidates
                    .iter()
                    .filter(|&&other| other != agent)
                    .map(|&other| utilities[other].at_least(level))
                    .collect();
                let all: Vec<&Constraint> = constraints
                    .iter()
                    .chain(state.saturation_constraints())
                    .chain(&others)
                    .collect();
                assignment =
                    self.maximize(variables, &utilities[agent], &all, round, &mut stats)?;
                let max_utility = utilities[agent].eval(&assignment);
                if self.options.exceeds(max_utility, level) {
                    debug!(
                        "  max utility of agent #{} is {}, so agent remains free",
                        agent, max_utility
                    );
                    continue;
                }
                debug!(
                    "  max utility of agent #{} is {}, so agent becomes saturated",
                    agent, max_utility
                );
                state.saturate(agent, level, &utilities[agent]);
            }

            if state.retain_free() == 0 {
                return Err(LeximinError::InternalConsistency {
                    round,
                    free_agents: state.free_agents().to_vec(),
                });
            }
            if state.is_done() {
                stats.saturated_utilities = state
                    .saturated_utilities()
                    .iter()
                    .map(|u| u.unwrap_or(f64::NAN))
                    .collect();
                stats.saturation_order = state.saturation_order().to_vec();
                info!(
                    "all agents are saturated: utility profile {:?}, {} calls to optimizer",
                    stats.saturated_utilities, stats.optimizer_calls
                );
                return Ok(SolvedProgram {
                    values: assignment,
                    stats,
                });
            }
        }

        Err(LeximinError::InternalConsistency {
            round: max_rounds,
            free_agents: state.free_agents().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{LeximinSolver, SaturationOptions, SaturationState};
    use crate::model::{Constraint, LinearExpr, Variables};
    use crate::optimizer::{GoodLpOptimizer, Optimizer};
    use crate::valuation::ValueMatrix;
    use crate::variables::{utility_expressions, AllocationVariables};

    /// Counts calls and forwards to the LP backend.
    #[derive(Default)]
    struct Counting {
        calls: usize,
        inner: GoodLpOptimizer,
    }

    impl Optimizer for Counting {
        fn maximize(
            &mut self,
            variables: &Variables,
            objective: &LinearExpr,
            constraints: &[&Constraint],
        ) -> anyhow::Result<Vec<f64>> {
            self.calls += 1;
            self.inner.maximize(variables, objective, constraints)
        }
    }

    /// Assigns the same value to every variable, whatever the program.
    struct Constant(f64);

    impl Optimizer for Constant {
        fn maximize(
            &mut self,
            variables: &Variables,
            _objective: &LinearExpr,
            _constraints: &[&Constraint],
        ) -> anyhow::Result<Vec<f64>> {
            Ok(vec![self.0; variables.len()])
        }
    }

    struct Failing;

    impl Optimizer for Failing {
        fn maximize(
            &mut self,
            _variables: &Variables,
            _objective: &LinearExpr,
            _constraints: &[&Constraint],
        ) -> anyhow::Result<Vec<f64>> {
            Err(anyhow::anyhow!("infeasible"))
        }
    }

    fn program(rows: Vec<Vec<i32>>) -> (Variables, Vec<LinearExpr>, Vec<Constraint>) {
        let values = ValueMatrix::new(rows).unwrap();
        let mut variables = Variables::new();
        let (alloc, constraints) = AllocationVariables::build(
            &mut variables,
            values.num_of_agents(),
            values.num_of_objects(),
        );
        let utilities = utility_expressions(&values, &alloc, |agent| agent).unwrap();
        (variables, utilities, constraints)
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-6, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_exceeds() {
        let options = SaturationOptions::default();
        assert!(!options.exceeds(3.002, 3.));
        assert!(options.exceeds(3.01, 3.));
        assert!(!options.exceeds(1e-12, 0.));
        assert!(options.exceeds(1e-6, 0.));
        // band lies above a negative level too
        assert!(!options.exceeds(-2.001, -2.));
        assert!(options.exceeds(-1.99, -2.));
    }

    #[test]
    fn test_invalid_options() {
        for options in vec![
            SaturationOptions::default().tolerance_factor(0.9),
            SaturationOptions::default().tolerance_factor(f64::NAN),
            SaturationOptions::default().absolute_tolerance(-1.),
        ] {
            assert!(options.validate().unwrap_err().is_input());
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut state = SaturationState::new(3);
        assert_eq!(state.free_agents(), [0, 1, 2]);
        state.saturate(1, 2.5, &LinearExpr::constant(2.5));
        assert!(state.is_saturated(1));
        assert_eq!(state.retain_free(), 1);
        assert_eq!(state.free_agents(), [0, 2]);
        assert_eq!(state.saturated_utilities(), [None, Some(2.5), None]);
        assert_eq!(state.saturation_constraints().len(), 1);
        assert_eq!(state.retain_free(), 0);
        assert!(!state.is_done());
    }

    #[test_log::test]
    fn test_saturation_levels_are_non_decreasing() {
        let (variables, utilities, constraints) =
            program(vec![vec![3, 0, 0], vec![0, 4, 0], vec![5, 5, 5]]);
        let mut solver = LeximinSolver::new(Counting::default());
        let solved = solver.solve(&variables, &utilities, &constraints).unwrap();
        let stats = &solved.stats;
        assert_close(&stats.saturated_utilities, &[3., 4., 5.]);
        assert_eq!(stats.saturation_order, [0, 1, 2]);
        assert_eq!(stats.rounds, 3);
        let levels: Vec<f64> = stats
            .saturation_order
            .iter()
            .map(|&agent| stats.saturated_utilities[agent])
            .collect();
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));

        let profile: Vec<f64> = utilities.iter().map(|u| u.eval(&solved.values)).collect();
        assert_close(&profile, &[3., 4., 5.]);
        assert!(constraints
            .iter()
            .all(|c| c.is_satisfied(&solved.values, 1e-6)));
        assert_eq!(solver.into_optimizer().calls, stats.optimizer_calls as usize);
    }

    #[test_log::test]
    fn test_tied_agents_saturate_in_one_round() {
        let (variables, utilities, constraints) = program(vec![vec![5, 0], vec![3, 3]]);
        let solved = LeximinSolver::new(GoodLpOptimizer::new())
            .solve(&variables, &utilities, &constraints)
            .unwrap();
        assert_eq!(solved.stats.rounds, 1);
        assert_close(&solved.stats.saturated_utilities, &[3.75, 3.75]);
        // one max-min call and one test per agent
        assert_eq!(solved.stats.optimizer_calls, 3);
    }

    #[test]
    fn test_idempotent() {
        let (variables, utilities, constraints) =
            program(vec![vec![4, 0, 0], vec![0, 3, 0], vec![5, 5, 10], vec![5, 5, 10]]);
        let first = LeximinSolver::new(GoodLpOptimizer::new())
            .solve(&variables, &utilities, &constraints)
            .unwrap();
        let second = LeximinSolver::new(GoodLpOptimizer::new())
            .solve(&variables, &utilities, &constraints)
            .unwrap();
        assert_close(
            &first.stats.saturated_utilities,
            &second.stats.saturated_utilities,
        );
        assert_close(&first.stats.saturated_utilities, &[4., 3., 5., 5.]);
    }

    #[test]
    fn test_no_progress_is_internal_consistency_failure() {
        let (variables, utilities, constraints) = program(vec![vec![5, 0], vec![3, 3]]);
        // every utility exceeds the reported floor, so nobody is ever tested
        let err = LeximinSolver::new(Constant(1.))
            .solve(&variables, &utilities, &constraints)
            .unwrap_err();
        assert!(err.is_internal_consistency(), "{}", err);
    }

    #[test]
    fn test_optimizer_failure_is_propagated() {
        let (variables, utilities, constraints) = program(vec![vec![5, 0], vec![3, 3]]);
        let err = LeximinSolver::new(Failing)
            .solve(&variables, &utilities, &constraints)
            .unwrap_err();
        assert!(err.is_optimization());
        assert!(err.to_string().contains("round 0"));
    }

    #[test]
    fn test_infeasible_constraints() {
        let (variables, utilities, mut constraints) = program(vec![vec![5, 0], vec![3, 3]]);
        constraints.push(utilities[0].at_least(100.));
        let err = LeximinSolver::new(GoodLpOptimizer::new())
            .solve(&variables, &utilities, &constraints)
            .unwrap_err();
        assert!(err.is_optimization());
    }

    #[test]
    fn test_invalid_input_makes_no_optimizer_call() {
        let (variables, utilities, constraints) = program(vec![vec![5, 0], vec![3, 3]]);
        let mut counting = Counting::default();

        let err = LeximinSolver::new(&mut counting)
            .solve(&variables, &[], &constraints)
            .unwrap_err();
        assert!(err.is_input());

        let err = LeximinSolver::new(&mut counting)
            .solve(&Variables::new(), &utilities, &constraints)
            .unwrap_err();
        assert!(err.is_input());

        let err = LeximinSolver::new(&mut counting)
            .with_options(SaturationOptions::default().tolerance_factor(0.5))
            .solve(&variables, &utilities, &constraints)
            .unwrap_err();
        assert!(err.is_input());

        assert_eq!(counting.calls, 0);
    }
}
