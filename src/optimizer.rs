use crate::model::{Constraint, LinearExpr, Relation, Variables};
use anyhow::{ensure, Context, Result};
use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, Solution, SolverModel,
    Variable,
};
use tracing::trace;

///
/// Linear optimizer used by the saturation loop
///
/// Maximizes `objective` over all declared `variables` subject to `constraints` and returns the
/// value of every declared variable at an optimum. Infeasible and unbounded programs are errors.
///
pub trait Optimizer {
    fn maximize(
        &mut self,
        variables: &Variables,
        objective: &LinearExpr,
        constraints: &[&Constraint],
    ) -> Result<Vec<f64>>;
}

impl<O: Optimizer + ?Sized> Optimizer for &mut O {
    fn maximize(
        &mut self,
        variables: &Variables,
        objective: &LinearExpr,
        constraints: &[&Constraint],
    ) -> Result<Vec<f64>> {
        (**self).maximize(variables, objective, constraints)
    }
}

/// [`Optimizer`] backed by `good_lp` with its default (pure Rust) solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpOptimizer;

impl GoodLpOptimizer {
    pub fn new() -> GoodLpOptimizer {
        GoodLpOptimizer
    }
}

fn to_expression(expr: &LinearExpr, handles: &[Variable]) -> Result<Expression> {
    let terms = expr
        .terms()
        .iter()
        .map(|&(var, coefficient)| {
            handles
                .get(var.index())
                .map(|&handle| handle * coefficient)
                .with_context(|| format!("variable x{} is not declared", var.index()))
        })
        .collect::<Result<Vec<Expression>>>()?;
    Ok(terms.into_iter().sum())
}

fn to_constraint(c: &Constraint, handles: &[Variable]) -> Result<constraint::Constraint> {
    let lhs = to_expression(&c.expr, handles)?;
    // the constant term moves to the right hand side
    let rhs = c.rhs - c.expr.constant_term();
    Ok(match c.relation {
        Relation::LessOrEqual => constraint::leq(lhs, rhs),
        Relation::Equal => constraint::eq(lhs, rhs),
        Relation::GreaterOrEqual => constraint::geq(lhs, rhs),
    })
}

impl Optimizer for GoodLpOptimizer {
    fn maximize(
        &mut self,
        variables: &Variables,
        objective: &LinearExpr,
        constraints: &[&Constraint],
    ) -> Result<Vec<f64>> {
        let mut problem = ProblemVariables::new();
        let handles: Vec<Variable> = (0..variables.len())
            .map(|_| problem.add(variable()))
            .collect();

        let mut model = problem
            .maximise(to_expression(objective, &handles)?)
            .using(default_solver);
        for &c in constraints {
            model = model.with(to_constraint(c, &handles)?);
        }

        let solution = model.solve().with_context(|| {
            format!(
                "linear program with {} variables and {} constraints has no optimal solution",
                variables.len(),
                constraints.len()
            )
        })?;
        let values: Vec<f64> = handles.iter().map(|&v| solution.value(v)).collect();
        ensure!(
            values.iter().all(|v| v.is_finite()),
            "solver returned a non-finite assignment"
        );
        trace!("optimal assignment: {:?}", values);
        Ok(values)
    }
}
