use crate::error::{ensure_input, Result};
use crate::model::{Constraint, LinearExpr, VarId, Variables};
use crate::valuation::ValueMatrix;

///
/// Allocation fractions: one variable per (unit, object)
///
/// A unit is an agent, or a family when agents are grouped into families.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationVariables {
    num_units: usize,
    num_objects: usize,
    // row-major, num_units * num_objects
    ids: Vec<VarId>,
}

impl AllocationVariables {
    /// Declares the variable block in `variables` and returns it with the feasibility
    /// constraints (every object fully allocated) followed by the positivity constraints.
    pub fn build(
        variables: &mut Variables,
        num_units: usize,
        num_objects: usize,
    ) -> (AllocationVariables, Vec<Constraint>) {
        let alloc = AllocationVariables {
            num_units,
            num_objects,
            ids: variables.add_vector(num_units * num_objects),
        };
        let mut constraints = alloc.feasibility_constraints();
        constraints.extend(alloc.positivity_constraints());
        (alloc, constraints)
    }

    #[inline]
    pub fn num_units(&self) -> usize {
        self.num_units
    }

    #[inline]
    pub fn num_objects(&self) -> usize {
        self.num_objects
    }

    #[inline]
    pub fn var(&self, unit: usize, object: usize) -> VarId {
        self.ids[unit * self.num_objects + object]
    }

    pub fn row(&self, unit: usize) -> &[VarId] {
        let start = unit * self.num_objects;
        &self.ids[start..start + self.num_objects]
    }

    /// For every object, the fractions over all units sum to 1.
    pub fn feasibility_constraints(&self) -> Vec<Constraint> {
        (0..self.num_objects)
            .map(|object| {
                let mut column = LinearExpr::with_capacity(self.num_units);
                for unit in 0..self.num_units {
                    column.add_mul(1., self.var(unit, object));
                }
                column.equals(1.)
            })
            .collect()
    }

    pub fn positivity_constraints(&self) -> Vec<Constraint> {
        self.ids
            .iter()
            .map(|&var| LinearExpr::from(var).geq(0.))
            .collect()
    }

    /// Reads the fraction matrix out of a full variable assignment.
    pub fn values_from(&self, assignment: &[f64]) -> Vec<Vec<f64>> {
        (0..self.num_units)
            .map(|unit| {
                self.row(unit)
                    .iter()
                    .map(|var| assignment[var.index()])
                    .collect()
            })
            .collect()
    }
}

/// Builds the utility expression of every agent: `Σ_o value(agent, o) * x[unit_of_agent(agent)][o]`.
///
/// Zero values contribute no term.
pub fn utility_expressions(
    values: &ValueMatrix,
    variables: &AllocationVariables,
    unit_of_agent: impl Fn(usize) -> usize,
) -> Result<Vec<LinearExpr>> {
    ensure_input!(
        values.num_of_objects() == variables.num_objects(),
        "value matrix has {} objects, allocation variables have {}",
        values.num_of_objects(),
        variables.num_objects()
    );
    values
        .agents()
        .map(|agent| {
            let unit = unit_of_agent(agent);
            ensure_input!(
                unit < variables.num_units(),
                "agent {} maps to unit {}, but there are only {} units",
                agent,
                unit,
                variables.num_units()
            );
            let row = values.row(agent);
            let mut utility = LinearExpr::with_capacity(row.len());
            for (object, &value) in row.iter().enumerate() {
                if value != 0. {
                    utility.add_mul(value, variables.var(unit, object));
                }
            }
            Ok(utility)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{utility_expressions, AllocationVariables};
    use crate::family::Families;
    use crate::model::Variables;
    use crate::valuation::ValueMatrix;

    #[test]
    fn test_build_constraints() {
        let mut variables = Variables::new();
        let (alloc, constraints) = AllocationVariables::build(&mut variables, 2, 3);
        assert_eq!(variables.len(), 6);
        // 3 columns + 6 positivity
        assert_eq!(constraints.len(), 9);
        assert_eq!(alloc.var(1, 2).index(), 5);

        let assignment = [1., 0.5, 0., 0., 0.5, 1.];
        assert!(constraints.iter().all(|c| c.is_satisfied(&assignment, 1e-12)));
        assert_eq!(
            alloc.values_from(&assignment),
            vec![vec![1., 0.5, 0.], vec![0., 0.5, 1.]]
        );

        let overallocated = [1., 0.5, 0., 0.5, 0.5, 1.];
        assert!(!alloc.feasibility_constraints()[0].is_satisfied(&overallocated, 1e-9));
        let negative = [1.5, 0.5, 0., -0.5, 0.5, 1.];
        assert!(!constraints.iter().all(|c| c.is_satisfied(&negative, 1e-9)));
    }

    #[test]
    fn test_individual_utilities() {
        let values = ValueMatrix::new(vec![vec![5, 0], vec![3, 3]]).unwrap();
        let mut variables = Variables::new();
        let (alloc, _) = AllocationVariables::build(&mut variables, 2, 2);
        let utilities = utility_expressions(&values, &alloc, |agent| agent).unwrap();
        let assignment = [0.75, 0., 0.25, 1.];
        assert_eq!(utilities[0].eval(&assignment), 3.75);
        assert_eq!(utilities[1].eval(&assignment), 3.75);
        assert_eq!(utilities[0].terms().len(), 1);
    }

    #[test]
    fn test_family_utilities_use_own_values() {
        let values = ValueMatrix::new(vec![vec![3, 0, 0], vec![0, 4, 0], vec![5, 5, 5]]).unwrap();
        let families = Families::new(vec![vec![0], vec![1, 2]], 3).unwrap();
        let mut variables = Variables::new();
        let (alloc, _) = AllocationVariables::build(&mut variables, families.len(), 3);
        let utilities =
            utility_expressions(&values, &alloc, |agent| families.family_of(agent)).unwrap();
        // family 0 gets object 0, family 1 gets objects 1 and 2
        let assignment = [1., 0., 0., 0., 1., 1.];
        let profile: Vec<f64> = utilities.iter().map(|u| u.eval(&assignment)).collect();
        assert_eq!(profile, [3., 4., 10.]);
    }

    #[test]
    fn test_shape_mismatch() {
        let values = ValueMatrix::new(vec![vec![1, 2]]).unwrap();
        let mut variables = Variables::new();
        let (alloc, _) = AllocationVariables::build(&mut variables, 1, 3);
        assert!(utility_expressions(&values, &alloc, |a| a).unwrap_err().is_input());

        let (alloc, _) = AllocationVariables::build(&mut variables, 1, 2);
        assert!(utility_expressions(&values, &alloc, |_| 1).unwrap_err().is_input());
    }
}
