use crate::family::Families;
use crate::solver::SolverStats;
use crate::valuation::ValueMatrix;
use std::cmp::Ordering;
use std::fmt;

// solver noise below this magnitude is clamped to 0
const NEGATIVE_NOISE: f64 = 1e-9;

///
/// Fractional allocation of objects to agents
///
/// The matrix has one row per unit: per agent, or per family when agents were grouped into
/// families. An agent's utility is its own value row against its unit's fractions.
///
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    values: ValueMatrix,
    /// index [u][o] gives the fraction of object o allocated to unit u
    matrix: Vec<Vec<f64>>,
    families: Option<Families>,
    /// index i gives the utility of agent i
    utilities: Vec<f64>,
    stats: SolverStats,
}

impl Allocation {
    pub fn new(
        values: ValueMatrix,
        mut matrix: Vec<Vec<f64>>,
        families: Option<Families>,
        stats: SolverStats,
    ) -> Allocation {
        debug_assert_eq!(
            matrix.len(),
            families.as_ref().map_or(values.num_of_agents(), Families::len)
        );
        matrix
            .iter_mut()
            .flatten()
            .filter(|x| **x < 0. && **x > -NEGATIVE_NOISE)
            .for_each(|x| *x = 0.);
        let utilities = values
            .agents()
            .map(|agent| {
                let unit = families.as_ref().map_or(agent, |f| f.family_of(agent));
                values.utility_of(agent, &matrix[unit])
            })
            .collect();
        Allocation {
            values,
            matrix,
            families,
            utilities,
            stats,
        }
    }

    pub fn values(&self) -> &ValueMatrix {
        &self.values
    }

    pub fn matrix(&self) -> &[Vec<f64>] {
        &self.matrix
    }

    pub fn families(&self) -> Option<&Families> {
        self.families.as_ref()
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    #[inline]
    pub fn num_of_agents(&self) -> usize {
        self.values.num_of_agents()
    }

    #[inline]
    pub fn num_of_units(&self) -> usize {
        self.matrix.len()
    }

    #[inline]
    pub fn unit_of(&self, agent: usize) -> usize {
        self.families.as_ref().map_or(agent, |f| f.family_of(agent))
    }

    /// Fractions of every object the agent receives, inherited from its family if any.
    pub fn agent_fractions(&self, agent: usize) -> &[f64] {
        &self.matrix[self.unit_of(agent)]
    }

    #[inline]
    pub fn utility_of(&self, agent: usize) -> f64 {
        self.utilities[agent]
    }

    /// Utilities of all agents in agent order.
    pub fn utility_profile(&self) -> &[f64] {
        &self.utilities
    }

    /// Copy with fractions and utilities rounded to `digits` decimals.
    pub fn round(&self, digits: u32) -> Allocation {
        let scale = 10f64.powi(digits as i32);
        let round = |x: f64| (x * scale).round() / scale;
        Allocation {
            values: self.values.clone(),
            matrix: self
                .matrix
                .iter()
                .map(|row| row.iter().map(|&x| round(x)).collect())
                .collect(),
            families: self.families.clone(),
            utilities: self.utilities.iter().map(|&u| round(u)).collect(),
            stats: self.stats.clone(),
        }
    }

    /// Every object is fully allocated and no fraction is negative, up to `tolerance`.
    pub fn is_feasible(&self, tolerance: f64) -> bool {
        let non_negative = self.matrix.iter().flatten().all(|&x| x >= -tolerance);
        let complete = self.values.objects().all(|object| {
            let total: f64 = self.matrix.iter().map(|row| row[object]).sum();
            (total - 1.).abs() <= tolerance
        });
        non_negative && complete
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for agent in self.values.agents() {
            let shares: Vec<String> = self
                .agent_fractions(agent)
                .iter()
                .enumerate()
                .filter(|(_, x)| **x > 0.)
                .map(|(object, &x)| format!("{:.1}% of {}", x * 100., object))
                .collect();
            writeln!(
                f,
                "Agent #{} gets {{ {}}} with value {}.",
                agent,
                shares.join(", "),
                self.utilities[agent]
            )?;
        }
        Ok(())
    }
}

/// Whether `x` sorted ascending is lexicographically greater than `y` sorted ascending.
pub fn is_leximin_better(x: &[f64], y: &[f64]) -> bool {
    let sorted = |v: &[f64]| {
        let mut v = v.to_vec();
        v.sort_by(f64::total_cmp);
        v
    };
    let (x, y) = (sorted(x), sorted(y));
    for (a, b) in x.iter().zip(&y) {
        match a.total_cmp(b) {
            Ordering::Equal => continue,
            ordering => return ordering == Ordering::Greater,
        }
    }
    x.len() > y.len()
}
