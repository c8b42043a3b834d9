//! Solver-independent linear model: variables, affine expressions and constraints.

use std::fmt;

/// Handle of a declared continuous variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Declared continuous variables. Variables are free; bounds are expressed as constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    len: usize,
}

impl Variables {
    pub fn new() -> Variables {
        Variables::default()
    }

    pub fn add(&mut self) -> VarId {
        self.len += 1;
        VarId(self.len - 1)
    }

    pub fn add_vector(&mut self, len: usize) -> Vec<VarId> {
        (0..len).map(|_| self.add()).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn contains(&self, var: VarId) -> bool {
        var.0 < self.len
    }
}

/// Affine expression `constant + Σ coefficient * variable`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinearExpr {
    pub fn with_capacity(capacity: usize) -> LinearExpr {
        LinearExpr {
            terms: Vec::with_capacity(capacity),
            constant: 0.,
        }
    }

    pub fn constant(constant: f64) -> LinearExpr {
        LinearExpr {
            terms: Vec::new(),
            constant,
        }
    }

    #[inline]
    pub fn add_mul(&mut self, coefficient: f64, var: VarId) {
        self.terms.push((var, coefficient));
    }

    pub fn add_constant(&mut self, constant: f64) {
        self.constant += constant;
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant_term(&self) -> f64 {
        self.constant
    }

    /// Evaluates the expression; `values[i]` is the value of the variable with index `i`.
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .fold(self.constant, |acc, &(var, c)| acc + c * values[var.0])
    }

    pub fn geq(self, rhs: f64) -> Constraint {
        Constraint::new(self, Relation::GreaterOrEqual, rhs)
    }

    pub fn leq(self, rhs: f64) -> Constraint {
        Constraint::new(self, Relation::LessOrEqual, rhs)
    }

    pub fn equals(self, rhs: f64) -> Constraint {
        Constraint::new(self, Relation::Equal, rhs)
    }

    /// `self >= level`, without consuming the expression.
    pub fn at_least(&self, level: f64) -> Constraint {
        self.clone().geq(level)
    }

    /// `self >= var`.
    pub fn at_least_var(&self, var: VarId) -> Constraint {
        let mut expr = LinearExpr::with_capacity(self.terms.len() + 1);
        expr.terms.extend_from_slice(&self.terms);
        expr.constant = self.constant;
        expr.add_mul(-1., var);
        expr.geq(0.)
    }
}

impl From<VarId> for LinearExpr {
    fn from(var: VarId) -> LinearExpr {
        let mut expr = LinearExpr::with_capacity(1);
        expr.add_mul(1., var);
        expr
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    LessOrEqual,
    Equal,
    GreaterOrEqual,
}

/// Linear constraint `expr (<=|=|>=) rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub expr: LinearExpr,
    pub relation: Relation,
    pub rhs: f64,
}

impl Constraint {
    pub fn new(expr: LinearExpr, relation: Relation, rhs: f64) -> Constraint {
        Constraint {
            expr,
            relation,
            rhs,
        }
    }

    /// Checks the constraint against an assignment, allowing `tolerance` of violation.
    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.expr.eval(values);
        match self.relation {
            Relation::LessOrEqual => lhs <= self.rhs + tolerance,
            Relation::Equal => (lhs - self.rhs).abs() <= tolerance,
            Relation::GreaterOrEqual => lhs + tolerance >= self.rhs,
        }
    }

    pub fn max_var_index(&self) -> Option<usize> {
        self.expr.terms.iter().map(|(v, _)| v.0).max()
    }
}

impl fmt::Display for LinearExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (var, c)) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{}*x{}", c, var.0)?;
        }
        if self.terms.is_empty() || self.constant != 0. {
            if !self.terms.is_empty() {
                write!(f, " + ")?;
            }
            write!(f, "{}", self.constant)?;
        }
        Ok(())
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.relation {
            Relation::LessOrEqual => "<=",
            Relation::Equal => "=",
            Relation::GreaterOrEqual => ">=",
        };
        write!(f, "{} {} {}", self.expr, op, self.rhs)
    }
}
