use crate::error::{ensure_input, Result};
use num_traits::AsPrimitive;
use std::ops::{Index, Range};

///
/// Values of agents (rows) for divisible objects (columns)
///
/// Values are additive: an agent that receives fraction `x` of object `o` gets `x * value(agent, o)`.
///
#[derive(Debug, Clone, PartialEq)]
pub struct ValueMatrix {
    num_of_agents: usize,
    num_of_objects: usize,
    // row-major, num_of_agents * num_of_objects
    values: Vec<f64>,
}

impl ValueMatrix {
    /// Builds the matrix from rows of any numeric type convertible to `f64`.
    ///
    /// Fails if the rows have different lengths or contain non-finite values.
    pub fn new<R, V>(rows: impl IntoIterator<Item = R>) -> Result<ValueMatrix>
    where
        R: AsRef<[V]>,
        V: AsPrimitive<f64>,
    {
        let mut num_of_agents = 0;
        let mut num_of_objects = None;
        let mut values = Vec::new();
        for row in rows {
            let row = row.as_ref();
            let expected = *num_of_objects.get_or_insert(row.len());
            ensure_input!(
                row.len() == expected,
                "row of agent {} has {} values, expected {}",
                num_of_agents,
                row.len(),
                expected
            );
            for (object, &v) in row.iter().enumerate() {
                let v: f64 = v.as_();
                ensure_input!(
                    v.is_finite(),
                    "value of agent {} for object {} is not finite",
                    num_of_agents,
                    object
                );
                values.push(v);
            }
            num_of_agents += 1;
        }
        Ok(ValueMatrix {
            num_of_agents,
            num_of_objects: num_of_objects.unwrap_or(0),
            values,
        })
    }

    #[inline]
    pub fn num_of_agents(&self) -> usize {
        self.num_of_agents
    }

    #[inline]
    pub fn num_of_objects(&self) -> usize {
        self.num_of_objects
    }

    pub fn agents(&self) -> Range<usize> {
        0..self.num_of_agents
    }

    pub fn objects(&self) -> Range<usize> {
        0..self.num_of_objects
    }

    #[inline]
    pub fn value(&self, agent: usize, object: usize) -> f64 {
        self.row(agent)[object]
    }

    #[inline]
    pub fn row(&self, agent: usize) -> &[f64] {
        let start = agent * self.num_of_objects;
        &self.values[start..start + self.num_of_objects]
    }

    /// Value of the agent for all objects together.
    pub fn total_value(&self, agent: usize) -> f64 {
        self.row(agent).iter().sum()
    }

    /// Utility of the agent for the given fractions of every object.
    pub fn utility_of(&self, agent: usize, fractions: &[f64]) -> f64 {
        debug_assert_eq!(fractions.len(), self.num_of_objects);
        self.row(agent)
            .iter()
            .zip(fractions)
            .map(|(v, x)| v * x)
            .sum()
    }
}

impl Index<usize> for ValueMatrix {
    type Output = [f64];

    fn index(&self, agent: usize) -> &[f64] {
        self.row(agent)
    }
}
