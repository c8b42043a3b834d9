use crate::error::{ensure_input, LeximinError, Result};

const NONE: usize = usize::MAX;

///
/// Partition of agents into families that jointly receive one share
///
/// Every agent belongs to exactly one family and no family is empty.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Families {
    members: Vec<Vec<usize>>,
    // index i gives the family of agent i
    agent_to_family: Vec<usize>,
}

impl Families {
    pub fn new(members: Vec<Vec<usize>>, num_of_agents: usize) -> Result<Families> {
        let mut agent_to_family = vec![NONE; num_of_agents];
        for (family, agents) in members.iter().enumerate() {
            ensure_input!(!agents.is_empty(), "family {} is empty", family);
            for &agent in agents {
                ensure_input!(
                    agent < num_of_agents,
                    "family {} contains agent {}, but there are only {} agents",
                    family,
                    agent,
                    num_of_agents
                );
                ensure_input!(
                    agent_to_family[agent] == NONE,
                    "agent {} belongs to families {} and {}",
                    agent,
                    agent_to_family[agent],
                    family
                );
                agent_to_family[agent] = family;
            }
        }
        if let Some(agent) = agent_to_family.iter().position(|&f| f == NONE) {
            return Err(LeximinError::input(format!(
                "agent {} does not belong to any family",
                agent
            )));
        }
        Ok(Families {
            members,
            agent_to_family,
        })
    }

    /// Every agent in a family of its own.
    pub fn singletons(num_of_agents: usize) -> Families {
        Families {
            members: (0..num_of_agents).map(|agent| vec![agent]).collect(),
            agent_to_family: (0..num_of_agents).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[inline]
    pub fn num_of_agents(&self) -> usize {
        self.agent_to_family.len()
    }

    #[inline]
    pub fn family_of(&self, agent: usize) -> usize {
        self.agent_to_family[agent]
    }

    pub fn members(&self, family: usize) -> &[usize] {
        &self.members[family]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.members.iter().map(Vec::as_slice)
    }

    /// Index i gives the family of agent i.
    pub fn agent_to_family(&self) -> &[usize] {
        &self.agent_to_family
    }
}
