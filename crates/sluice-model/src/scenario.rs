//! Scenario dimensions and combinations
//!
//! A run is evaluated over the cartesian product of its scenario
//! dimensions. Each combination carries a stable global id used as the
//! column index into every recorder buffer.

/// A named scenario dimension with a fixed member count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    /// Dimension name (e.g. "inflow")
    pub name: String,
    /// Number of members in this dimension
    pub size: usize,
}

impl Scenario {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// One combination of member indices across all scenario dimensions.
///
/// `global_id` is the position of this combination in the cartesian
/// product, counted with the last dimension varying fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioIndex {
    /// Position in the cartesian product
    pub global_id: usize,
    /// Member index per dimension, in dimension declaration order
    pub indices: Vec<usize>,
}

/// The full set of scenario combinations for a run.
#[derive(Debug, Clone, Default)]
pub struct ScenarioDomain {
    scenarios: Vec<Scenario>,
    combinations: Vec<ScenarioIndex>,
}

impl ScenarioDomain {
    /// Build the cartesian product of the given dimensions.
    ///
    /// With no dimensions the domain still has one combination (a single
    /// unnamed run), so buffers are never zero-width.
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        let total: usize = scenarios.iter().map(|s| s.size.max(1)).product();
        let mut combinations = Vec::with_capacity(total);
        for global_id in 0..total {
            let mut remainder = global_id;
            let mut indices = vec![0usize; scenarios.len()];
            // Last dimension varies fastest
            for (pos, scenario) in scenarios.iter().enumerate().rev() {
                let size = scenario.size.max(1);
                indices[pos] = remainder % size;
                remainder /= size;
            }
            combinations.push(ScenarioIndex {
                global_id,
                indices,
            });
        }
        Self {
            scenarios,
            combinations,
        }
    }

    /// A domain with a single combination and no named dimensions.
    pub fn single() -> Self {
        Self::new(Vec::new())
    }

    /// Number of scenario combinations.
    pub fn len(&self) -> usize {
        self.combinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }

    /// All combinations in global-id order.
    pub fn combinations(&self) -> &[ScenarioIndex] {
        &self.combinations
    }

    /// The declared dimensions, in declaration order.
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Position of a named dimension, if declared.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.scenarios.iter().position(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_domain() {
        let domain = ScenarioDomain::single();
        assert_eq!(domain.len(), 1);
        assert_eq!(domain.combinations()[0].global_id, 0);
        assert!(domain.combinations()[0].indices.is_empty());
    }

    #[test]
    fn test_cartesian_product_order() {
        let domain = ScenarioDomain::new(vec![
            Scenario::new("a", 2),
            Scenario::new("b", 3),
        ]);
        assert_eq!(domain.len(), 6);

        // Last dimension varies fastest
        let expected = [
            vec![0, 0],
            vec![0, 1],
            vec![0, 2],
            vec![1, 0],
            vec![1, 1],
            vec![1, 2],
        ];
        for (i, combo) in domain.combinations().iter().enumerate() {
            assert_eq!(combo.global_id, i);
            assert_eq!(combo.indices, expected[i]);
        }
    }

    #[test]
    fn test_position_of() {
        let domain = ScenarioDomain::new(vec![
            Scenario::new("inflow", 4),
            Scenario::new("demand", 2),
        ]);
        assert_eq!(domain.position_of("demand"), Some(1));
        assert_eq!(domain.position_of("missing"), None);
    }
}
