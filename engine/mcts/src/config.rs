//! MCTS configuration parameters.

use std::time::Duration;

use crate::search::SearchError;

/// Configuration for Monte Carlo Tree Search.
#[derive(Debug, Clone)]
pub struct MctsConfig {
    /// Maximum number of iterations per search. Expanding the root counts
    /// as the first iteration.
    pub iterations: Option<u32>,

    /// Wall-clock budget per search.
    /// At least one of `iterations` and `time_budget` must be set.
    pub time_budget: Option<Duration>,

    /// Exploration constant for the UCB formula.
    /// Higher values favour the prior over the backed-up value.
    pub c_puct: f32,

    /// Dirichlet noise alpha for root exploration.
    /// Set to 0.0 to disable noise (evaluation/inference).
    pub dirichlet_alpha: f32,

    /// Fraction of each root prior replaced by noise.
    pub dirichlet_epsilon: f32,

    /// Temperature applied to root visit counts.
    /// 1.0 = proportional to visits, below 1e-6 = arg-max.
    pub temperature: f32,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            iterations: Some(400),
            time_budget: Some(Duration::from_millis(950)),
            c_puct: 5.0,
            dirichlet_alpha: 0.3,
            dirichlet_epsilon: 0.25,
            temperature: 1.0,
        }
    }
}

impl MctsConfig {
    /// Create config for self-play (with exploration noise).
    pub fn for_training() -> Self {
        Self::default()
    }

    /// Create config for evaluation games (no noise, greedy selection).
    pub fn for_evaluation() -> Self {
        Self {
            dirichlet_alpha: 0.0,
            dirichlet_epsilon: 0.0,
            temperature: 0.0,
            ..Self::default()
        }
    }

    /// Create a fast, fully deterministic config for testing.
    pub fn for_testing() -> Self {
        Self {
            iterations: Some(50),
            time_budget: None,
            c_puct: 5.0,
            dirichlet_alpha: 0.0,
            dirichlet_epsilon: 0.0,
            temperature: 0.0,
        }
    }

    /// Builder pattern: set the iteration budget.
    pub fn with_iterations(mut self, n: u32) -> Self {
        self.iterations = Some(n);
        self
    }

    /// Builder pattern: set or clear the wall-clock budget.
    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.time_budget = budget;
        self
    }

    /// Builder pattern: set c_puct exploration constant.
    pub fn with_c_puct(mut self, c: f32) -> Self {
        self.c_puct = c;
        self
    }

    /// Builder pattern: set temperature.
    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    /// Builder pattern: set root Dirichlet noise.
    pub fn with_dirichlet(mut self, alpha: f32, epsilon: f32) -> Self {
        self.dirichlet_alpha = alpha;
        self.dirichlet_epsilon = epsilon;
        self
    }

    /// Check the limits and constants before a search starts.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.iterations.is_none() && self.time_budget.is_none() {
            return Err(SearchError::Config(
                "either an iteration or a time budget is required".into(),
            ));
        }
        if self.iterations == Some(0) {
            return Err(SearchError::Config("iterations must be positive".into()));
        }
        if self.time_budget == Some(Duration::ZERO) {
            return Err(SearchError::Config("time budget must be positive".into()));
        }
        if !self.c_puct.is_finite() || self.c_puct < 0.0 {
            return Err(SearchError::Config(format!(
                "c_puct must be non-negative, got {}",
                self.c_puct
            )));
        }
        if self.dirichlet_alpha < 0.0 || !(0.0..=1.0).contains(&self.dirichlet_epsilon) {
            return Err(SearchError::Config(format!(
                "invalid Dirichlet noise (alpha={}, epsilon={})",
                self.dirichlet_alpha, self.dirichlet_epsilon
            )));
        }
        if self.temperature < 0.0 || !self.temperature.is_finite() {
            return Err(SearchError::Config(format!(
                "temperature must be non-negative, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MctsConfig::default();
        assert_eq!(config.iterations, Some(400));
        assert_eq!(config.time_budget, Some(Duration::from_millis(950)));
        assert!((config.c_puct - 5.0).abs() < 1e-6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = MctsConfig::default()
            .with_iterations(100)
            .with_temperature(0.5)
            .with_time_budget(None);

        assert_eq!(config.iterations, Some(100));
        assert!(config.time_budget.is_none());
        assert!((config.temperature - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_evaluation_config() {
        let config = MctsConfig::for_evaluation();
        assert!((config.dirichlet_alpha).abs() < 1e-6);
        assert!((config.temperature).abs() < 1e-6);
    }

    #[test]
    fn test_validate_requires_a_limit() {
        let mut config = MctsConfig::for_testing();
        config.iterations = None;
        assert!(matches!(config.validate(), Err(SearchError::Config(_))));

        let config = config.with_time_budget(Some(Duration::from_millis(10)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_constants() {
        assert!(MctsConfig::for_testing().with_c_puct(-1.0).validate().is_err());
        assert!(MctsConfig::for_testing()
            .with_dirichlet(0.3, 1.5)
            .validate()
            .is_err());
        assert!(MctsConfig::for_testing().with_iterations(0).validate().is_err());
    }
}
