//! Runtime settings derived from the central configuration
//!
//! Turns the `[mcts]` and `[data]` sections into search configs, the
//! temperature schedule and concrete agents.

use engine_config::{AgentSpec, AgentVariant, CentralConfig, ConfigError};
use engine_core::Game;
use std::time::Duration;

use crate::agent::Agent;
use crate::botzone::BotzoneBot;
use crate::episode::TemperatureSchedule;

/// Search parameters for self-play from `[mcts]`.
pub fn search_config(config: &engine_config::MctsConfig) -> mcts::MctsConfig {
    mcts::MctsConfig {
        iterations: config.iteration_limit(),
        time_budget: config.time_limit(),
        c_puct: config.c_puct as f32,
        dirichlet_alpha: config.dirichlet_alpha as f32,
        dirichlet_epsilon: config.dirichlet_epsilon as f32,
        temperature: config.temperature as f32,
    }
}

/// Search parameters for promotion-gate games: same budget, no noise.
pub fn evaluation_search_config(config: &engine_config::MctsConfig) -> mcts::MctsConfig {
    mcts::MctsConfig {
        dirichlet_alpha: 0.0,
        dirichlet_epsilon: 0.0,
        temperature: 0.0,
        ..search_config(config)
    }
}

pub fn temperature_schedule(config: &engine_config::MctsConfig) -> TemperatureSchedule {
    TemperatureSchedule {
        initial: config.temperature as f32,
        late: config.late_temperature as f32,
        threshold_moves: config.temp_threshold,
    }
}

/// Everything needed to build an agent from an [`AgentSpec`].
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub search: mcts::MctsConfig,
    pub reuse_tree: bool,
    pub botzone_timeout: Duration,
}

impl AgentSettings {
    pub fn from_config(config: &CentralConfig) -> Self {
        Self {
            search: search_config(&config.mcts),
            reuse_tree: config.mcts.reuse_tree,
            botzone_timeout: config.data.botzone_timeout(),
        }
    }
}

/// The configured agent list; an empty list means learned self-play.
pub fn resolve_agents(specs: &[AgentSpec]) -> Vec<AgentSpec> {
    if specs.is_empty() {
        vec![AgentSpec {
            variant: AgentVariant::AlphaZero,
            args: Vec::new(),
        }]
    } else {
        specs.to_vec()
    }
}

/// Build one agent. `AlphaZero` agents start unbound; the worker binds the
/// current model before each episode.
pub fn build_agent<G: Game>(
    spec: &AgentSpec,
    settings: &AgentSettings,
) -> Result<Agent<G>, ConfigError> {
    Ok(match spec.variant {
        AgentVariant::Random => Agent::random(),
        AgentVariant::Botzone => {
            let (program, extra) = spec.args.split_first().ok_or_else(|| {
                ConfigError::Invalid("botzone agent needs an executable".into())
            })?;
            Agent::botzone(BotzoneBot::new(
                program,
                extra.to_vec(),
                settings.botzone_timeout,
            ))
        }
        AgentVariant::DefaultMcts => {
            let seed = match spec.args.first() {
                Some(raw) => raw.parse::<u64>().map_err(|_| {
                    ConfigError::Invalid(format!("rollout seed {:?} is not an integer", raw))
                })?,
                None => 0,
            };
            Agent::default_mcts(seed, settings.search.clone(), settings.reuse_tree)
        }
        AgentVariant::AlphaZero => Agent::alpha_zero(settings.search.clone(), settings.reuse_tree),
    })
}

/// Build the full agent list for one worker.
pub fn build_agents<G: Game>(
    specs: &[AgentSpec],
    settings: &AgentSettings,
) -> Result<Vec<Agent<G>>, ConfigError> {
    resolve_agents(specs)
        .iter()
        .map(|spec| build_agent(spec, settings))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use games_gomoku::Gomoku;

    fn spec(variant: AgentVariant, args: &[&str]) -> AgentSpec {
        AgentSpec {
            variant,
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_search_config_from_defaults() {
        let central = CentralConfig::default();
        let search = search_config(&central.mcts);
        assert_eq!(search.iterations, Some(400));
        assert_eq!(search.time_budget, Some(Duration::from_millis(950)));
        assert_eq!(search.c_puct, 5.0);
        assert!(search.validate().is_ok());

        let eval = evaluation_search_config(&central.mcts);
        assert_eq!(eval.dirichlet_alpha, 0.0);
        assert_eq!(eval.temperature, 0.0);
        assert_eq!(eval.iterations, Some(400));
    }

    #[test]
    fn test_zero_limits_disable_budgets() {
        let mut central = CentralConfig::default();
        central.mcts.c_iterations = 0;
        let search = search_config(&central.mcts);
        assert_eq!(search.iterations, None);
        assert!(search.time_budget.is_some());
    }

    #[test]
    fn test_temperature_schedule_from_config() {
        let central = CentralConfig::default();
        let schedule = temperature_schedule(&central.mcts);
        assert_eq!(schedule.at(0), 1.0);
        assert_eq!(schedule.at(30), 0.0);
    }

    #[test]
    fn test_empty_agent_list_means_self_play() {
        let resolved = resolve_agents(&[]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].variant, AgentVariant::AlphaZero);
    }

    #[test]
    fn test_build_agents() {
        let settings = AgentSettings::from_config(&CentralConfig::default());
        let agents: Vec<Agent<Gomoku>> = build_agents(
            &[
                spec(AgentVariant::Random, &[]),
                spec(AgentVariant::Botzone, &["./bot", "--fast"]),
                spec(AgentVariant::DefaultMcts, &["9"]),
                spec(AgentVariant::AlphaZero, &[]),
            ],
            &settings,
        )
        .unwrap();

        assert_eq!(agents[0].name(), "random");
        assert_eq!(agents[1].name(), "botzone:./bot");
        assert!(matches!(agents[2], Agent::DefaultMcts(_)));
        assert!(agents[3].is_learned());
    }

    #[test]
    fn test_build_agent_rejects_bad_args() {
        let settings = AgentSettings::from_config(&CentralConfig::default());
        assert!(build_agent::<Gomoku>(&spec(AgentVariant::Botzone, &[]), &settings).is_err());
        assert!(
            build_agent::<Gomoku>(&spec(AgentVariant::DefaultMcts, &["x"]), &settings).is_err()
        );
    }
}
