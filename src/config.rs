// Layered: compiled-in defaults, an optional TOML file (confy's per-OS config
// directory, or an explicit path), then REPOSPACE__<SECTION>__<KEY> env overrides.

use serde::{Deserialize, Serialize};

use crate::ordering::{self, OrderingStrategy};

const ENV_PREFIX: &str = "REPOSPACE";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SchedulerSettings {
    pub learning_step_minutes: Vec<i64>,
    pub relearning_step_minutes: Vec<i64>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings { learning_step_minutes: vec![1, 10], relearning_step_minutes: vec![10] }
    }
}

impl SchedulerSettings {
    pub fn step_tables(&self) -> crate::scheduler::StepTables<'_> {
        crate::scheduler::StepTables {
            learning_minutes: &self.learning_step_minutes,
            relearning_minutes: &self.relearning_step_minutes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkspaceSettings {
    pub snapshot_concurrency: usize,
    pub default_extra_ignore_patterns: Vec<String>,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        WorkspaceSettings { snapshot_concurrency: 16, default_extra_ignore_patterns: Vec::new() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultOrdering {
    NewFirstByDueDate,
    DueFirstByDueDate,
    NewFirstShuffled,
    NewFirstFileOrder,
    Shuffled,
}

impl Default for DefaultOrdering {
    fn default() -> Self {
        DefaultOrdering::Shuffled
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QueueSettings {
    pub default_ordering: DefaultOrdering,
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings { default_ordering: DefaultOrdering::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkspaceConfig {
    pub scheduler: SchedulerSettings,
    pub workspace: WorkspaceSettings,
    pub queue: QueueSettings,
}

impl WorkspaceConfig {
    pub fn load(file_path: Option<&std::path::Path>) -> Result<WorkspaceConfig, ::config::ConfigError> {
        let defaults = WorkspaceConfig::default();
        let defaults_value = ::config::Config::try_from(&defaults)?;

        let mut builder = ::config::Config::builder().add_source(defaults_value);

        match file_path {
            Some(path) if path.exists() => {
                builder = builder.add_source(::config::File::from(path).required(false));
            }
            Some(_) => {}
            None => {
                if let Ok(loaded) = load_from_confy_path() {
                    let confy_value = ::config::Config::try_from(&loaded)?;
                    builder = builder.add_source(confy_value);
                }
            }
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR).try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn default_ordering_strategy(&self, rng: rand::rngs::SmallRng) -> OrderingStrategy {
        Self::strategy_for(self.queue.default_ordering, rng)
    }

    pub fn default_ordering_strategy_for(&self, named: DefaultOrdering, rng: rand::rngs::SmallRng) -> OrderingStrategy {
        Self::strategy_for(named, rng)
    }

    fn strategy_for(named: DefaultOrdering, rng: rand::rngs::SmallRng) -> OrderingStrategy {
        match named {
            DefaultOrdering::NewFirstByDueDate => ordering::new_first_by_due_date(),
            DefaultOrdering::DueFirstByDueDate => ordering::due_first_by_due_date(),
            DefaultOrdering::NewFirstShuffled => ordering::new_first_shuffled(rng),
            DefaultOrdering::NewFirstFileOrder => ordering::new_first_file_order(),
            DefaultOrdering::Shuffled => ordering::shuffled_ordering(rng),
        }
    }
}

fn load_from_confy_path() -> Result<WorkspaceConfig, confy::ConfyError> {
    confy::load("repospace", Some("config"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_step_tables() {
        let config = WorkspaceConfig::default();
        assert_eq!(config.scheduler.learning_step_minutes, vec![1, 10]);
        assert_eq!(config.scheduler.relearning_step_minutes, vec![10]);
        assert_eq!(config.workspace.snapshot_concurrency, 16);
    }

    #[test]
    fn step_tables_borrows_this_configs_own_vectors() {
        let mut config = WorkspaceConfig::default();
        config.scheduler.learning_step_minutes = vec![2, 20, 60];
        let tables = config.scheduler.step_tables();
        assert_eq!(tables.learning_minutes, &[2, 20, 60]);
        assert_eq!(tables.relearning_minutes, &[10]);
    }

    #[test]
    fn load_without_a_file_or_env_overrides_yields_defaults() {
        let config = WorkspaceConfig::load(Some(std::path::Path::new("/nonexistent/repospace.toml"))).unwrap();
        assert_eq!(config, WorkspaceConfig::default());
    }
}
