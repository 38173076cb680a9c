use serde::{Deserialize, Serialize};

/// Knobs consumed by the cost models when pricing flow-network arcs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Upper bound for the randomized arc-cost ranges.
    pub flow_max_arc_cost: i64,
    /// Number of preference arcs produced per aggregator query.
    /// Must not exceed the number of known leaf resources.
    pub num_pref_arcs_task_to_res: usize,
    /// Leaf resources per rack bucket.
    pub machines_per_rack: usize,
    /// Tolerance (%) on the block count when sampling task input files.
    pub percent_tolerance: u32,
    /// Seed for the cost-model PRNG; fixed seeds give reproducible rounds.
    pub cost_model_seed: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            flow_max_arc_cost: 100_000,
            num_pref_arcs_task_to_res: 10,
            machines_per_rack: 40,
            percent_tolerance: 50,
            cost_model_seed: 42,
        }
    }
}

/// Knobs for the engine's executor plumbing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Wall-clock cap for a locally-spawned task, 0 = unbounded.
    pub local_task_timeout_ms: u64,
    /// When a task binary cannot be spawned, run a synthetic placeholder
    /// instead of failing (simulation mode).
    pub simulate_missing_binaries: bool,
    /// Duration of the synthetic placeholder.
    pub simulated_runtime_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local_task_timeout_ms: 300_000,
            simulate_missing_binaries: true,
            simulated_runtime_ms: 10,
        }
    }
}

/// Top-level configuration aggregating all sub-configs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlowgridConfig {
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Load configuration from a TOML file.
/// Falls back to defaults if the file doesn't exist or fails to parse.
pub fn load_config(path: &str) -> FlowgridConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("Failed to parse config {}: {}, using defaults", path, e);
                FlowgridConfig::default()
            }
        },
        Err(_) => {
            tracing::debug!("Config file {} not found, using defaults", path);
            FlowgridConfig::default()
        }
    }
}

/// Save configuration to a TOML file.
/// Creates parent directories if they don't exist.
pub fn save_config(config: &FlowgridConfig, path: &str) -> anyhow::Result<()> {
    let path = std::path::Path::new(path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    tracing::info!("Config saved to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = SchedulingConfig::default();
        assert!(cfg.flow_max_arc_cost > 0);
        assert!(cfg.percent_tolerance <= 100);
        assert!(cfg.machines_per_rack > 0);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let cfg = FlowgridConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: FlowgridConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.scheduling.flow_max_arc_cost, cfg.scheduling.flow_max_arc_cost);
        assert_eq!(back.engine.simulate_missing_binaries, cfg.engine.simulate_missing_binaries);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_config("/nonexistent/flowgrid.toml");
        assert_eq!(cfg.scheduling.machines_per_rack, SchedulingConfig::default().machines_per_rack);
    }
}
