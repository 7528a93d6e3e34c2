use crate::core::get_config_dir;
use crate::core::vm::VmSpec;
use crate::core::SimTime;
use serde::Deserialize;
use std::path::PathBuf;

/// A single-VM scenario: the VM, when it runs, and what is submitted to it.
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioConfig {
    pub vm: VmSpec,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ScheduleConfig {
    /// When the launch is requested (billing starts here)
    #[serde(default)]
    pub launch_at: SimTime,
    /// When the terminate is requested; the VM runs until every job is done if unset
    #[serde(default)]
    pub terminate_at: Option<SimTime>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct JobConfig {
    /// Instructions to execute
    pub size: u64,
    /// Submission time; defaults to the moment the VM becomes ready
    #[serde(default)]
    pub submit_at: Option<SimTime>,
    /// Submit this many identical jobs
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

pub fn load_config(config_path: Option<&PathBuf>) -> Result<ScenarioConfig, config::ConfigError> {
    let mut config_vec = vec![];

    // User-provided config file
    if let Some(config_path) = config_path {
        if config_path.exists() {
            config_vec.push(config_path.clone());
        } else {
            return Err(config::ConfigError::NotFound(format!(
                "Config file {config_path:?} does not exist",
            )));
        }
    } else if let Ok(default_config_path) = get_config_dir().map(|d| d.join("vmsim.toml")) {
        // Default config file
        if default_config_path.exists() {
            config_vec.push(default_config_path);
        }
    }

    let settings = config::Config::builder();
    let settings = config_vec.iter().fold(settings, |s, path| {
        s.add_source(config::File::from(path.as_path()))
    });

    settings
        .add_source(
            config::Environment::with_prefix("VMSIM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_load_config() {
        let file = write_config(
            r#"
[vm]
mips = 1000
cores = 2
bandwidth = 12.5
price = 0.1
provisioning_delay = 0.0

[schedule]
launch_at = 5.0
terminate_at = 7200.0

[[jobs]]
size = 1000
submit_at = 10.0

[[jobs]]
size = 500
count = 3
"#,
        );
        let config = load_config(Some(&file.path().to_path_buf())).unwrap();

        assert_eq!(config.vm.mips, 1000);
        assert_eq!(config.vm.cores, 2);
        assert_eq!(config.vm.bandwidth, 12.5);
        assert_eq!(config.vm.provisioning_delay, 0.0);
        assert_eq!(
            config.vm.deprovisioning_delay,
            crate::core::DEFAULT_DEPROVISIONING_DELAY
        );
        assert_eq!(config.schedule.launch_at, 5.0);
        assert_eq!(config.schedule.terminate_at, Some(7200.0));
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs[0].submit_at, Some(10.0));
        assert_eq!(config.jobs[0].count, 1);
        assert_eq!(config.jobs[1].submit_at, None);
        assert_eq!(config.jobs[1].count, 3);
    }

    #[test]
    fn test_load_config_defaults() {
        let file = write_config("[vm]\nmips = 250\n");
        let config = load_config(Some(&file.path().to_path_buf())).unwrap();

        assert_eq!(config.vm.cores, 1);
        assert_eq!(config.vm.price, 0.0);
        assert_eq!(
            config.vm.provisioning_delay,
            crate::core::DEFAULT_PROVISIONING_DELAY
        );
        assert_eq!(config.schedule.launch_at, 0.0);
        assert!(config.schedule.terminate_at.is_none());
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_load_config_not_found() {
        let config = load_config(Some(&PathBuf::from("/tmp/does-not-exist-vmsim.toml")));
        assert!(config.is_err());
    }
}
