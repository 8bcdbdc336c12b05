use crate::error::{Result, SchedError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Startup configuration for the round-robin scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedConfig {
    /// Number of virtual CPUs
    pub cpus: usize,
    /// Per-core IPC weights, one unsigned decimal integer per line
    pub ipc_path: PathBuf,
    /// Kick timer period (ms)
    pub kick_period_ms: u64,
    /// Size quanta from the global instruction budget
    pub instruction_timing: bool,
    /// Upper bound on the instructions granted per round (0 = no cap)
    pub switch_period: u64,
    /// Cycles between checkpoint callbacks (0 = disabled)
    pub checkpoint_period: u64,
    /// Allow the guest-visible budget operations
    pub quantum_accounting: bool,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            cpus: 1,
            ipc_path: PathBuf::from("ipc.txt"),
            kick_period_ms: 100,
            instruction_timing: false,
            switch_period: 0,
            checkpoint_period: 0,
            quantum_accounting: true,
        }
    }
}

impl SchedConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: SchedConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cpus == 0 {
            return Err(SchedError::Config("cpus must be at least 1".to_string()));
        }
        if self.kick_period_ms == 0 {
            return Err(SchedError::Config("kick_period_ms must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn kick_period(&self) -> Duration {
        Duration::from_millis(self.kick_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = SchedConfig::from_json_str(r#"{ "cpus": 4, "switch_period": 100 }"#).unwrap();
        assert_eq!(config.cpus, 4);
        assert_eq!(config.switch_period, 100);
        assert_eq!(config.kick_period(), Duration::from_millis(100));
        assert_eq!(config.ipc_path, PathBuf::from("ipc.txt"));
        assert!(config.quantum_accounting);
        assert!(!config.instruction_timing);
    }

    #[test]
    fn rejects_zero_cpus_and_zero_kick_period() {
        assert!(matches!(
            SchedConfig::from_json_str(r#"{ "cpus": 0 }"#),
            Err(SchedError::Config(_))
        ));
        assert!(matches!(
            SchedConfig::from_json_str(r#"{ "kick_period_ms": 0 }"#),
            Err(SchedError::Config(_))
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            SchedConfig::from_json_str("{ cpus: "),
            Err(SchedError::ConfigParse(_))
        ));
    }
}
