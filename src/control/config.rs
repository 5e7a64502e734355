//! Bridge configuration loaded from `config.toml`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge::OverlayMode;
use crate::radio::{DEFAULT_TX_POWER_DBM, PhyMode};
use crate::simulation::ClockMode;

/// How every link in a scene is bridged and when it runs.
///
/// ```toml
/// exec-path = "./node"
/// mode = "MACPHYOVERLAY"
/// start-offset-ms = 0
/// stop-offset-ms = 10000
/// clock = "realtime"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BridgeConfig {
    /// Executable for nodes whose scene entry has no `exec_path`.
    pub exec_path: Option<PathBuf>,
    pub mode: OverlayMode,
    pub phy_mode: PhyMode,
    pub tx_power_dbm: f64,
    /// Simulated time at which the first link starts.
    pub start_offset_ms: u64,
    /// Simulated time at which every link stops. `None` keeps links running.
    pub stop_offset_ms: Option<u64>,
    /// Extra start delay added per node, in scene order.
    pub stagger_ms: u64,
    pub clock: ClockMode,
    /// Realtime pacing, 100 = wall-clock speed.
    pub speed_percent: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            exec_path: None,
            mode: OverlayMode::Unset,
            phy_mode: PhyMode::default(),
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            start_offset_ms: 0,
            stop_offset_ms: None,
            stagger_ms: 0,
            clock: ClockMode::default(),
            speed_percent: 100,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    ///
    /// Relative `exec-path`s are resolved against the config file's directory.
    pub fn load(config_path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(config_path).map_err(|e| format!("Failed to read config file: {}", e))?;

        let mut config = Self::parse(&content)?;
        if let (Some(exec), Some(parent)) = (config.exec_path.as_mut(), config_path.parent()) {
            if exec.is_relative() {
                *exec = parent.join(&*exec);
            }
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let config: BridgeConfig = toml::from_str(content).map_err(|e| format!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if !self.tx_power_dbm.is_finite() {
            return Err(format!("Invalid tx-power-dbm {}", self.tx_power_dbm));
        }
        if self.speed_percent == 0 {
            return Err("speed-percent must be positive".to_string());
        }
        if let Some(stop) = self.stop_offset_ms {
            if stop < self.start_offset_ms {
                return Err(format!("stop-offset-ms {} precedes start-offset-ms {}", stop, self.start_offset_ms));
            }
        }
        Ok(())
    }

    /// Derive the config path from a scene file path.
    ///
    /// Replaces the scene filename with "config.toml" in the same directory.
    pub fn config_path_from_scene(scene_path: &str) -> PathBuf {
        let scene = Path::new(scene_path);
        scene.parent().unwrap_or(Path::new(".")).join("config.toml")
    }

    /// Start delay of the `index`-th node.
    pub fn start_delay(&self, index: usize) -> Duration {
        Duration::from_millis(self.start_offset_ms) + Duration::from_millis(self.stagger_ms) * index as u32
    }

    pub fn stop_delay(&self) -> Option<Duration> {
        self.stop_offset_ms.map(Duration::from_millis)
    }

    /// Check that every one of `node_count` staggered starts happens before the stop.
    pub fn check_schedule(&self, node_count: usize) -> Result<(), String> {
        let (Some(stop), Some(last)) = (self.stop_delay(), node_count.checked_sub(1)) else {
            return Ok(());
        };
        let last_start = self.start_delay(last);
        if last_start > stop {
            return Err(format!(
                "node {} of {} would start at {:?}, after stop-offset-ms {}",
                last, node_count, last_start, self.stop_offset_ms.unwrap_or_default()
            ));
        }
        Ok(())
    }
}
