// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for lander-server.
//!
//! Config is loaded from the `[lander-server]` section of `lander.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./lander.toml`
//! 3. `~/.config/lander/lander.toml`
//! 4. `/etc/lander/lander.toml`

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use lander_app::ConfigFile;
use lander_backend::SimConfig;
use lander_core::policies::{
    ACTION_SERVER_TIMEOUT, ACTION_TIMEOUT, ANGLE_TOLERANCE_DEG, PAN_TILT_TIMEOUT,
};
use lander_core::{BackendUnavailablePolicy, LanderPolicies};

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub general: GeneralConfig,
    pub backend: BackendConfig,
    /// Completion timeouts and failure handling
    pub behavior: BehaviorConfig,
    /// TCP listener configuration
    pub listen: ListenConfig,
    /// Simulated backend parameters
    pub sim: SimConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend name (e.g. "sim")
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub action_timeout_secs: u64,
    pub pan_tilt_timeout_secs: u64,
    /// Time allowed for each action server to connect at startup
    pub server_timeout_secs: u64,
    pub angle_tolerance_deg: f64,
    /// `roll_back` or `leave_running`
    pub on_backend_unavailable: BackendUnavailablePolicy,
    pub report_action_failures: bool,
    /// How long shutdown waits for in-flight operations
    pub shutdown_grace_ms: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            action_timeout_secs: ACTION_TIMEOUT.as_secs(),
            pan_tilt_timeout_secs: PAN_TILT_TIMEOUT.as_secs(),
            server_timeout_secs: ACTION_SERVER_TIMEOUT.as_secs(),
            angle_tolerance_deg: ANGLE_TOLERANCE_DEG,
            on_backend_unavailable: BackendUnavailablePolicy::default(),
            report_action_failures: false,
            shutdown_grace_ms: 3000,
        }
    }
}

impl BehaviorConfig {
    pub fn policies(&self) -> LanderPolicies {
        LanderPolicies {
            action_timeout: Duration::from_secs(self.action_timeout_secs),
            pan_tilt_timeout: Duration::from_secs(self.pan_tilt_timeout_secs),
            server_timeout: Duration::from_secs(self.server_timeout_secs),
            angle_tolerance_deg: self.angle_tolerance_deg,
            on_backend_unavailable: self.on_backend_unavailable,
            report_action_failures: self.report_action_failures,
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// TCP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub enabled: bool,
    /// IP address to listen on
    pub listen: IpAddr,
    /// TCP port to listen on
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 4540,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        if self.behavior.action_timeout_secs == 0 {
            return Err("[behavior].action_timeout_secs must be > 0".to_string());
        }
        if self.behavior.pan_tilt_timeout_secs == 0 {
            return Err("[behavior].pan_tilt_timeout_secs must be > 0".to_string());
        }
        if self.behavior.server_timeout_secs == 0 {
            return Err("[behavior].server_timeout_secs must be > 0".to_string());
        }
        let tolerance = self.behavior.angle_tolerance_deg;
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err("[behavior].angle_tolerance_deg must be a positive number".to_string());
        }

        if self.listen.enabled && self.listen.port == 0 {
            return Err("[listen].port must be > 0 when listener is enabled".to_string());
        }

        if self.sim.action_duration_ms == 0 {
            return Err("[sim].action_duration_ms must be > 0".to_string());
        }
        if self.sim.joint_state_interval_ms == 0 {
            return Err("[sim].joint_state_interval_ms must be > 0".to_string());
        }
        if !self.sim.slew_rate_deg_s.is_finite() || self.sim.slew_rate_deg_s <= 0.0 {
            return Err("[sim].slew_rate_deg_s must be a positive number".to_string());
        }
        Ok(())
    }

    /// Generate an example configuration wrapped under the `[lander-server]`
    /// section header, suitable for use in a combined `lander.toml` file.
    pub fn example_combined_toml() -> String {
        #[derive(Serialize)]
        struct Wrapper {
            #[serde(rename = "lander-server")]
            inner: ServerConfig,
        }
        let example = ServerConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            backend: BackendConfig {
                name: Some("sim".to_string()),
            },
            ..ServerConfig::default()
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "lander-server"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.backend.name.is_none());
        assert_eq!(config.behavior.action_timeout_secs, 180);
        assert_eq!(config.behavior.pan_tilt_timeout_secs, 5);
        assert_eq!(
            config.behavior.on_backend_unavailable,
            BackendUnavailablePolicy::RollBack
        );
        assert!(!config.behavior.report_action_failures);
        assert!(config.listen.enabled);
        assert_eq!(config.listen.port, 4540);
        assert_eq!(config.sim.action_duration_ms, 2000);
        assert!(config.validate().is_ok());
        assert_eq!(config.behavior.policies(), LanderPolicies::default());
    }

    #[test]
    fn test_parse_behavior_section() {
        let toml_str = r#"
[lander-server.behavior]
action_timeout_secs = 60
on_backend_unavailable = "leave_running"
report_action_failures = true

[lander-server.sim]
disconnected = ["Grind"]
"#;
        let config = ServerConfig::load_from_str(toml_str).unwrap();
        let policies = config.behavior.policies();
        assert_eq!(policies.action_timeout, Duration::from_secs(60));
        assert_eq!(policies.pan_tilt_timeout, Duration::from_secs(5));
        assert_eq!(
            policies.on_backend_unavailable,
            BackendUnavailablePolicy::LeaveRunning
        );
        assert!(policies.report_action_failures);
        assert_eq!(config.sim.disconnected, vec!["Grind".to_string()]);
        assert_eq!(config.sim.slew_rate_deg_s, 15.0);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let toml_str = r#"
[lander-server.behavior]
on_backend_unavailable = "retry"
"#;
        assert!(ServerConfig::load_from_str(toml_str).is_err());
    }

    #[test]
    fn test_example_combined_toml_parses() {
        let example = ServerConfig::example_combined_toml();
        assert!(example.contains("[lander-server"));
        let config = ServerConfig::load_from_str(&example).unwrap();
        assert_eq!(config.backend.name.as_deref(), Some("sim"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.general.log_level = Some("verbose".to_string());
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.behavior.angle_tolerance_deg = 0.0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.behavior.pan_tilt_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.listen.port = 0;
        assert!(config.validate().is_err());
        config.listen.enabled = false;
        assert!(config.validate().is_ok());
    }
}
