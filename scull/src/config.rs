//! Load-time configuration
//!
//! The equivalent of module parameters: how many devices to create and the
//! initial tunables. Values come from JSON (all fields optional) and can be
//! overridden from the environment.

use serde::{Deserialize, Serialize};

use crate::geometry::{Geometry, SCULL_QSET, SCULL_QUANTUM};

/// Default number of store devices
pub const SCULL_NR_DEVS: usize = 4;

/// Default number of pipe devices
pub const SCULL_P_NR_DEVS: usize = 4;

/// Default ring size of a pipe device
pub const SCULL_P_BUFFER: usize = 4000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: usize },

    #[error("environment variable {key} is not a number: {value:?}")]
    Env { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScullConfig {
    pub nr_devs: usize,
    pub quantum: usize,
    pub qset: usize,
    pub pipe_nr_devs: usize,
    pub pipe_buffer: usize,
}

impl Default for ScullConfig {
    fn default() -> Self {
        Self {
            nr_devs: SCULL_NR_DEVS,
            quantum: SCULL_QUANTUM,
            qset: SCULL_QSET,
            pipe_nr_devs: SCULL_P_NR_DEVS,
            pipe_buffer: SCULL_P_BUFFER,
        }
    }
}

impl ScullConfig {
    /// Parse JSON from `reader`; absent fields keep their defaults.
    ///
    /// # Errors
    ///
    /// - `Io`/`Parse` if the input cannot be read or is not valid JSON
    ///   for this struct (unknown fields are rejected).
    /// - `Invalid` if a value fails [`ScullConfig::validate`].
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `SCULL_*` environment variables
    ///
    /// # Errors
    ///
    /// `Env` for a non-numeric variable, `Invalid` from validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env()
    }

    /// Apply `SCULL_NR_DEVS`, `SCULL_QUANTUM`, `SCULL_QSET`,
    /// `SCULL_P_NR_DEVS` and `SCULL_P_BUFFER` on top of `self`.
    ///
    /// # Errors
    ///
    /// `Env` for a non-numeric variable, `Invalid` from validation.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_vars(|key| std::env::var(key).ok())
    }

    fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let fields: [(&'static str, &mut usize); 5] = [
            ("SCULL_NR_DEVS", &mut self.nr_devs),
            ("SCULL_QUANTUM", &mut self.quantum),
            ("SCULL_QSET", &mut self.qset),
            ("SCULL_P_NR_DEVS", &mut self.pipe_nr_devs),
            ("SCULL_P_BUFFER", &mut self.pipe_buffer),
        ];
        for (key, field) in fields {
            if let Some(value) = lookup(key) {
                match value.trim().parse() {
                    Ok(parsed) => *field = parsed,
                    Err(_) => return Err(ConfigError::Env { key, value }),
                }
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// # Errors
    ///
    /// `Invalid` for a zero tunable, a node span that overflows, or a pipe
    /// buffer too small to hold a single byte.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quantum == 0 {
            return Err(ConfigError::Invalid {
                key: "quantum",
                value: self.quantum,
            });
        }
        if Geometry::new(self.quantum, self.qset).is_err() {
            return Err(ConfigError::Invalid {
                key: "qset",
                value: self.qset,
            });
        }
        if self.pipe_buffer < 2 {
            return Err(ConfigError::Invalid {
                key: "pipe_buffer",
                value: self.pipe_buffer,
            });
        }
        Ok(())
    }

    /// Initial geometry of every store device
    ///
    /// # Errors
    ///
    /// `Invalid` if the tunables do not form a geometry.
    pub fn geometry(&self) -> Result<Geometry, ConfigError> {
        Geometry::new(self.quantum, self.qset).map_err(|_| ConfigError::Invalid {
            key: "quantum",
            value: self.quantum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [("SCULL_QUANTUM", "16"), ("SCULL_P_BUFFER", " 32 ")]
            .into_iter()
            .collect();
        let config = ScullConfig::default()
            .with_vars(|key| vars.get(key).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.quantum, 16);
        assert_eq!(config.pipe_buffer, 32);
        assert_eq!(config.qset, SCULL_QSET);
    }

    #[test]
    fn test_env_garbage_rejected() {
        let err = ScullConfig::default()
            .with_vars(|key| (key == "SCULL_QSET").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: "SCULL_QSET", .. }));
    }

    #[test]
    fn test_env_zero_rejected_by_validation() {
        let err = ScullConfig::default()
            .with_vars(|key| (key == "SCULL_QUANTUM").then(|| "0".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "quantum", .. }));
    }
}
