//! INI configuration file support.
//!
//! ```ini
//! [device]
//! manufacturer = Contoso
//! model = IoTDevice
//! installed_criteria = 1.0.0
//!
//! [capacity]
//! proxy_update_count = 0
//! scratch_size = 2048
//! signature_size = 3072
//!
//! [timeouts]
//! dns_initial = 1
//! dns_retransmit_count = 3
//! http_connect = 30
//! http_download = 300
//!
//! [logging]
//! level = info
//! directory = /var/log/fwagent
//!
//! [keys]
//! file = /etc/fwagent/root_keys.json
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;

use super::{AgentConfig, Timeouts};
use crate::error::{AgentError, AgentResult};
use crate::logging::LoggingConfig;
use crate::verify::RootKeyTable;

/// Default location of the configuration file.
///
/// Returns `None` when the platform has no configuration directory.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fwagent").join("config.ini"))
}

/// Contents of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    /// Agent settings, root keys not yet merged.
    pub agent: AgentConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Extra root key table to trust in addition to the built-in keys.
    pub keys_file: Option<PathBuf>,
}

impl ConfigFile {
    /// Load from the default location, falling back to defaults when absent.
    pub fn load() -> AgentResult<Self> {
        match config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if the file cannot be parsed or a value
    /// has the wrong type.
    pub fn load_from(path: &Path) -> AgentResult<Self> {
        let ini = Ini::load_from_file(path)
            .map_err(|e| AgentError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_ini(&ini)
    }

    /// Parse from INI text.
    pub fn parse(text: &str) -> AgentResult<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| AgentError::Config(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> AgentResult<Self> {
        let defaults = AgentConfig::default();
        let default_timeouts = Timeouts::default();
        let default_logging = LoggingConfig::default();

        let agent = AgentConfig {
            manufacturer: string_or(ini, "device", "manufacturer", &defaults.manufacturer),
            model: string_or(ini, "device", "model", &defaults.model),
            installed_criteria: string_or(
                ini,
                "device",
                "installed_criteria",
                &defaults.installed_criteria,
            ),
            agent_version: string_or(ini, "device", "agent_version", &defaults.agent_version),
            delivery_version: string_or(
                ini,
                "device",
                "delivery_version",
                &defaults.delivery_version,
            ),
            proxy_update_count: parse_or(
                ini,
                "capacity",
                "proxy_update_count",
                defaults.proxy_update_count,
            )?,
            scratch_size: parse_or(ini, "capacity", "scratch_size", defaults.scratch_size)?,
            signature_size: parse_or(ini, "capacity", "signature_size", defaults.signature_size)?,
            timeouts: Timeouts {
                dns_initial: parse_or(ini, "timeouts", "dns_initial", default_timeouts.dns_initial)?,
                dns_retransmit_count: parse_or(
                    ini,
                    "timeouts",
                    "dns_retransmit_count",
                    default_timeouts.dns_retransmit_count,
                )?,
                http_connect: parse_or(
                    ini,
                    "timeouts",
                    "http_connect",
                    default_timeouts.http_connect,
                )?,
                http_download: parse_or(
                    ini,
                    "timeouts",
                    "http_download",
                    default_timeouts.http_download,
                )?,
            },
            root_keys: defaults.root_keys,
        };

        let logging = LoggingConfig {
            level: string_or(ini, "logging", "level", &default_logging.level),
            directory: ini.get_from(Some("logging"), "directory").map(PathBuf::from),
            file_prefix: string_or(ini, "logging", "file_prefix", &default_logging.file_prefix),
        };

        Ok(Self {
            agent,
            logging,
            keys_file: ini.get_from(Some("keys"), "file").map(PathBuf::from),
        })
    }

    /// Write this configuration as INI.
    pub fn save_to(&self, path: &Path) -> AgentResult<()> {
        let mut ini = Ini::new();
        let agent = &self.agent;
        ini.with_section(Some("device"))
            .set("manufacturer", agent.manufacturer.as_str())
            .set("model", agent.model.as_str())
            .set("installed_criteria", agent.installed_criteria.as_str())
            .set("agent_version", agent.agent_version.as_str())
            .set("delivery_version", agent.delivery_version.as_str());
        ini.with_section(Some("capacity"))
            .set("proxy_update_count", agent.proxy_update_count.to_string())
            .set("scratch_size", agent.scratch_size.to_string())
            .set("signature_size", agent.signature_size.to_string());
        ini.with_section(Some("timeouts"))
            .set("dns_initial", agent.timeouts.dns_initial.to_string())
            .set(
                "dns_retransmit_count",
                agent.timeouts.dns_retransmit_count.to_string(),
            )
            .set("http_connect", agent.timeouts.http_connect.to_string())
            .set("http_download", agent.timeouts.http_download.to_string());
        ini.with_section(Some("logging"))
            .set("level", self.logging.level.as_str())
            .set("file_prefix", self.logging.file_prefix.as_str());
        if let Some(dir) = &self.logging.directory {
            ini.with_section(Some("logging"))
                .set("directory", dir.to_string_lossy());
        }
        if let Some(keys) = &self.keys_file {
            ini.with_section(Some("keys")).set("file", keys.to_string_lossy());
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        ini.write_to_file(path)?;
        Ok(())
    }

    /// Build the effective agent configuration, merging the extra key table.
    pub fn to_agent_config(&self) -> AgentResult<AgentConfig> {
        let mut config = self.agent.clone();
        if let Some(path) = &self.keys_file {
            let extra = RootKeyTable::load(path)?;
            config.root_keys.extend(extra);
        }
        Ok(config)
    }
}

fn string_or(ini: &Ini, section: &str, key: &str, default: &str) -> String {
    ini.get_from(Some(section), key)
        .unwrap_or(default)
        .to_string()
}

fn parse_or<T: FromStr>(ini: &Ini, section: &str, key: &str, default: T) -> AgentResult<T> {
    match ini.get_from(Some(section), key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            AgentError::Config(format!("invalid value '{}' for {}.{}", raw, section, key))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_file() {
        let config = ConfigFile::parse(
            "[device]\nmanufacturer = Contoso\nmodel = IoTDevice\ninstalled_criteria = 1.0.0\n\
             [capacity]\nproxy_update_count = 2\n\
             [timeouts]\nhttp_connect = 10\n\
             [logging]\nlevel = debug\n",
        )
        .unwrap();

        assert_eq!(config.agent.manufacturer, "Contoso");
        assert_eq!(config.agent.model, "IoTDevice");
        assert_eq!(config.agent.installed_criteria, "1.0.0");
        assert_eq!(config.agent.proxy_update_count, 2);
        assert_eq!(config.agent.timeouts.http_connect, 10);
        assert_eq!(config.agent.timeouts.http_download, 300);
        assert_eq!(config.logging.level, "debug");
        assert!(config.keys_file.is_none());
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = ConfigFile::parse("").unwrap();
        assert_eq!(config.agent.scratch_size, 2048);
        assert_eq!(config.agent.timeouts, Timeouts::default());
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let result = ConfigFile::parse("[capacity]\nscratch_size = lots\n");
        match result {
            Err(AgentError::Config(msg)) => assert!(msg.contains("capacity.scratch_size")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.ini");

        let mut original = ConfigFile::default();
        original.agent.manufacturer = "Contoso".to_string();
        original.agent.model = "IoTDevice".to_string();
        original.agent.timeouts.dns_retransmit_count = 5;
        original.logging.directory = Some(temp.path().join("logs"));

        original.save_to(&path).unwrap();
        let loaded = ConfigFile::load_from(&path).unwrap();

        assert_eq!(loaded.agent.manufacturer, "Contoso");
        assert_eq!(loaded.agent.timeouts.dns_retransmit_count, 5);
        assert_eq!(loaded.logging.directory, original.logging.directory);
    }

    #[test]
    fn test_missing_keys_file_fails_merge() {
        let config = ConfigFile {
            keys_file: Some(PathBuf::from("/nonexistent/fwagent/keys.json")),
            ..ConfigFile::default()
        };
        assert!(config.to_agent_config().is_err());
    }
}
