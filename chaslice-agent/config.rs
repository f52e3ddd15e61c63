use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use chaslice_raw::ChaProfile;

use crate::error::{ChaSliceError, Result};

/// Discovery event counting LLC data-read lookups in every box
pub const DEFAULT_DISCOVERY_EVENT: &str = "UNC_CHA_LLC_LOOKUP.DATA_READ_DDT";

/// Runtime settings of one probe session
///
/// Every field has a default, so a JSON file only needs the keys it
/// overrides. Command-line flags are applied on top of the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Repetitions of each benchmark per event batch
    pub runs: usize,
    /// Upper bound on events read from the monitor file
    pub max_monitor_events: usize,
    /// Addresses recorded per CHA box during slice discovery
    pub addresses_per_box: usize,
    pub discovery_event: String,
    /// Minimum count for an address to be attributed to a box
    pub discovery_threshold: u64,
    pub discovery_iterations: usize,
    /// Bytes mapped per NUMA node
    pub buffer_size: usize,
    pub alignment: usize,
    pub page_size: usize,
    pub cache_line: usize,
    pub disable_prefetch: bool,
    /// Event catalog; the generation's default when unset
    pub catalog: Option<PathBuf>,
    pub monitor_file: PathBuf,
    /// Slice map log; the generation's default when unset
    pub offset_log: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub sysfs_cpu_root: PathBuf,
    pub sysfs_node_root: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            runs: 10,
            max_monitor_events: 10,
            addresses_per_box: 45,
            discovery_event: DEFAULT_DISCOVERY_EVENT.to_string(),
            discovery_threshold: 18,
            discovery_iterations: 20,
            buffer_size: 1 << 30,
            alignment: 2 << 20,
            page_size: 4096,
            cache_line: 64,
            disable_prefetch: true,
            catalog: None,
            monitor_file: PathBuf::from("monitor"),
            offset_log: None,
            output_dir: PathBuf::from("output"),
            sysfs_cpu_root: PathBuf::from("/sys/devices/system/cpu"),
            sysfs_node_root: PathBuf::from("/sys/devices/system/node"),
        }
    }
}

impl ProbeConfig {
    /// Load a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            ChaSliceError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: ProbeConfig = serde_json::from_str(&text)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn catalog_path(&self, profile: &dyn ChaProfile) -> PathBuf {
        self.catalog
            .clone()
            .unwrap_or_else(|| PathBuf::from(profile.catalog_path()))
    }

    pub fn offset_log_path(&self, profile: &dyn ChaProfile) -> PathBuf {
        self.offset_log
            .clone()
            .unwrap_or_else(|| PathBuf::from(profile.offset_log()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.runs == 0 {
            return Err(ChaSliceError::InvalidConfiguration(
                "runs must be at least 1".to_string(),
            ));
        }
        if !self.alignment.is_power_of_two() || !self.page_size.is_power_of_two() {
            return Err(ChaSliceError::InvalidConfiguration(format!(
                "alignment ({}) and page size ({}) must be powers of two",
                self.alignment, self.page_size
            )));
        }
        if self.cache_line == 0 || self.buffer_size < self.cache_line {
            return Err(ChaSliceError::InvalidConfiguration(format!(
                "buffer of {} bytes holds no {}-byte cache line",
                self.buffer_size, self.cache_line
            )));
        }
        if self.discovery_iterations == 0 {
            return Err(ChaSliceError::InvalidConfiguration(
                "discovery needs at least one iteration".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read the monitor list: one event name per line, at most `max` names.
pub fn load_monitor_events(path: &Path, max: usize) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).map_err(|e| {
        ChaSliceError::ConfigError(format!("cannot read monitor file {}: {e}", path.display()))
    })?;

    let events: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(max)
        .map(String::from)
        .collect();

    if text.lines().filter(|l| !l.trim().is_empty()).count() > max {
        tracing::warn!(
            "Monitor file {} lists more than {max} events, extra lines ignored",
            path.display()
        );
    }

    tracing::info!("Monitoring {} events from {}", events.len(), path.display());
    Ok(events)
}

/// Parse a kernel CPU/node list like "0-3,8-11"
pub fn parse_cpu_list(s: &str) -> Option<Vec<usize>> {
    let mut cpus = Vec::new();
    for part in s.trim().split(',').filter(|p| !p.is_empty()) {
        if let Some((start, end)) = part.split_once('-') {
            let start: usize = start.parse().ok()?;
            let end: usize = end.parse().ok()?;
            cpus.extend(start..=end);
        } else {
            cpus.push(part.parse().ok()?);
        }
    }
    Some(cpus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaslice_raw::Generation;
    use std::io::Write;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ProbeConfig =
            serde_json::from_str(r#"{ "runs": 3, "catalog": "events/custom.json" }"#).unwrap();
        assert_eq!(config.runs, 3);
        assert_eq!(config.addresses_per_box, 45);
        assert_eq!(config.discovery_event, DEFAULT_DISCOVERY_EVENT);

        let profile = Generation::IceLake.profile();
        assert_eq!(
            config.catalog_path(profile),
            PathBuf::from("events/custom.json")
        );
        assert_eq!(
            config.offset_log_path(profile),
            PathBuf::from("cha_map_icx_mammoth.log")
        );
    }

    #[test]
    fn test_validate_rejects_bad_alignment() {
        let config = ProbeConfig {
            alignment: 3000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(ProbeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_monitor_file_limit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..12 {
            writeln!(file, "EVENT_{i}").unwrap();
            if i == 3 {
                writeln!(file).unwrap();
            }
        }

        let events = load_monitor_events(file.path(), 10).unwrap();
        assert_eq!(events.len(), 10);
        assert_eq!(events[4], "EVENT_4");
        assert_eq!(events[9], "EVENT_9");
    }

    #[test]
    fn test_missing_monitor_file() {
        let err = load_monitor_events(Path::new("/nonexistent/monitor"), 10).unwrap_err();
        assert!(matches!(err, ChaSliceError::ConfigError(_)));
    }

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0-3,8-9\n"), Some(vec![0, 1, 2, 3, 8, 9]));
        assert_eq!(parse_cpu_list("0"), Some(vec![0]));
        assert_eq!(parse_cpu_list("x-1"), None);
    }
}
