use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level proxy configuration (spec.md §6 "Configuration (environment)").
///
/// Loaded from an optional TOML/JSON file (for the few settings that make
/// sense to pin at deploy time) and then overridden from environment
/// variables, mirroring the teacher's `GatewayConfig::load` two-phase load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerthroughConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Cache TTL in milliseconds. `<= 0` disables the cache entirely.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: i64,

    /// Absolute high-water mark for cache entry count (spec.md §4.6).
    #[serde(default = "default_cache_high_water")]
    pub cache_high_water: usize,

    /// Soft target the cache is swept down to once above the high-water mark.
    #[serde(default = "default_cache_low_water")]
    pub cache_low_water: usize,

    #[serde(default)]
    pub headless_enabled: bool,

    #[serde(default = "default_headless_max")]
    pub headless_max: usize,

    #[serde(default = "default_headless_timeout_ms")]
    pub headless_timeout_ms: u64,

    #[serde(default = "default_headless_ua")]
    pub headless_ua: String,

    #[serde(default = "default_fallback_ua")]
    pub fallback_ua: String,
}

impl Default for PowerthroughConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_high_water: default_cache_high_water(),
            cache_low_water: default_cache_low_water(),
            headless_enabled: false,
            headless_max: default_headless_max(),
            headless_timeout_ms: default_headless_timeout_ms(),
            headless_ua: default_headless_ua(),
            fallback_ua: default_fallback_ua(),
        }
    }
}

fn default_port() -> u16 {
    8787
}

fn default_cache_ttl_ms() -> i64 {
    15_000
}

fn default_cache_high_water() -> usize {
    200
}

fn default_cache_low_water() -> usize {
    150
}

fn default_headless_max() -> usize {
    2
}

fn default_headless_timeout_ms() -> u64 {
    30_000
}

fn default_headless_ua() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36 Powerthrough-Headless"
        .to_string()
}

fn default_fallback_ua() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36"
        .to_string()
}

impl PowerthroughConfig {
    /// Load configuration from a file (if it exists) and apply environment
    /// variable overrides. When the file does not exist, built-in defaults
    /// are used — the proxy starts with zero configuration for local dev.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config: PowerthroughConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!(
                "config file not found at {}, using defaults",
                path.display()
            );
            PowerthroughConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!("loaded powerthrough configuration");
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PORT") {
            if let Ok(n) = v.parse() {
                self.port = n;
            }
        }
        if let Ok(v) = std::env::var("POWERTHROUGH_CACHE_TTL") {
            if let Ok(n) = v.parse() {
                self.cache_ttl_ms = n;
            }
        }
        if let Ok(v) = std::env::var("POWERTHROUGH_HEADLESS") {
            self.headless_enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("POWERTHROUGH_HEADLESS_MAX") {
            if let Ok(n) = v.parse() {
                self.headless_max = n;
            }
        }
        if let Ok(v) = std::env::var("POWERTHROUGH_HEADLESS_TIMEOUT") {
            if let Ok(n) = v.parse() {
                self.headless_timeout_ms = n;
            }
        }
        if let Ok(v) = std::env::var("POWERTHROUGH_HEADLESS_UA") {
            self.headless_ua = v;
        }
        if let Ok(v) = std::env::var("POWERTHROUGH_FALLBACK_UA") {
            self.fallback_ua = v;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.cache_low_water > self.cache_high_water {
            anyhow::bail!("cache_low_water must not exceed cache_high_water");
        }
        if self.headless_max == 0 && self.headless_enabled {
            anyhow::bail!("headless_max must be > 0 when headless rendering is enabled");
        }
        Ok(())
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_ttl_ms > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = PowerthroughConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.cache_enabled());
    }

    #[test]
    fn negative_ttl_disables_cache() {
        let mut cfg = PowerthroughConfig::default();
        cfg.cache_ttl_ms = 0;
        assert!(!cfg.cache_enabled());
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let cfg = PowerthroughConfig::load(Path::new("/nonexistent/powerthrough.toml")).unwrap();
        assert_eq!(cfg.port, default_port());
    }

    #[test]
    fn low_water_above_high_water_fails_validation() {
        let mut cfg = PowerthroughConfig::default();
        cfg.cache_low_water = cfg.cache_high_water + 1;
        assert!(cfg.validate().is_err());
    }
}
