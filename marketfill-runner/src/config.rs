//! Filler configuration, loaded from TOML.
//!
//! ```toml
//! destination_station = 60005686
//! source_stations = [60003760, 60008494]
//! stock_fraction = 0.04
//!
//! [paths]
//! basket = "top-traded.csv"
//! order_sizes = "order-sizes.txt"
//! price_history = "market-prices"
//! reference_dir = "sde"
//! ```
//!
//! Relative paths are resolved against the directory holding the config file.

use std::path::{Path, PathBuf};

use marketfill_core::decision::DecisionPolicy;
use marketfill_core::domain::StationId;
use marketfill_core::pricing::{PriceMarkup, DEFAULT_HUB_STATIONS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("config is missing {0}")]
    Missing(&'static str),
}

/// Top-level configuration for every subcommand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FillerConfig {
    /// Station we stock; required for `fill`.
    #[serde(default)]
    pub destination_station: Option<StationId>,

    /// Stations we may buy from; required for `fill`.
    #[serde(default)]
    pub source_stations: Vec<StationId>,

    #[serde(default = "default_stock_fraction")]
    pub stock_fraction: f64,

    /// Reference hubs anchoring the fair price.
    #[serde(default = "default_hub_stations")]
    pub hub_stations: Vec<StationId>,

    #[serde(default = "default_window_months")]
    pub fair_price_window_months: u32,

    #[serde(default)]
    pub markup: PriceMarkup,

    #[serde(default)]
    pub policy: PolicyConfig,

    pub paths: PathsConfig,

    /// Only consider the first N basket items.
    #[serde(default)]
    pub basket_limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    pub build_premium: f64,
    pub reprice_margin: f64,
    pub existing_stock_weight: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let d = DecisionPolicy::default();
        Self {
            build_premium: d.build_premium,
            reprice_margin: d.reprice_margin,
            existing_stock_weight: d.existing_stock_weight,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    pub basket: PathBuf,
    pub order_sizes: PathBuf,
    pub price_history: PathBuf,
    pub reference_dir: PathBuf,
    #[serde(default)]
    pub assets: Option<PathBuf>,
    #[serde(default)]
    pub orders: Option<PathBuf>,
    #[serde(default)]
    pub industry_recipes: Option<PathBuf>,
    #[serde(default)]
    pub industry_exclude: Option<PathBuf>,
}

impl PathsConfig {
    fn resolve_against(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.basket);
        join(&mut self.order_sizes);
        join(&mut self.price_history);
        join(&mut self.reference_dir);
        for p in [
            &mut self.assets,
            &mut self.orders,
            &mut self.industry_recipes,
            &mut self.industry_exclude,
        ]
        .into_iter()
        .flatten()
        {
            join(p);
        }
    }
}

fn default_stock_fraction() -> f64 {
    DecisionPolicy::default().stock_fraction
}

fn default_hub_stations() -> Vec<StationId> {
    DEFAULT_HUB_STATIONS.to_vec()
}

fn default_window_months() -> u32 {
    3
}

impl FillerConfig {
    /// Load from a TOML file, resolving relative paths against its directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.paths.resolve_against(base);
        }
        Ok(config)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: String| Err(ConfigError::Invalid { field, reason });

        if !(self.stock_fraction > 0.0 && self.stock_fraction <= 1.0) {
            return invalid("stock_fraction", format!("{} is not in (0, 1]", self.stock_fraction));
        }
        if self.hub_stations.is_empty() {
            return invalid("hub_stations", "at least one hub is required".into());
        }
        if self.fair_price_window_months < 1 {
            return invalid("fair_price_window_months", "must be at least 1".into());
        }
        for (field, value) in [
            ("markup.buy", self.markup.buy),
            ("markup.new_sell", self.markup.new_sell),
            ("markup.sell", self.markup.sell),
            ("policy.build_premium", self.policy.build_premium),
            ("policy.reprice_margin", self.policy.reprice_margin),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return invalid(field, format!("{value} must be positive"));
            }
        }
        Ok(())
    }

    /// Check the fields only `fill` needs.
    pub fn validate_for_fill(&self) -> Result<StationId, ConfigError> {
        let destination = self
            .destination_station
            .ok_or(ConfigError::Missing("destination_station"))?;
        if self.source_stations.is_empty() {
            return Err(ConfigError::Invalid {
                field: "source_stations",
                reason: "at least one source station is required".into(),
            });
        }
        Ok(destination)
    }

    /// Apply command-line overrides. A limit of zero clears the basket limit.
    pub fn apply_overrides(
        &mut self,
        station: Option<StationId>,
        from_stations: Option<Vec<StationId>>,
        limit: Option<usize>,
    ) {
        if let Some(s) = station {
            self.destination_station = Some(s);
        }
        if let Some(sources) = from_stations {
            self.source_stations = sources;
        }
        if let Some(n) = limit {
            self.basket_limit = (n > 0).then_some(n);
        }
    }

    pub fn decision_policy(&self) -> DecisionPolicy {
        DecisionPolicy {
            stock_fraction: self.stock_fraction,
            build_premium: self.policy.build_premium,
            reprice_margin: self.policy.reprice_margin,
            existing_stock_weight: self.policy.existing_stock_weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
destination_station = 60005686
source_stations = [60003760, 60008494]

[paths]
basket = "top-traded.csv"
order_sizes = "order-sizes.txt"
price_history = "market-prices"
reference_dir = "sde"
"#;

    #[test]
    fn defaults_fill_in() {
        let config = FillerConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.stock_fraction, 0.04);
        assert_eq!(config.hub_stations, DEFAULT_HUB_STATIONS.to_vec());
        assert_eq!(config.fair_price_window_months, 3);
        assert_eq!(config.markup, PriceMarkup::default());
        assert_eq!(config.policy.existing_stock_weight, 2);
        assert_eq!(config.paths.assets, None);
        assert_eq!(config.validate_for_fill().unwrap(), StationId(60005686));
    }

    #[test]
    fn sections_override_defaults() {
        let toml = format!("{MINIMAL}\n[markup]\nnew_sell = 1.3\n\n[policy]\nexisting_stock_weight = 3\n");
        let config = FillerConfig::from_toml(&toml).unwrap();
        assert_eq!(config.markup.new_sell, 1.3);
        assert_eq!(config.markup.buy, 1.01);
        assert_eq!(config.decision_policy().existing_stock_weight, 3);
        assert_eq!(config.decision_policy().build_premium, 1.1);
    }

    #[test]
    fn rejects_out_of_range_fraction() {
        let toml = MINIMAL.replace(
            "source_stations = [60003760, 60008494]",
            "source_stations = [60003760]\nstock_fraction = 1.5",
        );
        let err = FillerConfig::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "stock_fraction", .. }));
    }

    #[test]
    fn fill_needs_destination_and_sources() {
        let toml = MINIMAL
            .replace("destination_station = 60005686\n", "")
            .replace("source_stations = [60003760, 60008494]\n", "");
        let mut config = FillerConfig::from_toml(&toml).unwrap();
        assert!(matches!(
            config.validate_for_fill(),
            Err(ConfigError::Missing("destination_station"))
        ));
        config.apply_overrides(Some(StationId(1)), None, None);
        assert!(matches!(
            config.validate_for_fill(),
            Err(ConfigError::Invalid { field: "source_stations", .. })
        ));
        config.apply_overrides(None, Some(vec![StationId(2)]), Some(10));
        assert_eq!(config.validate_for_fill().unwrap(), StationId(1));
        assert_eq!(config.basket_limit, Some(10));
    }

    #[test]
    fn zero_limit_override_clears_the_limit() {
        let toml = format!("basket_limit = 25\n{MINIMAL}");
        let mut config = FillerConfig::from_toml(&toml).unwrap();
        assert_eq!(config.basket_limit, Some(25));
        config.apply_overrides(None, None, None);
        assert_eq!(config.basket_limit, Some(25));
        config.apply_overrides(None, None, Some(0));
        assert_eq!(config.basket_limit, None);
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filler.toml");
        let toml = format!("{MINIMAL}assets = \"assets.csv\"\n");
        std::fs::write(&path, toml).unwrap();

        let config = FillerConfig::from_file(&path).unwrap();
        assert_eq!(config.paths.basket, dir.path().join("top-traded.csv"));
        assert_eq!(config.paths.assets, Some(dir.path().join("assets.csv")));
    }

    #[test]
    fn unknown_toml_is_a_parse_error() {
        assert!(matches!(
            FillerConfig::from_toml("paths = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
