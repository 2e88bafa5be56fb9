//! Minimum order size rules, matched by market-group prefix.
//!
//! The rules file is tab-separated with no header:
//! `prefix <TAB> normal market size <TAB> min order size`.
//! Rules are tried in file order and the first prefix that the item's
//! market-group path starts with wins, so specific prefixes belong above
//! general ones.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ItemSummary;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("failed to open order size rules '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("order size rules line {line}: {reason}")]
    Parse { line: u64, reason: String },

    #[error("no order size rule matches {name} ({market_group})")]
    NoRule { name: String, market_group: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSizeRule {
    pub prefix: String,
    pub normal_market_size: u64,
    pub min_order_size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct OrderSizeRules {
    rules: Vec<OrderSizeRule>,
}

impl OrderSizeRules {
    pub fn new(rules: Vec<OrderSizeRule>) -> Self {
        Self { rules }
    }

    pub fn from_file(path: &Path) -> Result<Self, RuleError> {
        let file = File::open(path).map_err(|source| RuleError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RuleError> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rules = Vec::new();
        for (idx, row) in rdr.records().enumerate() {
            let line = idx as u64 + 1;
            let row = row.map_err(|e| RuleError::Parse {
                line,
                reason: e.to_string(),
            })?;
            if row.len() < 3 {
                return Err(RuleError::Parse {
                    line,
                    reason: format!("expected 3 fields, found {}", row.len()),
                });
            }
            let number = |i: usize, what: &str| {
                row[i].trim().parse::<u64>().map_err(|e| RuleError::Parse {
                    line,
                    reason: format!("bad {what} '{}': {e}", &row[i]),
                })
            };
            let min_order_size = number(2, "min order size")?;
            if min_order_size == 0 {
                return Err(RuleError::Parse {
                    line,
                    reason: "min order size must be positive".into(),
                });
            }
            rules.push(OrderSizeRule {
                prefix: row[0].to_string(),
                normal_market_size: number(1, "normal market size")?,
                min_order_size,
            });
        }
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule whose prefix starts the item's market-group path.
    pub fn lookup(&self, item: &ItemSummary) -> Result<&OrderSizeRule, RuleError> {
        self.rules
            .iter()
            .find(|r| item.market_group.starts_with(&r.prefix))
            .ok_or_else(|| RuleError::NoRule {
                name: item.name.clone(),
                market_group: item.market_group.clone(),
            })
    }
}
