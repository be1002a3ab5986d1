// ABOUTME: Classifies tables by row count into memory-risk tiers (none, warn, strong).
// ABOUTME: Used before persisting or displaying very large tables.

use serde::{Deserialize, Serialize};

/// Memory-risk tier for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Warn,
    Strong,
}

/// A warning produced for tables above the `none` tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskWarning {
    pub level: RiskLevel,
    pub message: String,
}

/// Row-count bounds for each tier. A count equal to a bound stays in the lower tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskThresholds {
    pub warn_above: u64,
    pub strong_above: u64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            warn_above: 1_000_000,
            strong_above: 5_000_000,
        }
    }
}

impl RiskThresholds {
    pub fn level(&self, row_count: u64) -> RiskLevel {
        if row_count > self.strong_above {
            RiskLevel::Strong
        } else if row_count > self.warn_above {
            RiskLevel::Warn
        } else {
            RiskLevel::None
        }
    }

    /// Classify a table, returning a warning only for the warn and strong tiers.
    pub fn classify(&self, table_name: &str, row_count: u64) -> Option<RiskWarning> {
        let rows = group_thousands(row_count);
        match self.level(row_count) {
            RiskLevel::None => None,
            RiskLevel::Warn => Some(RiskWarning {
                level: RiskLevel::Warn,
                message: format!(
                    "Table \"{}\" has {} rows and may use a lot of memory.",
                    table_name, rows
                ),
            }),
            RiskLevel::Strong => Some(RiskWarning {
                level: RiskLevel::Strong,
                message: format!(
                    "Table \"{}\" has {} rows. Loading or saving it may put significant memory pressure on this session.",
                    table_name, rows
                ),
            }),
        }
    }
}

/// Classify with the default thresholds.
pub fn classify(table_name: &str, row_count: u64) -> Option<RiskWarning> {
    RiskThresholds::default().classify(table_name, row_count)
}

/// Format a count with ',' between groups of three digits.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
