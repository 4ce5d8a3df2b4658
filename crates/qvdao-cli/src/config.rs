//! TOML configuration for a ledger instance: owner, parameters, logging and
//! the starting balances of the in-memory vault.

use serde::{Deserialize, Serialize};
use anyhow::Context;
use std::path::Path;

use qvdao_governance::{GovernanceLedger, GovernanceParams, ReputationParams, Vault};
use qvdao_types::{Address, Amount};

/// Ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Administrative owner
    pub owner: Address,
    /// Treasury funding taken from the owner before the first step
    pub treasury_seed: u64,
    /// Governance parameters
    pub governance: GovernanceParams,
    /// Reputation constants
    pub reputation: ReputationParams,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Initial balances in the in-memory vault
    pub balances: Vec<BalanceConfig>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let owner = Address::from_label("owner");
        Self {
            owner,
            treasury_seed: 0,
            governance: GovernanceParams::default(),
            reputation: ReputationParams::default(),
            logging: LoggingConfig::default(),
            balances: vec![
                BalanceConfig {
                    address: owner,
                    amount: 10_000,
                },
                BalanceConfig {
                    address: Address::from_label("alice"),
                    amount: 10_000,
                },
                BalanceConfig {
                    address: Address::from_label("bob"),
                    amount: 10_000,
                },
            ],
        }
    }
}

impl LedgerConfig {
    /// Read a TOML config. Paths that climb out with `..` are refused.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let path = reject_traversal(path)?;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading ledger config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing ledger config {}", path.display()))
    }

    /// Write this config as pretty TOML.
    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        let path = reject_traversal(path)?;
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)
            .with_context(|| format!("writing ledger config {}", path.display()))
    }

    /// Reject configs the ledger would refuse or the CLI cannot honor.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.owner.is_zero() {
            anyhow::bail!("Owner cannot be the zero address");
        }

        self.governance.validate()?;

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => anyhow::bail!("Unknown log format '{}', expected pretty or json", other),
        }

        if self.treasury_seed > 0 && self.balance_of(&self.owner) < Amount::from(self.treasury_seed) {
            anyhow::bail!(
                "Treasury seed {} exceeds the owner's configured balance",
                self.treasury_seed
            );
        }

        Ok(())
    }

    fn balance_of(&self, address: &Address) -> Amount {
        self.balances
            .iter()
            .filter(|b| &b.address == address)
            .map(|b| Amount::from(b.amount))
            .sum()
    }

    /// Build a fresh ledger backed by an in-memory vault.
    pub fn build_ledger(&self) -> anyhow::Result<GovernanceLedger<Vault>> {
        self.validate()?;

        let mut vault = Vault::new();
        for balance in &self.balances {
            vault.credit(balance.address, Amount::from(balance.amount));
        }

        let mut ledger = GovernanceLedger::new(
            self.owner,
            self.governance.clone(),
            self.reputation.clone(),
            vault,
        )?;

        if self.treasury_seed > 0 {
            ledger.fund_treasury(self.owner, Amount::from(self.treasury_seed), 0)?;
        }

        Ok(ledger)
    }
}

/// Initial vault balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceConfig {
    pub address: Address,
    pub amount: u64,
}

/// `[logging]` table. Command-line flags take precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive such as `info` or `qvdao_governance=debug`
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("pretty"),
        }
    }
}

fn reject_traversal(path: &Path) -> anyhow::Result<&Path> {
    let climbs = path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir));
    if climbs {
        anyhow::bail!("refusing path {} with parent-directory components", path.display());
    }
    Ok(path)
}
