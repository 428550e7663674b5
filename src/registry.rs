use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

/// Read-only lookup of chain and token metadata referenced by encoded swaps.
pub trait Registry {
    fn resolve_chain(&self, chain: u16) -> Option<&Network>;
    fn resolve_token(&self, chain: u16, index: u8) -> Option<&Token>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub id: String,
    pub name: String,
    pub short_slip44: u16,
    #[serde(default)]
    pub explorer: Option<String>,
    #[serde(default)]
    pub core_symbol: Option<String>,
    #[serde(default)]
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub index: u8,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    #[serde(default)]
    pub address: Option<String>,
}

fn default_decimals() -> u8 {
    6
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticRegistry {
    networks: Vec<Network>,
}

impl StaticRegistry {
    pub fn new(networks: Vec<Network>) -> Self {
        Self { networks }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let registry: Self = serde_json::from_str(s).context("parse registry json")?;
        for (i, n) in registry.networks.iter().enumerate() {
            anyhow::ensure!(
                !registry.networks[..i]
                    .iter()
                    .any(|m| m.short_slip44 == n.short_slip44),
                "duplicate network shortSlip44 {:#06x} ({})",
                n.short_slip44,
                n.id
            );
        }
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read registry {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("load registry {}", path.display()))
    }

    pub fn networks(&self) -> &[Network] {
        &self.networks
    }

    pub fn network_by_id(&self, id: &str) -> Option<&Network> {
        self.networks.iter().find(|n| n.id.eq_ignore_ascii_case(id))
    }
}

impl Registry for StaticRegistry {
    fn resolve_chain(&self, chain: u16) -> Option<&Network> {
        self.networks.iter().find(|n| n.short_slip44 == chain)
    }

    fn resolve_token(&self, chain: u16, index: u8) -> Option<&Token> {
        self.resolve_chain(chain)?
            .tokens
            .iter()
            .find(|t| t.index == index)
    }
}
