//! Registry of the EVM networks the gateway aggregates over.
//!
//! Each entry carries everything the aggregator needs to reach the two
//! factories, plus the add-chain parameters a wallet needs to switch to it.

use std::path::Path;

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

use crate::errors::{GatewayError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// A single supported network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// Short key used in URLs (`lisk`, `celo`).
    pub key: String,
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub block_explorer_url: String,
    pub contriboost_factory: Address,
    pub goal_fund_factory: Address,
    /// The network's stablecoin; always accepted by the create forms.
    pub token_address: Address,
    pub token_symbol: String,
    pub native_currency: NativeCurrency,
    /// Further ERC-20 tokens accepted by the create forms.
    #[serde(default)]
    pub accepted_tokens: Vec<Address>,
}

impl Network {
    /// Symbol to show for an amount held in `token`.
    pub fn symbol_for(&self, token: Address) -> &str {
        if token == Address::ZERO {
            &self.native_currency.symbol
        } else {
            &self.token_symbol
        }
    }

    pub fn accepts_token(&self, token: Address) -> bool {
        token == self.token_address || self.accepted_tokens.contains(&token)
    }
}

/// Parameters in the shape `wallet_addEthereumChain` expects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl From<&Network> for AddChainParams {
    fn from(n: &Network) -> Self {
        AddChainParams {
            chain_id: format!("0x{:x}", n.chain_id),
            chain_name: n.name.clone(),
            native_currency: n.native_currency.clone(),
            rpc_urls: vec![n.rpc_url.clone()],
            block_explorer_urls: vec![n.block_explorer_url.clone()],
        }
    }
}

/// The ordered set of networks. Order is the aggregation order.
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    networks: Vec<Network>,
}

impl NetworkRegistry {
    pub fn new(networks: Vec<Network>) -> Result<Self> {
        if networks.is_empty() {
            return Err(GatewayError::Config("at least one network is required".into()));
        }
        for (i, n) in networks.iter().enumerate() {
            if networks[..i].iter().any(|m| m.key == n.key) {
                return Err(GatewayError::Config(format!("duplicate network key: {}", n.key)));
            }
        }
        Ok(Self { networks })
    }

    /// Lisk Sepolia and Celo Alfajores testnet deployments.
    pub fn builtin() -> Self {
        let lisk_usdt = address!("2728DD8B45B788e26d12B13Db5A244e5403e7eda");
        let celo_cusd = address!("874069Fa1Eb16D44d622BC6Cf1632c057f6F7f2d");
        let celo_erc20 = address!("F194afDf50B03e69Bd7D057c1Aa9e10c9954E4C9");
        Self {
            networks: vec![
                Network {
                    key: "lisk".into(),
                    chain_id: 4202,
                    name: "Lisk Sepolia".into(),
                    rpc_url: "https://rpc.sepolia-api.lisk.com".into(),
                    block_explorer_url: "https://sepolia-blockscout.lisk.com".into(),
                    contriboost_factory: address!("aE83198F4c622a5dccdda1B494fF811f5B6F3631"),
                    goal_fund_factory: address!("791F269E311aE13e490ffEf7DFd68f27f7B21E41"),
                    token_address: lisk_usdt,
                    token_symbol: "USDT".into(),
                    native_currency: NativeCurrency {
                        name: "Lisk Sepolia ETH".into(),
                        symbol: "ETH".into(),
                        decimals: 18,
                    },
                    accepted_tokens: vec![lisk_usdt],
                },
                Network {
                    key: "celo".into(),
                    chain_id: 44787,
                    name: "Celo Alfajores".into(),
                    rpc_url: "https://alfajores-forno.celo-testnet.org".into(),
                    block_explorer_url: "https://alfajores-blockscout.celo-testnet.org".into(),
                    contriboost_factory: address!("2cF3869e0522ebEa4161ff601d5711A7Af13ebA3"),
                    goal_fund_factory: address!("2F07fc486b87B5512b3e33E369E0151de52BE1dA"),
                    token_address: celo_cusd,
                    token_symbol: "cUSD".into(),
                    native_currency: NativeCurrency {
                        name: "Celo".into(),
                        symbol: "CELO".into(),
                        decimals: 18,
                    },
                    accepted_tokens: vec![celo_cusd, celo_erc20],
                },
            ],
        }
    }

    /// Load a JSON array of [`Network`]s from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let networks: Vec<Network> = serde_json::from_str(&raw)?;
        Self::new(networks)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Network> {
        self.networks.iter()
    }

    pub fn get(&self, key: &str) -> Option<&Network> {
        self.networks.iter().find(|n| n.key == key)
    }

    pub fn add_chain_params(&self) -> Vec<AddChainParams> {
        self.networks.iter().map(AddChainParams::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_lisk_then_celo() {
        let reg = NetworkRegistry::builtin();
        let keys: Vec<_> = reg.iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["lisk", "celo"]);
    }

    #[test]
    fn add_chain_params_use_hex_chain_id() {
        let reg = NetworkRegistry::builtin();
        let params = reg.add_chain_params();
        assert_eq!(params[0].chain_id, "0x106a");
        assert_eq!(params[1].chain_id, "0xaef3");
        assert_eq!(params[1].native_currency.symbol, "CELO");
    }

    #[test]
    fn symbol_for_native_and_token() {
        let reg = NetworkRegistry::builtin();
        let celo = reg.get("celo").unwrap();
        assert_eq!(celo.symbol_for(Address::ZERO), "CELO");
        assert_eq!(celo.symbol_for(celo.token_address), "cUSD");
    }

    #[test]
    fn default_token_is_always_accepted() {
        let mut lisk = NetworkRegistry::builtin().get("lisk").unwrap().clone();
        lisk.accepted_tokens.clear();
        assert!(lisk.accepts_token(lisk.token_address));
        assert!(!lisk.accepts_token(Address::ZERO));
    }

    #[test]
    fn duplicate_keys_rejected() {
        let mut nets: Vec<Network> = NetworkRegistry::builtin().iter().cloned().collect();
        nets[1].key = "lisk".into();
        assert!(matches!(
            NetworkRegistry::new(nets),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn networks_round_trip_through_json_file() {
        let nets: Vec<Network> = NetworkRegistry::builtin().iter().cloned().collect();
        let path = std::env::temp_dir().join(format!("networks-{}.json", std::process::id()));
        std::fs::write(&path, serde_json::to_string(&nets).unwrap()).unwrap();
        let reg = NetworkRegistry::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(reg.get("lisk").unwrap().chain_id, 4202);
    }
}
