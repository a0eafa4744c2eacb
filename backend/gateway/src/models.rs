//! UI-facing shapes produced from raw contract reads.
//!
//! Amounts are rendered as decimal strings (18 decimals, trailing zeros
//! trimmed) the way wallets display them; addresses serialize checksummed.

use alloy_primitives::utils::{self as units, ParseUnits};
use alloy_primitives::{Address, U256};
use serde::Serialize;
use tracing::debug;

use crate::status::{
    FundActions, FundStatus, FundViewer, PoolActions, PoolStatus, PoolViewer, Status,
};

/// Decimals used by every token the factories accept.
pub const TOKEN_DECIMALS: u8 = 18;

/// Render a raw integer token amount with `decimals` places, e.g.
/// `1500000000000000000` → `"1.5"`, `0` → `"0.0"`.
pub fn format_units(value: U256, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let base = U256::from(10u64).pow(U256::from(decimals));
    let int = value / base;
    let frac = (value % base).to_string();
    let padded = format!("{frac:0>width$}", width = decimals as usize);
    let trimmed = padded.trim_end_matches('0');
    if trimmed.is_empty() {
        format!("{int}.0")
    } else {
        format!("{int}.{trimmed}")
    }
}

pub fn format_amount(value: U256) -> String {
    format_units(value, TOKEN_DECIMALS)
}

/// Inverse of [`format_units`]: `"1.5"` with 18 decimals → `1.5e18`.
///
/// Returns `None` for anything that is not a plain non-negative decimal or
/// carries more fractional digits than `decimals`.
pub fn parse_units(input: &str, decimals: u8) -> Option<U256> {
    let input = input.trim();
    let (int, frac) = input.split_once('.').unwrap_or((input, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    // alloy accepts signs and silently truncates extra decimals.
    if (int.is_empty() && frac.is_empty())
        || !all_digits(int)
        || !all_digits(frac)
        || frac.len() > decimals as usize
    {
        return None;
    }
    match units::parse_units(input, decimals) {
        Ok(ParseUnits::U256(value)) => Some(value),
        Ok(ParseUnits::I256(_)) => None,
        Err(e) => {
            debug!("Rejected amount {input:?}: {e}");
            None
        }
    }
}

pub fn parse_amount(input: &str) -> Option<U256> {
    parse_units(input, TOKEN_DECIMALS)
}

/// Clamp a contract integer into `u64`.
pub fn to_u64(value: U256) -> u64 {
    value.saturating_to::<u64>()
}

// ─────────────────────────────────────────────────────────
// Listing
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FundType {
    Grouped,
    Personal,
}

impl FundType {
    pub fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            Self::Grouped
        } else {
            Self::Personal
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContriboostUserStatus {
    pub is_participant: bool,
    pub has_received_funds: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalFundUserStatus {
    pub is_participant: bool,
    pub contribution_amount: String,
}

impl Default for GoalFundUserStatus {
    fn default() -> Self {
        Self {
            is_participant: false,
            contribution_amount: "0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContriboostSummary {
    pub network: String,
    pub chain_id: u64,
    pub contract_address: Address,
    pub name: String,
    pub day_range: u64,
    pub expected_number: u64,
    pub contribution_amount: String,
    pub token_address: Address,
    pub token_symbol: String,
    pub host_fee_percentage: u64,
    pub platform_fee_percentage: u64,
    pub max_missed_deposits: u64,
    pub current_participants: u64,
    pub status: PoolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_status: Option<ContriboostUserStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalFundSummary {
    pub network: String,
    pub chain_id: u64,
    pub contract_address: Address,
    pub name: String,
    pub target_amount: String,
    pub current_amount: String,
    pub deadline: u64,
    pub beneficiary: Address,
    pub token_address: Address,
    pub token_symbol: String,
    pub fund_type: FundType,
    pub platform_fee_percentage: u64,
    pub status: FundStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_status: Option<GoalFundUserStatus>,
    pub tags: Vec<String>,
}

/// One row of the aggregated listing.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PoolSummary {
    Contriboost(ContriboostSummary),
    GoalFund(GoalFundSummary),
}

impl PoolSummary {
    pub fn network(&self) -> &str {
        match self {
            Self::Contriboost(p) => &p.network,
            Self::GoalFund(f) => &f.network,
        }
    }

    pub fn contract_address(&self) -> Address {
        match self {
            Self::Contriboost(p) => p.contract_address,
            Self::GoalFund(f) => f.contract_address,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Contriboost(p) => &p.name,
            Self::GoalFund(f) => &f.name,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Contriboost(p) => Status::Pool(p.status),
            Self::GoalFund(f) => Status::Fund(f.status),
        }
    }

    /// Case-insensitive name match; GoalFund tags match as well.
    pub fn matches_search(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        if self.name().to_lowercase().contains(&q) {
            return true;
        }
        match self {
            Self::GoalFund(f) => f.tags.iter().any(|t| t.to_lowercase().contains(&q)),
            Self::Contriboost(_) => false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolListing {
    pub pools: Vec<PoolSummary>,
    /// `"<network> <kind>: <error>"` for every source that could not be read.
    pub fetch_errors: Vec<String>,
    /// Unix seconds when the listing was assembled.
    pub refreshed_at: i64,
}

// ─────────────────────────────────────────────────────────
// Details
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub address: Address,
    pub id: u64,
    pub deposit_amount: String,
    pub last_deposit_time: u64,
    pub exists: bool,
    pub received_funds: bool,
    pub active: bool,
    pub missed_deposits: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContriboostDetail {
    #[serde(flatten)]
    pub summary: ContriboostSummary,
    pub description: String,
    pub current_segment: u64,
    pub start_timestamp: u64,
    pub host: Address,
    pub participants: Vec<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<PoolViewer>,
    pub actions: PoolActions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalFundDetail {
    #[serde(flatten)]
    pub summary: GoalFundSummary,
    pub description: String,
    pub contributors: u64,
    pub user_contribution: String,
    pub achieved: bool,
    pub funds_withdrawn: bool,
    pub owner: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<FundViewer>,
    pub actions: FundActions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PoolDetail {
    Contriboost(ContriboostDetail),
    GoalFund(GoalFundDetail),
}

// ─────────────────────────────────────────────────────────
// Account & stats
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkBalance {
    pub network: String,
    pub chain_id: u64,
    pub symbol: String,
    pub balance: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub address: Address,
    pub balances: Vec<NetworkBalance>,
    pub pools: Vec<ContriboostSummary>,
    pub funds: Vec<GoalFundSummary>,
    pub fetch_errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_pools: usize,
    pub total_funds: usize,
    pub total_participants: u64,
    pub pools_by_status: std::collections::BTreeMap<String, usize>,
    pub funds_by_status: std::collections::BTreeMap<String, usize>,
    pub networks: usize,
}
