//! Lifecycle status and action permissions derived from raw contract reads.
//!
//! Every view (listing, account, detail) goes through these functions so a
//! pool never shows two different statuses on two pages.

use serde::{Deserialize, Serialize};

/// Lifecycle of a Contriboost pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolStatus {
    NotStarted,
    Active,
    Full,
    Completed,
}

/// Lifecycle of a GoalFund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FundStatus {
    Active,
    Achieved,
    Expired,
}

/// Either kind of status, as used by the listing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Status {
    Pool(PoolStatus),
    Fund(FundStatus),
}

impl PoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::Active => "active",
            Self::Full => "full",
            Self::Completed => "completed",
        }
    }
}

impl FundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Achieved => "achieved",
            Self::Expired => "expired",
        }
    }
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pool(s) => s.as_str(),
            Self::Fund(s) => s.as_str(),
        }
    }
}

/// Raw pool fields that status depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolSnapshot {
    pub start_timestamp: u64,
    pub current_segment: u64,
    pub participants: u64,
    pub expected_number: u64,
}

pub fn pool_status(p: &PoolSnapshot, now: u64) -> PoolStatus {
    if now < p.start_timestamp {
        PoolStatus::NotStarted
    } else if p.expected_number > 0 && p.current_segment > p.expected_number {
        PoolStatus::Completed
    } else if p.participants >= p.expected_number {
        PoolStatus::Full
    } else if p.current_segment > 0 {
        PoolStatus::Active
    } else {
        PoolStatus::NotStarted
    }
}

pub fn fund_status(achieved: bool, deadline: u64, now: u64) -> FundStatus {
    if achieved {
        FundStatus::Achieved
    } else if now > deadline {
        FundStatus::Expired
    } else {
        FundStatus::Active
    }
}

// ─────────────────────────────────────────────────────────
// Permissions
// ─────────────────────────────────────────────────────────

/// The viewer's relationship to a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolViewer {
    pub is_participant: bool,
    pub is_active: bool,
    pub has_received_funds: bool,
    pub missed_deposits: u64,
    pub is_host: bool,
}

/// The viewer's relationship to a fund.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundViewer {
    pub has_contributed: bool,
    pub is_owner: bool,
    pub is_beneficiary: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolActions {
    pub can_join: bool,
    pub can_deposit: bool,
    /// Leave before the first cycle starts.
    pub can_exit: bool,
    pub can_check_missed_deposits: bool,
    pub can_distribute: bool,
    pub can_emergency_withdraw: bool,
    pub can_set_description: bool,
    pub can_set_host_fee: bool,
    pub can_set_token: bool,
    pub can_transfer_ownership: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundActions {
    pub can_contribute: bool,
    pub can_withdraw: bool,
    pub can_refund: bool,
    pub can_emergency_withdraw: bool,
    pub can_transfer_ownership: bool,
}

/// Without a viewer nothing is permitted.
pub fn pool_actions(
    status: PoolStatus,
    participants: u64,
    expected_number: u64,
    viewer: Option<&PoolViewer>,
) -> PoolActions {
    let Some(v) = viewer else {
        return PoolActions::default();
    };
    let active = status == PoolStatus::Active;
    PoolActions {
        can_join: !v.is_participant
            && status != PoolStatus::Full
            && status != PoolStatus::Completed
            && participants < expected_number,
        can_deposit: v.is_participant && v.is_active && !v.has_received_funds && active,
        can_exit: v.is_participant && status == PoolStatus::NotStarted,
        can_check_missed_deposits: v.is_host && active,
        can_distribute: v.is_host && active,
        can_emergency_withdraw: v.is_host,
        can_set_description: v.is_host,
        can_set_host_fee: v.is_host,
        can_set_token: v.is_host,
        can_transfer_ownership: v.is_host,
    }
}

/// Contributing needs no viewer; everything else does.
pub fn fund_actions(
    status: FundStatus,
    funds_withdrawn: bool,
    viewer: Option<&FundViewer>,
) -> FundActions {
    let can_contribute = status == FundStatus::Active;
    let Some(v) = viewer else {
        return FundActions {
            can_contribute,
            ..FundActions::default()
        };
    };
    let achieved = status == FundStatus::Achieved;
    FundActions {
        can_contribute,
        can_withdraw: (v.is_beneficiary || v.is_owner) && achieved && !funds_withdrawn,
        can_refund: v.is_owner && status == FundStatus::Expired,
        can_emergency_withdraw: v.is_owner,
        can_transfer_ownership: v.is_owner,
    }
}
