//! Unsigned transaction preparation.
//!
//! The gateway never signs. Every builder here validates its input, encodes
//! the contract call and hands back `{ chainId, to, data, value }` for the
//! user's wallet. A configured referral tag is appended to the calldata
//! verbatim.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::abi::{
    ContriboostConfig, IContriboost, IContriboostFactory, IERC20, IGoalFund, IGoalFundFactory,
};
use crate::errors::{GatewayError, Result};
use crate::models::parse_amount;
use crate::networks::Network;
use crate::rpc::{self, ChainReader, TransactionReceipt};

/// Highest host fee accepted, in basis points (5%).
pub const MAX_HOST_FEE_BPS: u64 = 500;
/// Platform fee used when the form does not send one (0.5%).
pub const DEFAULT_PLATFORM_FEE_BPS: u64 = 50;
/// Only ERC-20 payment is accepted by the create forms.
pub const PAYMENT_METHOD_ERC20: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedTx {
    pub chain_id: u64,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

fn finish(
    net: &Network,
    to: Address,
    mut data: Vec<u8>,
    value: U256,
    referral: Option<&[u8]>,
) -> PreparedTx {
    if let Some(tag) = referral {
        data.extend_from_slice(tag);
    }
    PreparedTx {
        chain_id: net.chain_id,
        to,
        data: data.into(),
        value,
    }
}

fn invalid(msg: impl Into<String>) -> GatewayError {
    GatewayError::Validation(msg.into())
}

fn amount(field: &str, raw: &str) -> Result<U256> {
    parse_amount(raw).ok_or_else(|| invalid(format!("{field} must be a decimal amount")))
}

fn check_text(name: &str, description: &str) -> Result<()> {
    if name.trim().chars().count() < 3 {
        return Err(invalid("Name must be at least 3 characters"));
    }
    if description.trim().chars().count() < 10 {
        return Err(invalid("Description must be at least 10 characters"));
    }
    Ok(())
}

fn check_token(net: &Network, payment_method: u8, token: Address) -> Result<()> {
    if payment_method != PAYMENT_METHOD_ERC20 {
        return Err(invalid("Payment method must be ERC-20"));
    }
    if !net.accepts_token(token) {
        return Err(invalid(format!("Token {token} is not accepted on {}", net.name)));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Creation
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContriboostRequest {
    pub name: String,
    pub description: String,
    pub day_range: u64,
    pub expected_number: u64,
    /// Decimal token amount, e.g. `"10.5"`.
    pub contribution_amount: String,
    /// Basis points.
    pub host_fee_percentage: u64,
    #[serde(default = "default_platform_fee")]
    pub platform_fee_percentage: u64,
    #[serde(default)]
    pub max_missed_deposits: u64,
    /// Unix seconds.
    pub start_timestamp: u64,
    pub payment_method: u8,
    pub token_address: Address,
}

fn default_platform_fee() -> u64 {
    DEFAULT_PLATFORM_FEE_BPS
}

pub fn create_contriboost(
    net: &Network,
    req: &CreateContriboostRequest,
    now: u64,
    referral: Option<&[u8]>,
) -> Result<PreparedTx> {
    check_text(&req.name, &req.description)?;
    if req.day_range < 1 {
        return Err(invalid("Day range must be at least 1 day"));
    }
    if req.expected_number < 2 {
        return Err(invalid("Expected number must be at least 2"));
    }
    let contribution = amount("Contribution amount", &req.contribution_amount)?;
    if contribution.is_zero() {
        return Err(invalid("Contribution amount must be greater than 0"));
    }
    if req.host_fee_percentage > MAX_HOST_FEE_BPS {
        return Err(invalid("Fee must be between 0% and 5%"));
    }
    if req.start_timestamp <= now {
        return Err(invalid("Start date must be in the future"));
    }
    check_token(net, req.payment_method, req.token_address)?;

    let config = ContriboostConfig {
        dayRange: U256::from(req.day_range),
        expectedNumber: U256::from(req.expected_number),
        contributionAmount: contribution,
        hostFeePercentage: U256::from(req.host_fee_percentage),
        platformFeePercentage: U256::from(req.platform_fee_percentage),
        maxMissedDeposits: U256::from(req.max_missed_deposits),
        startTimestamp: U256::from(req.start_timestamp),
        paymentMethod: req.payment_method,
    };
    let call = IContriboostFactory::createContriboostCall {
        config,
        name: req.name.trim().to_string(),
        description: req.description.trim().to_string(),
        tokenAddress: req.token_address,
    };
    info!("Prepared createContriboost on {} for {:?}", net.name, req.name);
    Ok(finish(
        net,
        net.contriboost_factory,
        call.abi_encode(),
        U256::ZERO,
        referral,
    ))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGoalFundRequest {
    pub name: String,
    pub description: String,
    pub target_amount: String,
    /// Unix seconds.
    pub deadline: u64,
    pub beneficiary: Address,
    #[serde(default = "default_payment_method")]
    pub payment_method: u8,
    pub token_address: Address,
    /// 0 = grouped, 1 = personal.
    pub fund_type: u8,
}

fn default_payment_method() -> u8 {
    PAYMENT_METHOD_ERC20
}

pub fn create_goal_fund(
    net: &Network,
    req: &CreateGoalFundRequest,
    now: u64,
    referral: Option<&[u8]>,
) -> Result<PreparedTx> {
    check_text(&req.name, &req.description)?;
    let target = amount("Target amount", &req.target_amount)?;
    if target.is_zero() {
        return Err(invalid("Target amount must be greater than 0"));
    }
    if req.deadline <= now {
        return Err(invalid("Deadline must be in the future"));
    }
    if req.beneficiary == Address::ZERO {
        return Err(invalid("Beneficiary must be a valid address"));
    }
    if req.fund_type > 1 {
        return Err(invalid("Fund type must be 0 (grouped) or 1 (personal)"));
    }
    check_token(net, req.payment_method, req.token_address)?;

    let call = IGoalFundFactory::createGoalFundCall {
        name: req.name.trim().to_string(),
        description: req.description.trim().to_string(),
        targetAmount: target,
        deadline: U256::from(req.deadline),
        beneficiary: req.beneficiary,
        paymentMethod: req.payment_method,
        tokenAddress: req.token_address,
        fundType: req.fund_type,
    };
    info!("Prepared createGoalFund on {} for {:?}", net.name, req.name);
    Ok(finish(
        net,
        net.goal_fund_factory,
        call.abi_encode(),
        U256::ZERO,
        referral,
    ))
}

// ─────────────────────────────────────────────────────────
// Instance actions
// ─────────────────────────────────────────────────────────

/// Optional arguments of an instance action; which ones are required
/// depends on the action.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    /// Native value to attach, decimal.
    pub value: Option<String>,
    /// Token amount for `contribute` and `approve`, decimal.
    pub amount: Option<String>,
    pub token: Option<Address>,
    pub description: Option<String>,
    /// Basis points for `setHostFeePercentage`.
    pub fee: Option<u64>,
    pub participant: Option<Address>,
    pub new_owner: Option<Address>,
    pub spender: Option<Address>,
}

fn required<T: Clone>(field: &str, value: &Option<T>) -> Result<T> {
    value
        .clone()
        .ok_or_else(|| invalid(format!("Missing field: {field}")))
}

/// Build the call named `action` against `target`.
///
/// `emergencyWithdraw` targets the Contriboost variant when `token` is
/// given and the GoalFund variant otherwise. `approve` targets an ERC-20.
pub fn prepare_action(
    net: &Network,
    target: Address,
    action: &str,
    req: &ActionRequest,
    referral: Option<&[u8]>,
) -> Result<PreparedTx> {
    let value = match &req.value {
        Some(raw) => amount("Value", raw)?,
        None => U256::ZERO,
    };

    let data = match action {
        "join" => IContriboost::joinCall {}.abi_encode(),
        "deposit" => IContriboost::depositCall {}.abi_encode(),
        "distributeFunds" => IContriboost::distributeFundsCall {}.abi_encode(),
        "checkMissedDeposits" => IContriboost::checkMissedDepositsCall {}.abi_encode(),
        "exitContriboost" => IContriboost::exitContriboostCall {}.abi_encode(),
        "emergencyWithdraw" => match req.token {
            Some(token) => IContriboost::emergencyWithdrawCall { token }.abi_encode(),
            None => IGoalFund::emergencyWithdrawCall {}.abi_encode(),
        },
        "setDescription" => {
            let description = required("description", &req.description)?;
            if description.trim().chars().count() < 10 {
                return Err(invalid("Description must be at least 10 characters"));
            }
            IContriboost::setDescriptionCall {
                newDescription: description.trim().to_string(),
            }
            .abi_encode()
        }
        "setHostFeePercentage" => {
            let fee = required("fee", &req.fee)?;
            if fee > MAX_HOST_FEE_BPS {
                return Err(invalid("Fee must be between 0% and 5%"));
            }
            IContriboost::setHostFeePercentageCall {
                newFee: U256::from(fee),
            }
            .abi_encode()
        }
        "setTokenAddress" => {
            let token = required("token", &req.token)?;
            if !net.accepts_token(token) {
                return Err(invalid(format!("Token {token} is not accepted on {}", net.name)));
            }
            IContriboost::setTokenAddressCall { newToken: token }.abi_encode()
        }
        "reactivateParticipant" => {
            let participant = required("participant", &req.participant)?;
            IContriboost::reactivateParticipantCall { participant }.abi_encode()
        }
        "transferOwnership" => {
            let new_owner = required("newOwner", &req.new_owner)?;
            if new_owner == Address::ZERO {
                return Err(invalid("New owner must be a valid address"));
            }
            IContriboost::transferOwnershipCall { newOwner: new_owner }.abi_encode()
        }
        "contribute" => {
            let contribution = amount("Amount", &required("amount", &req.amount)?)?;
            if contribution.is_zero() {
                return Err(invalid("Amount must be greater than 0"));
            }
            IGoalFund::contributeCall {
                amount: contribution,
            }
            .abi_encode()
        }
        "withdrawFunds" => IGoalFund::withdrawFundsCall {}.abi_encode(),
        "refundContributors" => IGoalFund::refundContributorsCall {}.abi_encode(),
        "approve" => IERC20::approveCall {
            spender: required("spender", &req.spender)?,
            amount: amount("Amount", &required("amount", &req.amount)?)?,
        }
        .abi_encode(),
        other => return Err(GatewayError::NotFound(format!("unknown action: {other}"))),
    };

    debug!("Prepared {action} on {target} ({})", net.name);
    Ok(finish(net, target, data, value, referral))
}

// ─────────────────────────────────────────────────────────
// Receipt resolution
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatedKind {
    Contriboost,
    GoalFund,
}

impl std::str::FromStr for CreatedKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "contriboost" => Ok(Self::Contriboost),
            "goalfund" => Ok(Self::GoalFund),
            other => Err(invalid(format!("unknown contract kind: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedContract {
    pub network: String,
    pub kind: CreatedKind,
    pub transaction_hash: B256,
    pub contract_address: Address,
    /// `false` when the address came from the factory's list instead of
    /// the creation event.
    pub from_event: bool,
}

/// Address announced by the factory's creation event in `receipt`.
pub fn created_address(receipt: &TransactionReceipt, factory: Address, kind: CreatedKind) -> Option<Address> {
    let signature = match kind {
        CreatedKind::Contriboost => IContriboostFactory::ContriboostCreated::SIGNATURE_HASH,
        CreatedKind::GoalFund => IGoalFundFactory::GoalFundCreated::SIGNATURE_HASH,
    };
    receipt
        .logs
        .iter()
        .filter(|log| log.address == factory)
        .find(|log| log.topics.first() == Some(&signature) && log.topics.len() >= 2)
        .map(|log| Address::from_word(log.topics[1]))
}

/// Find the contract created by `tx_hash`.
///
/// Falls back to the factory's most recent entry when the receipt carries
/// no creation event.
pub async fn resolve_created(
    net: &Network,
    reader: &dyn ChainReader,
    tx_hash: B256,
    kind: CreatedKind,
) -> Result<CreatedContract> {
    let receipt = reader
        .receipt(tx_hash)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("No receipt for transaction {tx_hash}")))?;
    if receipt.status == Some(U256::ZERO) {
        return Err(invalid("Transaction reverted"));
    }

    let factory = match kind {
        CreatedKind::Contriboost => net.contriboost_factory,
        CreatedKind::GoalFund => net.goal_fund_factory,
    };

    if let Some(address) = created_address(&receipt, factory, kind) {
        return Ok(CreatedContract {
            network: net.key.clone(),
            kind,
            transaction_hash: receipt.transaction_hash,
            contract_address: address,
            from_event: true,
        });
    }

    warn!("No creation event in {tx_hash} on {}; falling back to factory list", net.name);
    let address = match kind {
        CreatedKind::Contriboost => {
            let count = rpc::call(reader, factory, IContriboostFactory::getContriboostCountCall {})
                .await?
                ._0;
            if count.is_zero() {
                return Err(GatewayError::NotFound("Factory has no Contriboosts".to_string()));
            }
            rpc::call(
                reader,
                factory,
                IContriboostFactory::getContriboostByIndexCall {
                    index: count - U256::from(1u64),
                },
            )
            .await?
            ._0
        }
        CreatedKind::GoalFund => rpc::call(reader, factory, IGoalFundFactory::getGoalFundsCall {})
            .await?
            ._0
            .last()
            .copied()
            .ok_or_else(|| GatewayError::NotFound("Factory has no GoalFunds".to_string()))?,
    };

    Ok(CreatedContract {
        network: net.key.clone(),
        kind,
        transaction_hash: receipt.transaction_hash,
        contract_address: address,
        from_event: false,
    })
}
