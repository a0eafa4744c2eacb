//! Multi-network aggregation of Contriboost pools and GoalFunds.
//!
//! Networks are visited one after another. Within a network each factory
//! is asked for its contracts and the per-contract detail reads fan out in
//! parallel. A contract whose reads fail is logged and skipped; a factory
//! whose listing fails becomes an entry in `fetch_errors`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use futures::future::{join_all, try_join_all};
use reqwest::Client;
use tracing::{debug, warn};

use crate::abi::{
    ContriboostDetails, GoalFundDetails, IContriboost, IContriboostFactory, IGoalFund,
    IGoalFundFactory,
};
use crate::errors::{GatewayError, Result};
use crate::models::{
    format_amount, to_u64, AccountView, ContriboostDetail, ContriboostSummary,
    ContriboostUserStatus, FundType, GoalFundDetail, GoalFundSummary, GoalFundUserStatus,
    NetworkBalance, Participant, PoolDetail, PoolListing, PoolSummary, Stats,
};
use crate::networks::{Network, NetworkRegistry};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::rpc::{self, ChainReader, RpcClient};
use crate::status::{
    fund_actions, fund_status, pool_actions, pool_status, FundViewer, PoolSnapshot, PoolViewer,
};

pub struct Aggregator {
    networks: NetworkRegistry,
    readers: HashMap<String, Arc<dyn ChainReader>>,
    retry: RetryPolicy,
}

impl Aggregator {
    /// Every network in `networks` must have a reader under its key.
    pub fn new(
        networks: NetworkRegistry,
        readers: HashMap<String, Arc<dyn ChainReader>>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        if let Some(missing) = networks.iter().find(|n| !readers.contains_key(&n.key)) {
            return Err(GatewayError::Config(format!(
                "no RPC reader for network {}",
                missing.key
            )));
        }
        Ok(Self {
            networks,
            readers,
            retry,
        })
    }

    /// One HTTP JSON-RPC reader per configured network, sharing `client`.
    pub fn over_http(
        networks: NetworkRegistry,
        client: Client,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let readers = networks
            .iter()
            .map(|n| {
                let reader: Arc<dyn ChainReader> =
                    Arc::new(RpcClient::new(client.clone(), n.rpc_url.clone(), retry));
                (n.key.clone(), reader)
            })
            .collect();
        Self::new(networks, readers, retry)
    }

    pub fn networks(&self) -> &NetworkRegistry {
        &self.networks
    }

    /// Resolve a network key into its config and reader.
    pub fn network(&self, key: &str) -> Result<(&Network, &dyn ChainReader)> {
        let net = self
            .networks
            .get(key)
            .ok_or_else(|| GatewayError::NotFound(format!("unknown network: {key}")))?;
        let reader = self
            .readers
            .get(key)
            .ok_or_else(|| GatewayError::Config(format!("no RPC reader for network {key}")))?;
        Ok((net, reader.as_ref()))
    }

    // ─────────────────────────────────────────────────────
    // Listing
    // ─────────────────────────────────────────────────────

    /// All public pools and grouped funds across every network.
    ///
    /// With a `viewer`, each item also carries that account's status.
    pub async fn list_pools(&self, viewer: Option<Address>, now: u64) -> PoolListing {
        let mut pools = Vec::new();
        let mut fetch_errors = Vec::new();

        for net in self.networks.iter() {
            let (net, reader) = match self.network(&net.key) {
                Ok(pair) => pair,
                Err(e) => {
                    fetch_errors.push(format!("{}: {e}", net.name));
                    continue;
                }
            };

            match contriboosts(net, reader, viewer, now).await {
                Ok(found) => pools.extend(found.into_iter().map(PoolSummary::Contriboost)),
                Err(e) => {
                    warn!("Error fetching {} Contriboost pools: {e}", net.name);
                    fetch_errors.push(format!("{} Contriboost: {e}", net.name));
                }
            }

            match goal_funds(net, reader, viewer, now).await {
                Ok(found) => pools.extend(found.into_iter().map(PoolSummary::GoalFund)),
                Err(e) => {
                    warn!("Error fetching {} GoalFund pools: {e}", net.name);
                    fetch_errors.push(format!("{} GoalFund: {e}", net.name));
                }
            }
        }

        PoolListing {
            pools: dedup(pools),
            fetch_errors,
            refreshed_at: now as i64,
        }
    }

    // ─────────────────────────────────────────────────────
    // Account view
    // ─────────────────────────────────────────────────────

    /// Balances plus the pools and funds `user` belongs to, on every network.
    pub async fn account(&self, user: Address, now: u64) -> AccountView {
        let mut view = AccountView {
            address: user,
            balances: Vec::new(),
            pools: Vec::new(),
            funds: Vec::new(),
            fetch_errors: Vec::new(),
        };

        for net in self.networks.iter() {
            let Ok((net, reader)) = self.network(&net.key) else {
                continue;
            };

            let balance = reader.balance(user).await.unwrap_or_else(|e| {
                warn!("Failed to fetch balance for {user} on {}: {e}", net.name);
                U256::ZERO
            });
            view.balances.push(NetworkBalance {
                network: net.key.clone(),
                chain_id: net.chain_id,
                symbol: net.native_currency.symbol.clone(),
                balance: format_amount(balance),
            });

            let factory = net.contriboost_factory;
            let call = IContriboostFactory::getUserContriboostsCall { user };
            match rpc::call(reader, factory, call).await {
                Ok(addrs) => {
                    let results = join_all(
                        addrs._0
                            .iter()
                            .map(|a| contriboost_summary(net, reader, *a, Some(user), now)),
                    )
                    .await;
                    view.pools.extend(settle(results, net, "Contriboost"));
                }
                Err(e) => {
                    warn!("Failed to fetch Contriboost addresses for {user} on {}: {e}", net.name);
                    view.fetch_errors.push(format!("{} Contriboost: {e}", net.name));
                }
            }

            let factory = net.goal_fund_factory;
            let call = IGoalFundFactory::getUserGoalFundsCall { user };
            match rpc::call(reader, factory, call).await {
                Ok(addrs) => {
                    let results = join_all(
                        addrs._0
                            .iter()
                            .map(|a| user_goal_fund(net, reader, *a, user, now)),
                    )
                    .await;
                    view.funds.extend(settle(results, net, "GoalFund"));
                }
                Err(e) => {
                    warn!("Failed to fetch GoalFund addresses for {user} on {}: {e}", net.name);
                    view.fetch_errors.push(format!("{} GoalFund: {e}", net.name));
                }
            }
        }

        view
    }

    // ─────────────────────────────────────────────────────
    // Detail
    // ─────────────────────────────────────────────────────

    /// Full detail of one contract. Contriboost is tried first, then GoalFund.
    pub async fn pool_detail(
        &self,
        network: &str,
        address: Address,
        viewer: Option<Address>,
        now: u64,
    ) -> Result<PoolDetail> {
        let (net, reader) = self.network(network)?;

        match contriboost_detail(net, reader, address, viewer, now).await {
            Ok(detail) => return Ok(PoolDetail::Contriboost(detail)),
            Err(e) => debug!("{address} on {} is not a Contriboost: {e}", net.name),
        }

        match goal_fund_detail(net, reader, address, viewer, now).await {
            Ok(detail) => Ok(PoolDetail::GoalFund(detail)),
            Err(e) => {
                debug!("{address} on {} is not a GoalFund: {e}", net.name);
                Err(GatewayError::NotFound(
                    "Contract not found or inaccessible".to_string(),
                ))
            }
        }
    }

    /// Whether `user` has joined `pool`, a Contriboost listed by the
    /// network's factory.
    pub async fn is_pool_participant(
        &self,
        network: &str,
        pool: Address,
        user: Address,
    ) -> Result<bool> {
        let (net, reader) = self.network(network)?;
        let listed = rpc::call(
            reader,
            net.contriboost_factory,
            IContriboostFactory::getContriboostsCall {},
        )
        .await?
        ._0;
        if !listed.contains(&pool) {
            return Err(GatewayError::Validation(
                "Invalid Contriboost contract".to_string(),
            ));
        }
        let status = rpc::call(
            reader,
            pool,
            IContriboost::getParticipantStatusCall { participant: user },
        )
        .await?;
        Ok(status.exists)
    }

    // ─────────────────────────────────────────────────────
    // Statistics
    // ─────────────────────────────────────────────────────

    /// Totals over a complete listing. Partial listings are retried.
    pub async fn stats(&self, now: u64) -> Result<Stats> {
        let listing = retry_with_backoff(self.retry, move || async move {
            let listing = self.list_pools(None, now).await;
            if listing.fetch_errors.is_empty() {
                Ok(listing)
            } else {
                Err(GatewayError::Transient(listing.fetch_errors.join("; ")))
            }
        })
        .await?;
        Ok(compute_stats(&listing.pools, self.networks.iter().count()))
    }
}

// ─────────────────────────────────────────────────────────
// Pure helpers
// ─────────────────────────────────────────────────────────

/// Drop repeated `(network, contract)` pairs, keeping the first.
pub fn dedup(pools: Vec<PoolSummary>) -> Vec<PoolSummary> {
    let mut seen = HashSet::new();
    pools
        .into_iter()
        .filter(|p| {
            let key = (p.network().to_string(), p.contract_address());
            if seen.insert(key) {
                true
            } else {
                warn!("Duplicate pool found: {}-{}", p.contract_address(), p.network());
                false
            }
        })
        .collect()
}

/// Apply the listing's search box and status filter. `"all"` disables the
/// status filter.
pub fn filter_pools(
    pools: &[PoolSummary],
    search: Option<&str>,
    status: Option<&str>,
) -> Vec<PoolSummary> {
    let search = search.map(str::trim).filter(|s| !s.is_empty());
    let status = status.filter(|s| *s != "all");
    pools
        .iter()
        .filter(|p| search.map_or(true, |q| p.matches_search(q)))
        .filter(|p| status.map_or(true, |s| p.status().as_str() == s))
        .cloned()
        .collect()
}

pub fn compute_stats(pools: &[PoolSummary], networks: usize) -> Stats {
    let mut stats = Stats {
        networks,
        ..Stats::default()
    };
    let mut pools_by_status = BTreeMap::new();
    let mut funds_by_status = BTreeMap::new();
    for p in pools {
        match p {
            PoolSummary::Contriboost(c) => {
                stats.total_pools += 1;
                stats.total_participants += c.current_participants;
                *pools_by_status.entry(c.status.as_str().to_string()).or_insert(0) += 1;
            }
            PoolSummary::GoalFund(f) => {
                stats.total_funds += 1;
                *funds_by_status.entry(f.status.as_str().to_string()).or_insert(0) += 1;
            }
        }
    }
    stats.pools_by_status = pools_by_status;
    stats.funds_by_status = funds_by_status;
    stats
}

/// Keep successful items, log failures.
fn settle<T>(results: Vec<Result<Option<T>>>, net: &Network, kind: &str) -> Vec<T> {
    results
        .into_iter()
        .filter_map(|r| match r {
            Ok(item) => item,
            Err(e) => {
                warn!("Error processing {kind} on {}: {e}", net.name);
                None
            }
        })
        .collect()
}

// ─────────────────────────────────────────────────────────
// Per-network reads
// ─────────────────────────────────────────────────────────

async fn contriboosts(
    net: &Network,
    reader: &dyn ChainReader,
    viewer: Option<Address>,
    now: u64,
) -> Result<Vec<ContriboostSummary>> {
    let addresses = rpc::call(
        reader,
        net.contriboost_factory,
        IContriboostFactory::getContriboostsCall {},
    )
    .await?
    ._0;
    debug!("{} Contriboost addresses on {}", addresses.len(), net.name);

    let results = join_all(
        addresses
            .iter()
            .map(|a| contriboost_summary(net, reader, *a, viewer, now)),
    )
    .await;
    Ok(settle(results, net, "Contriboost"))
}

async fn goal_funds(
    net: &Network,
    reader: &dyn ChainReader,
    viewer: Option<Address>,
    now: u64,
) -> Result<Vec<GoalFundSummary>> {
    let all = rpc::call(
        reader,
        net.goal_fund_factory,
        IGoalFundFactory::getAllGoalFundsDetailsCall {},
    )
    .await?
    ._0;
    debug!("{} GoalFunds on {}", all.len(), net.name);

    // Personal funds stay out of the public listing.
    let results = join_all(
        all.into_iter()
            .filter(|d| FundType::from_raw(d.fundType) == FundType::Grouped)
            .map(|d| goal_fund_summary(net, reader, d, viewer, now)),
    )
    .await;
    Ok(settle(results, net, "GoalFund"))
}

async fn contriboost_summary(
    net: &Network,
    reader: &dyn ChainReader,
    address: Address,
    viewer: Option<Address>,
    now: u64,
) -> Result<Option<ContriboostSummary>> {
    let details = rpc::call(
        reader,
        net.contriboost_factory,
        IContriboostFactory::getContriboostDetailsCall {
            contriboost: address,
            all: false,
        },
    )
    .await?
    ._0;
    let Some(details) = details.into_iter().next() else {
        warn!("No details returned for Contriboost at {address} on {}", net.name);
        return Ok(None);
    };

    let (participants, segment, start) = futures::join!(
        rpc::call(reader, address, IContriboost::getActiveParticipantsCall {}),
        rpc::call(reader, address, IContriboost::currentSegmentCall {}),
        rpc::call(reader, address, IContriboost::startTimestampCall {}),
    );
    let fallback = |what: &str, e: GatewayError| {
        warn!("Failed to fetch {what} for Contriboost at {address} on {}: {e}", net.name);
    };
    let participants = participants.map(|r| r._0.len() as u64).unwrap_or_else(|e| {
        fallback("participants", e);
        0
    });
    let segment = segment.map(|r| to_u64(r._0)).unwrap_or_else(|e| {
        fallback("current segment", e);
        0
    });
    let start = start.map(|r| to_u64(r._0)).unwrap_or_else(|e| {
        fallback("start timestamp", e);
        0
    });

    let user_status = match viewer {
        Some(user) => Some(
            match rpc::call(
                reader,
                address,
                IContriboost::getParticipantStatusCall { participant: user },
            )
            .await
            {
                Ok(s) => ContriboostUserStatus {
                    is_participant: s.exists,
                    has_received_funds: s.receivedFunds,
                },
                Err(e) => {
                    fallback("participant status", e);
                    ContriboostUserStatus::default()
                }
            },
        ),
        None => None,
    };

    let snapshot = PoolSnapshot {
        start_timestamp: start,
        current_segment: segment,
        participants,
        expected_number: to_u64(details.expectedNumber),
    };
    Ok(Some(build_contriboost_summary(
        net,
        &details,
        &snapshot,
        pool_status(&snapshot, now),
        user_status,
    )))
}

fn build_contriboost_summary(
    net: &Network,
    details: &ContriboostDetails,
    snapshot: &PoolSnapshot,
    status: crate::status::PoolStatus,
    user_status: Option<ContriboostUserStatus>,
) -> ContriboostSummary {
    ContriboostSummary {
        network: net.key.clone(),
        chain_id: net.chain_id,
        contract_address: details.contractAddress,
        name: non_empty(&details.name, "Unnamed Pool"),
        day_range: to_u64(details.dayRange),
        expected_number: snapshot.expected_number,
        contribution_amount: format_amount(details.contributionAmount),
        token_address: details.tokenAddress,
        token_symbol: net.symbol_for(details.tokenAddress).to_string(),
        host_fee_percentage: to_u64(details.hostFeePercentage),
        platform_fee_percentage: to_u64(details.platformFeePercentage),
        max_missed_deposits: to_u64(details.maxMissedDeposits),
        current_participants: snapshot.participants,
        status,
        user_status,
    }
}

async fn user_goal_fund(
    net: &Network,
    reader: &dyn ChainReader,
    address: Address,
    user: Address,
    now: u64,
) -> Result<Option<GoalFundSummary>> {
    let details = rpc::call(
        reader,
        net.goal_fund_factory,
        IGoalFundFactory::getGoalFundDetailsCall {
            goalFund: address,
            all: false,
        },
    )
    .await?
    ._0;
    match details.into_iter().next() {
        Some(d) => goal_fund_summary(net, reader, d, Some(user), now).await,
        None => {
            warn!("No details returned for GoalFund at {address} on {}", net.name);
            Ok(None)
        }
    }
}

async fn goal_fund_summary(
    net: &Network,
    reader: &dyn ChainReader,
    details: GoalFundDetails,
    viewer: Option<Address>,
    now: u64,
) -> Result<Option<GoalFundSummary>> {
    let address = details.contractAddress;
    let fund_type = FundType::from_raw(details.fundType);

    let achieved = match rpc::call(reader, address, IGoalFund::goalCall {}).await {
        Ok(goal) => goal.achieved,
        Err(e) => {
            warn!("Failed to fetch goal for GoalFund at {address} on {}: {e}", net.name);
            false
        }
    };

    let tags = if fund_type == FundType::Grouped {
        rpc::call(reader, address, IGoalFund::getTagsCall {})
            .await
            .map(|r| r._0)
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let user_status = match viewer {
        Some(user) => Some(
            match rpc::call(reader, address, IGoalFund::contributionsCall { contributor: user })
                .await
            {
                Ok(r) => GoalFundUserStatus {
                    is_participant: r._0 > U256::ZERO,
                    contribution_amount: format_amount(r._0),
                },
                Err(e) => {
                    warn!("Failed to fetch contribution for {address} on {}: {e}", net.name);
                    GoalFundUserStatus::default()
                }
            },
        ),
        None => None,
    };

    let deadline = to_u64(details.deadline);
    Ok(Some(build_goal_fund_summary(
        net,
        &details,
        details.currentAmount,
        fund_status(achieved, deadline, now),
        user_status,
        tags,
    )))
}

fn build_goal_fund_summary(
    net: &Network,
    details: &GoalFundDetails,
    current_amount: U256,
    status: crate::status::FundStatus,
    user_status: Option<GoalFundUserStatus>,
    tags: Vec<String>,
) -> GoalFundSummary {
    GoalFundSummary {
        network: net.key.clone(),
        chain_id: net.chain_id,
        contract_address: details.contractAddress,
        name: non_empty(&details.name, "Unnamed Fund"),
        target_amount: format_amount(details.targetAmount),
        current_amount: format_amount(current_amount),
        deadline: to_u64(details.deadline),
        beneficiary: details.beneficiary,
        token_address: details.tokenAddress,
        token_symbol: net.symbol_for(details.tokenAddress).to_string(),
        fund_type: FundType::from_raw(details.fundType),
        platform_fee_percentage: to_u64(details.platformFeePercentage),
        status,
        user_status,
        tags,
    }
}

async fn contriboost_detail(
    net: &Network,
    reader: &dyn ChainReader,
    address: Address,
    viewer: Option<Address>,
    now: u64,
) -> Result<ContriboostDetail> {
    let details = rpc::call(
        reader,
        net.contriboost_factory,
        IContriboostFactory::getSingleContriboostDetailsCall {
            contriboost: address,
        },
    )
    .await?
    ._0;

    let (description, segment, start, host, active, all) = futures::try_join!(
        rpc::call(reader, address, IContriboost::descriptionCall {}),
        rpc::call(reader, address, IContriboost::currentSegmentCall {}),
        rpc::call(reader, address, IContriboost::startTimestampCall {}),
        rpc::call(reader, address, IContriboost::hostCall {}),
        rpc::call(reader, address, IContriboost::getActiveParticipantsCall {}),
        rpc::call(reader, address, IContriboost::getAllParticipantsCall {}),
    )?;
    let host = host._0;

    let participants = try_join_all(all._0.iter().map(|p| async move {
        let s = rpc::call(
            reader,
            address,
            IContriboost::participantsCall { participant: *p },
        )
        .await?;
        Ok::<_, GatewayError>(Participant {
            address: *p,
            id: to_u64(s.id),
            deposit_amount: format_amount(s.depositAmount),
            last_deposit_time: to_u64(s.lastDepositTime),
            exists: s.exists,
            received_funds: s.receivedFunds,
            active: s.active,
            missed_deposits: to_u64(s.missedDeposits),
        })
    }))
    .await?;

    let viewer_status = match viewer {
        Some(user) => {
            let s = rpc::call(
                reader,
                address,
                IContriboost::getParticipantStatusCall { participant: user },
            )
            .await?;
            Some(PoolViewer {
                is_participant: s.exists,
                is_active: s.active,
                has_received_funds: s.receivedFunds,
                missed_deposits: to_u64(s.missedDeposits),
                is_host: user == host,
            })
        }
        None => None,
    };

    let snapshot = PoolSnapshot {
        start_timestamp: to_u64(start._0),
        current_segment: to_u64(segment._0),
        participants: active._0.len() as u64,
        expected_number: to_u64(details.expectedNumber),
    };
    let status = pool_status(&snapshot, now);
    let user_status = viewer_status.map(|v| ContriboostUserStatus {
        is_participant: v.is_participant,
        has_received_funds: v.has_received_funds,
    });

    Ok(ContriboostDetail {
        summary: build_contriboost_summary(net, &details, &snapshot, status, user_status),
        description: non_empty(&description._0, "No description provided"),
        current_segment: snapshot.current_segment,
        start_timestamp: snapshot.start_timestamp,
        host,
        participants,
        actions: pool_actions(
            status,
            snapshot.participants,
            snapshot.expected_number,
            viewer_status.as_ref(),
        ),
        viewer: viewer_status,
    })
}

async fn goal_fund_detail(
    net: &Network,
    reader: &dyn ChainReader,
    address: Address,
    viewer: Option<Address>,
    now: u64,
) -> Result<GoalFundDetail> {
    let details = rpc::call(
        reader,
        net.goal_fund_factory,
        IGoalFundFactory::getSingleGoalFundDetailsCall { goalFund: address },
    )
    .await?
    ._0;

    let (balance, contributors, goal, owner) = futures::try_join!(
        rpc::call(reader, address, IGoalFund::getBalanceCall {}),
        rpc::call(reader, address, IGoalFund::getContributorCountCall {}),
        rpc::call(reader, address, IGoalFund::goalCall {}),
        rpc::call(reader, address, IGoalFund::ownerCall {}),
    )?;
    let owner = owner._0;

    let contribution = match viewer {
        Some(user) => {
            rpc::call(reader, address, IGoalFund::contributionsCall { contributor: user })
                .await?
                ._0
        }
        None => U256::ZERO,
    };

    let viewer_status = viewer.map(|user| FundViewer {
        has_contributed: contribution > U256::ZERO,
        is_owner: user == owner,
        is_beneficiary: user == details.beneficiary,
    });
    // The fund's own goal() is authoritative, as in the listing.
    let status = fund_status(goal.achieved, to_u64(details.deadline), now);
    let user_status = viewer.map(|_| GoalFundUserStatus {
        is_participant: contribution > U256::ZERO,
        contribution_amount: format_amount(contribution),
    });
    let tags = if FundType::from_raw(details.fundType) == FundType::Grouped {
        rpc::call(reader, address, IGoalFund::getTagsCall {})
            .await
            .map(|r| r._0)
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    Ok(GoalFundDetail {
        summary: build_goal_fund_summary(net, &details, balance._0, status, user_status, tags),
        description: non_empty(&goal.description, "No description provided"),
        contributors: to_u64(contributors._0),
        user_contribution: format_amount(contribution),
        achieved: goal.achieved,
        funds_withdrawn: goal.fundsWithdrawn,
        owner,
        actions: fund_actions(status, goal.fundsWithdrawn, viewer_status.as_ref()),
        viewer: viewer_status,
    })
}

fn non_empty(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

// ─────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{FundStatus, PoolStatus};
    use alloy_sol_types::SolCall;

    use crate::testutil::*;

    #[tokio::test]
    async fn listing_derives_status_and_skips_personal_funds() {
        let fx = Fixture::new();
        let listing = fx.aggregator().list_pools(None, NOW).await;

        assert!(listing.fetch_errors.is_empty());
        assert_eq!(listing.pools.len(), 2);

        let PoolSummary::Contriboost(pool) = &listing.pools[0] else {
            panic!("expected Contriboost first");
        };
        assert_eq!(pool.contract_address, POOL);
        assert_eq!(pool.status, PoolStatus::Active);
        assert_eq!(pool.current_participants, 2);
        assert_eq!(pool.contribution_amount, "1.5");
        assert_eq!(pool.token_symbol, "cUSD");
        assert!(pool.user_status.is_none());

        let PoolSummary::GoalFund(fund) = &listing.pools[1] else {
            panic!("expected GoalFund second");
        };
        assert_eq!(fund.contract_address, GROUP_FUND);
        assert_eq!(fund.status, FundStatus::Active);
        assert_eq!(fund.tags, vec!["school".to_string()]);
    }

    #[tokio::test]
    async fn viewer_status_is_attached() {
        let fx = Fixture::new();
        let listing = fx.aggregator().list_pools(Some(MEMBER), NOW).await;
        let PoolSummary::Contriboost(pool) = &listing.pools[0] else {
            panic!("expected Contriboost first");
        };
        let status = pool.user_status.as_ref().unwrap();
        assert!(status.is_participant);
        assert!(!status.has_received_funds);

        let PoolSummary::GoalFund(fund) = &listing.pools[1] else {
            panic!("expected GoalFund second");
        };
        let status = fund.user_status.as_ref().unwrap();
        assert!(status.is_participant);
        assert_eq!(status.contribution_amount, "2.0");
    }

    #[tokio::test]
    async fn failing_pool_is_skipped_not_fatal() {
        let mut fx = Fixture::new();
        fx.add_contriboost_address(BROKEN_POOL);
        let listing = fx.aggregator().list_pools(None, NOW).await;
        assert!(listing.fetch_errors.is_empty());
        assert_eq!(listing.pools.len(), 2);
        assert!(listing.pools.iter().all(|p| p.contract_address() != BROKEN_POOL));
    }

    #[tokio::test]
    async fn failing_factory_becomes_fetch_error() {
        let mut fx = Fixture::new();
        fx.chain.forget(
            CONTRIBOOST_FACTORY,
            IContriboostFactory::getContriboostsCall {},
        );
        let listing = fx.aggregator().list_pools(None, NOW).await;
        assert_eq!(listing.fetch_errors.len(), 1);
        assert!(listing.fetch_errors[0].starts_with("Testnet Contriboost:"));
        assert_eq!(listing.pools.len(), 1);
    }

    #[tokio::test]
    async fn secondary_read_failure_falls_back_to_zero() {
        let mut fx = Fixture::new();
        fx.chain.forget(POOL, IContriboost::currentSegmentCall {});
        let listing = fx.aggregator().list_pools(None, NOW).await;
        let PoolSummary::Contriboost(pool) = &listing.pools[0] else {
            panic!("expected Contriboost first");
        };
        assert_eq!(pool.status, PoolStatus::NotStarted);
    }

    fn detail_status(detail: PoolDetail) -> FundStatus {
        let PoolDetail::GoalFund(d) = detail else {
            panic!("expected GoalFund detail");
        };
        d.summary.status
    }

    #[tokio::test]
    async fn fund_status_follows_goal_in_every_view() {
        let mut fx = Fixture::new();
        let details = fund_details(GROUP_FUND, 0);
        set_goal(&mut fx.chain, &details, true);
        let agg = fx.aggregator();

        let listing = agg.list_pools(None, NOW).await;
        let PoolSummary::GoalFund(fund) = &listing.pools[1] else {
            panic!("expected GoalFund second");
        };
        assert_eq!(fund.status, FundStatus::Achieved);

        let detail = agg.pool_detail("testnet", GROUP_FUND, None, NOW).await.unwrap();
        let PoolDetail::GoalFund(d) = detail else {
            panic!("expected GoalFund detail");
        };
        assert!(d.achieved);
        assert_eq!(d.summary.status, FundStatus::Achieved);
    }

    #[tokio::test]
    async fn factory_achieved_flag_is_ignored() {
        let mut fx = Fixture::new();
        let mut group = fund_details(GROUP_FUND, 0);
        group.achieved = true;
        set_fund_details(&mut fx.chain, &group);
        fx.chain.on(
            GOAL_FUND_FACTORY,
            IGoalFundFactory::getAllGoalFundsDetailsCall {},
            IGoalFundFactory::getAllGoalFundsDetailsCall::abi_encode_returns(&(vec![
                group,
                fund_details(PERSONAL_FUND, 1),
            ],)),
        );
        let agg = fx.aggregator();

        let listing = agg.list_pools(None, NOW).await;
        assert_eq!(listing.pools[1].status().as_str(), "active");
        let detail = agg.pool_detail("testnet", GROUP_FUND, None, NOW).await.unwrap();
        assert_eq!(detail_status(detail), FundStatus::Active);
    }

    #[tokio::test]
    async fn failed_goal_read_counts_as_not_achieved() {
        let mut fx = Fixture::new();
        let mut group = fund_details(GROUP_FUND, 0);
        group.achieved = true;
        fx.chain.on(
            GOAL_FUND_FACTORY,
            IGoalFundFactory::getAllGoalFundsDetailsCall {},
            IGoalFundFactory::getAllGoalFundsDetailsCall::abi_encode_returns(&(vec![group],)),
        );
        fx.chain.forget(GROUP_FUND, IGoalFund::goalCall {});

        let listing = fx.aggregator().list_pools(None, NOW).await;
        let PoolSummary::GoalFund(fund) = &listing.pools[1] else {
            panic!("expected GoalFund second");
        };
        assert_eq!(fund.status, FundStatus::Active);
    }

    #[tokio::test]
    async fn duplicates_are_removed() {
        let mut fx = Fixture::new();
        fx.add_contriboost_address(POOL);
        let listing = fx.aggregator().list_pools(None, NOW).await;
        assert_eq!(listing.pools.len(), 2);
    }

    #[tokio::test]
    async fn detail_resolves_contriboost_with_permissions() {
        let fx = Fixture::new();
        let detail = fx
            .aggregator()
            .pool_detail("testnet", POOL, Some(HOST), NOW)
            .await
            .unwrap();
        let PoolDetail::Contriboost(d) = detail else {
            panic!("expected Contriboost detail");
        };
        assert_eq!(d.host, HOST);
        assert_eq!(d.participants.len(), 2);
        assert_eq!(d.description, "Weekly savings circle");
        assert!(d.viewer.unwrap().is_host);
        assert!(d.actions.can_distribute);
        assert!(d.actions.can_join);
    }

    #[tokio::test]
    async fn detail_falls_back_to_goal_fund() {
        let fx = Fixture::new();
        let detail = fx
            .aggregator()
            .pool_detail("testnet", GROUP_FUND, Some(MEMBER), NOW)
            .await
            .unwrap();
        let PoolDetail::GoalFund(d) = detail else {
            panic!("expected GoalFund detail");
        };
        assert_eq!(d.contributors, 3);
        assert_eq!(d.user_contribution, "2.0");
        assert!(d.viewer.unwrap().has_contributed);
        assert!(d.actions.can_contribute);
        assert!(!d.actions.can_withdraw);
    }

    #[tokio::test]
    async fn detail_of_unknown_contract_is_not_found() {
        let fx = Fixture::new();
        let err = fx
            .aggregator()
            .pool_detail("testnet", BROKEN_POOL, None, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
        let err = fx
            .aggregator()
            .pool_detail("mainnet", POOL, None, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn account_view_lists_memberships_and_balance() {
        let fx = Fixture::new();
        let view = fx.aggregator().account(MEMBER, NOW).await;
        assert_eq!(view.balances.len(), 1);
        assert_eq!(view.balances[0].balance, "3.0");
        assert_eq!(view.pools.len(), 1);
        assert_eq!(view.funds.len(), 1);
        assert_eq!(view.funds[0].fund_type, FundType::Personal);
        assert!(view.fetch_errors.is_empty());
    }

    #[tokio::test]
    async fn participant_check_requires_listed_pool() {
        let fx = Fixture::new();
        let agg = fx.aggregator();
        assert!(agg.is_pool_participant("testnet", POOL, MEMBER).await.unwrap());
        assert!(!agg.is_pool_participant("testnet", POOL, OUTSIDER).await.unwrap());
        assert!(matches!(
            agg.is_pool_participant("testnet", GROUP_FUND, MEMBER).await,
            Err(GatewayError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn stats_count_by_status() {
        let fx = Fixture::new();
        let stats = fx.aggregator().stats(NOW).await.unwrap();
        assert_eq!(stats.total_pools, 1);
        assert_eq!(stats.total_funds, 1);
        assert_eq!(stats.total_participants, 2);
        assert_eq!(stats.pools_by_status.get("active"), Some(&1));
        assert_eq!(stats.funds_by_status.get("active"), Some(&1));
    }

    #[tokio::test]
    async fn stats_fail_after_retries_on_partial_listing() {
        let mut fx = Fixture::new();
        fx.chain.forget(
            GOAL_FUND_FACTORY,
            IGoalFundFactory::getAllGoalFundsDetailsCall {},
        );
        let err = fx.aggregator().stats(NOW).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transient(_)));
    }

    #[tokio::test]
    async fn filter_by_search_and_status() {
        let fx = Fixture::new();
        let listing = fx.aggregator().list_pools(None, NOW).await;

        assert_eq!(filter_pools(&listing.pools, None, Some("all")).len(), 2);
        assert_eq!(filter_pools(&listing.pools, Some("circle"), None).len(), 1);
        assert_eq!(filter_pools(&listing.pools, Some("SCHOOL"), None).len(), 1);
        assert_eq!(filter_pools(&listing.pools, None, Some("full")).len(), 0);
        assert_eq!(filter_pools(&listing.pools, Some("  "), Some("active")).len(), 2);
    }
}
