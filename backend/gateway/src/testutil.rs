//! In-memory chain and canned deployments shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{address, Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;

use crate::abi::{ContriboostDetails, GoalFundDetails, IContriboost, IContriboostFactory, IGoalFund, IGoalFundFactory};
use crate::aggregator::Aggregator;
use crate::errors::{GatewayError, Result};
use crate::networks::{NativeCurrency, Network, NetworkRegistry};
use crate::retry::RetryPolicy;
use crate::rpc::{ChainReader, TransactionReceipt};

pub const NOW: u64 = 1_700_000_000;

pub const CONTRIBOOST_FACTORY: Address = address!("00000000000000000000000000000000000000c1");
pub const GOAL_FUND_FACTORY: Address = address!("00000000000000000000000000000000000000c2");
pub const TOKEN: Address = address!("00000000000000000000000000000000000000e2");
pub const POOL: Address = address!("0000000000000000000000000000000000000a01");
pub const BROKEN_POOL: Address = address!("0000000000000000000000000000000000000a02");
pub const GROUP_FUND: Address = address!("0000000000000000000000000000000000000b01");
pub const PERSONAL_FUND: Address = address!("0000000000000000000000000000000000000b02");
pub const HOST: Address = address!("0000000000000000000000000000000000001001");
pub const MEMBER: Address = address!("0000000000000000000000000000000000001002");
pub const OTHER_MEMBER: Address = address!("0000000000000000000000000000000000001003");
pub const OUTSIDER: Address = address!("0000000000000000000000000000000000001004");

pub fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

/// `eth_call` answers keyed on `(to, calldata)`. Unknown calls revert.
///
/// Clones share the call counter.
#[derive(Debug, Clone, Default)]
pub struct MockChain {
    calls: HashMap<(Address, Vec<u8>), Vec<u8>>,
    served: Arc<AtomicUsize>,
    balances: HashMap<Address, U256>,
    receipts: HashMap<B256, TransactionReceipt>,
}

impl MockChain {
    /// Answer `call` on `to` with already ABI-encoded return data.
    pub fn on<C: SolCall>(&mut self, to: Address, call: C, ret: Vec<u8>) {
        self.calls.insert((to, call.abi_encode()), ret);
    }

    pub fn forget<C: SolCall>(&mut self, to: Address, call: C) {
        self.calls.remove(&(to, call.abi_encode()));
    }

    pub fn set_balance(&mut self, account: Address, balance: U256) {
        self.balances.insert(account, balance);
    }

    /// Number of `eth_call`s answered so far, reverts included.
    pub fn calls_served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    pub fn set_receipt(&mut self, receipt: TransactionReceipt) {
        self.receipts.insert(receipt.transaction_hash, receipt);
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.served.fetch_add(1, Ordering::SeqCst);
        // Let concurrent callers interleave the way real RPC round trips do.
        tokio::task::yield_now().await;
        self.calls
            .get(&(to, data.to_vec()))
            .map(|ret| Bytes::from(ret.clone()))
            .ok_or_else(|| GatewayError::Rpc("RPC hard error 3: execution reverted".to_string()))
    }

    async fn balance(&self, account: Address) -> Result<U256> {
        Ok(self.balances.get(&account).copied().unwrap_or_default())
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<TransactionReceipt>> {
        Ok(self.receipts.get(&tx_hash).cloned())
    }
}

pub fn test_network() -> Network {
    Network {
        key: "testnet".into(),
        chain_id: 31337,
        name: "Testnet".into(),
        rpc_url: "http://127.0.0.1:8545".into(),
        block_explorer_url: "http://127.0.0.1:4000".into(),
        contriboost_factory: CONTRIBOOST_FACTORY,
        goal_fund_factory: GOAL_FUND_FACTORY,
        token_address: TOKEN,
        token_symbol: "cUSD".into(),
        native_currency: NativeCurrency {
            name: "Ether".into(),
            symbol: "ETH".into(),
            decimals: 18,
        },
        accepted_tokens: vec![TOKEN],
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

/// One pool with two members, one grouped fund and one personal fund.
pub struct Fixture {
    pub chain: MockChain,
    contriboosts: Vec<Address>,
}

impl Fixture {
    pub fn new() -> Self {
        let mut chain = MockChain::default();
        chain.set_balance(MEMBER, ether(3));
        seed_pool(&mut chain);
        seed_funds(&mut chain);
        let mut fx = Self {
            chain,
            contriboosts: Vec::new(),
        };
        fx.add_contriboost_address(POOL);
        fx
    }

    /// Append `address` to the factory's `getContriboosts` answer.
    pub fn add_contriboost_address(&mut self, address: Address) {
        self.contriboosts.push(address);
        self.chain.on(
            CONTRIBOOST_FACTORY,
            IContriboostFactory::getContriboostsCall {},
            IContriboostFactory::getContriboostsCall::abi_encode_returns(&(self
                .contriboosts
                .clone(),)),
        );
    }

    pub fn registry(&self) -> NetworkRegistry {
        NetworkRegistry::new(vec![test_network()]).unwrap()
    }

    pub fn aggregator(&self) -> Aggregator {
        let reader: Arc<dyn ChainReader> = Arc::new(self.chain.clone());
        Aggregator::new(
            self.registry(),
            HashMap::from([("testnet".to_string(), reader)]),
            fast_retry(),
        )
        .unwrap()
    }
}

pub fn pool_details() -> ContriboostDetails {
    ContriboostDetails {
        contractAddress: POOL,
        name: "Savings circle".into(),
        dayRange: U256::from(7u64),
        expectedNumber: U256::from(5u64),
        contributionAmount: ether(3) / U256::from(2u64),
        tokenAddress: TOKEN,
        hostFeePercentage: U256::from(200u64),
        platformFeePercentage: U256::from(100u64),
        maxMissedDeposits: U256::from(2u64),
    }
}

fn participant_status(exists: bool) -> (U256, U256, U256, bool, bool, bool, U256) {
    (
        U256::from(u64::from(exists)),
        if exists { ether(1) } else { U256::ZERO },
        U256::from(NOW - 100),
        exists,
        false,
        exists,
        U256::ZERO,
    )
}

fn seed_pool(chain: &mut MockChain) {
    use IContriboost as C;
    use IContriboostFactory as F;

    chain.on(
        CONTRIBOOST_FACTORY,
        F::getContriboostDetailsCall {
            contriboost: POOL,
            all: false,
        },
        F::getContriboostDetailsCall::abi_encode_returns(&(vec![pool_details()],)),
    );
    chain.on(
        CONTRIBOOST_FACTORY,
        F::getSingleContriboostDetailsCall { contriboost: POOL },
        F::getSingleContriboostDetailsCall::abi_encode_returns(&(pool_details(),)),
    );
    chain.on(
        CONTRIBOOST_FACTORY,
        F::getUserContriboostsCall { user: MEMBER },
        F::getUserContriboostsCall::abi_encode_returns(&(vec![POOL],)),
    );

    let members = vec![MEMBER, OTHER_MEMBER];
    chain.on(
        POOL,
        C::getActiveParticipantsCall {},
        C::getActiveParticipantsCall::abi_encode_returns(&(members.clone(),)),
    );
    chain.on(
        POOL,
        C::getAllParticipantsCall {},
        C::getAllParticipantsCall::abi_encode_returns(&(members.clone(),)),
    );
    chain.on(
        POOL,
        C::currentSegmentCall {},
        C::currentSegmentCall::abi_encode_returns(&(U256::from(1u64),)),
    );
    chain.on(
        POOL,
        C::startTimestampCall {},
        C::startTimestampCall::abi_encode_returns(&(U256::from(NOW - 1_000),)),
    );
    chain.on(
        POOL,
        C::descriptionCall {},
        C::descriptionCall::abi_encode_returns(&("Weekly savings circle".to_string(),)),
    );
    chain.on(POOL, C::hostCall {}, C::hostCall::abi_encode_returns(&(HOST,)));

    for member in &members {
        chain.on(
            POOL,
            C::participantsCall {
                participant: *member,
            },
            C::participantsCall::abi_encode_returns(&participant_status(true)),
        );
    }
    for (viewer, exists) in [(MEMBER, true), (OTHER_MEMBER, true), (HOST, false), (OUTSIDER, false)] {
        chain.on(
            POOL,
            C::getParticipantStatusCall { participant: viewer },
            C::getParticipantStatusCall::abi_encode_returns(&participant_status(exists)),
        );
    }
}

pub fn fund_details(address: Address, fund_type: u8) -> GoalFundDetails {
    GoalFundDetails {
        contractAddress: address,
        name: if fund_type == 0 {
            "Class trip".into()
        } else {
            "Rainy day".into()
        },
        targetAmount: ether(10),
        currentAmount: ether(2),
        deadline: U256::from(NOW + 86_400),
        beneficiary: HOST,
        tokenAddress: Address::ZERO,
        fundType: fund_type,
        platformFeePercentage: U256::from(100u64),
        achieved: false,
    }
}

/// Answer the fund's own `goal()` read.
pub fn set_goal(chain: &mut MockChain, details: &GoalFundDetails, achieved: bool) {
    chain.on(
        details.contractAddress,
        IGoalFund::goalCall {},
        IGoalFund::goalCall::abi_encode_returns(&(
            details.name.clone(),
            "Trip savings".to_string(),
            details.targetAmount,
            details.currentAmount,
            details.deadline,
            achieved,
            false,
        )),
    );
}

/// Replace the factory's answers for one fund's details.
pub fn set_fund_details(chain: &mut MockChain, details: &GoalFundDetails) {
    use IGoalFundFactory as F;

    let fund = details.contractAddress;
    chain.on(
        GOAL_FUND_FACTORY,
        F::getGoalFundDetailsCall {
            goalFund: fund,
            all: false,
        },
        F::getGoalFundDetailsCall::abi_encode_returns(&(vec![details.clone()],)),
    );
    chain.on(
        GOAL_FUND_FACTORY,
        F::getSingleGoalFundDetailsCall { goalFund: fund },
        F::getSingleGoalFundDetailsCall::abi_encode_returns(&(details.clone(),)),
    );
}

fn seed_funds(chain: &mut MockChain) {
    use IGoalFund as G;
    use IGoalFundFactory as F;

    chain.on(
        GOAL_FUND_FACTORY,
        F::getAllGoalFundsDetailsCall {},
        F::getAllGoalFundsDetailsCall::abi_encode_returns(&(vec![
            fund_details(GROUP_FUND, 0),
            fund_details(PERSONAL_FUND, 1),
        ],)),
    );
    chain.on(
        GOAL_FUND_FACTORY,
        F::getUserGoalFundsCall { user: MEMBER },
        F::getUserGoalFundsCall::abi_encode_returns(&(vec![PERSONAL_FUND],)),
    );

    for (fund, fund_type) in [(GROUP_FUND, 0u8), (PERSONAL_FUND, 1u8)] {
        let details = fund_details(fund, fund_type);
        set_fund_details(chain, &details);
        set_goal(chain, &details, false);
        chain.on(
            fund,
            G::contributionsCall {
                contributor: MEMBER,
            },
            G::contributionsCall::abi_encode_returns(&(ether(2),)),
        );
        chain.on(fund, G::getBalanceCall {}, G::getBalanceCall::abi_encode_returns(&(ether(2),)));
        chain.on(
            fund,
            G::getContributorCountCall {},
            G::getContributorCountCall::abi_encode_returns(&(U256::from(3u64),)),
        );
        chain.on(fund, G::ownerCall {}, G::ownerCall::abi_encode_returns(&(HOST,)));
    }
    chain.on(
        GROUP_FUND,
        G::getTagsCall {},
        G::getTagsCall::abi_encode_returns(&(vec!["school".to_string()],)),
    );
}
