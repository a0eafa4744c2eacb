//! Participant-gated pool chat.
//!
//! Only wallets that joined a Contriboost listed by the network's factory
//! may read or write its chat. Messages can be edited by their sender for
//! five minutes after posting and deleted by their sender at any time.

use alloy_primitives::Address;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::aggregator::Aggregator;
use crate::db::{self, ChatMessage};
use crate::errors::{GatewayError, Result};

/// Seconds after posting during which a message may be edited.
pub const EDIT_WINDOW_SECS: i64 = 300;

/// A caller that passed the participant check for one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatAccess {
    pub network: String,
    pub contract: Address,
    pub caller: Address,
}

impl ChatAccess {
    fn contract_key(&self) -> String {
        format!("{:#x}", self.contract)
    }

    fn caller_key(&self) -> String {
        format!("{:#x}", self.caller)
    }
}

/// Check that `caller` participates in `contract` on `network`.
pub async fn authorize(
    aggregator: &Aggregator,
    network: &str,
    contract: &str,
    caller: Option<&str>,
) -> Result<ChatAccess> {
    let caller = caller
        .ok_or_else(|| GatewayError::Forbidden("Missing X-Wallet-Address header".to_string()))?;
    let (Ok(contract), Ok(caller)) = (contract.trim().parse::<Address>(), caller.trim().parse::<Address>())
    else {
        return Err(GatewayError::Validation("Invalid address".to_string()));
    };

    if !aggregator.is_pool_participant(network, contract, caller).await? {
        return Err(GatewayError::Forbidden(
            "Not a Contriboost participant".to_string(),
        ));
    }
    debug!("{caller} authorized for chat of {contract} on {network}");
    Ok(ChatAccess {
        network: network.to_string(),
        contract,
        caller,
    })
}

pub async fn history(pool: &SqlitePool, access: &ChatAccess) -> Result<Vec<ChatMessage>> {
    db::list_messages(pool, &access.network, &access.contract_key()).await
}

pub async fn post(pool: &SqlitePool, access: &ChatAccess, content: &str, now: i64) -> Result<ChatMessage> {
    let content = content.trim();
    if content.is_empty() {
        return Err(GatewayError::Validation("Message cannot be empty".to_string()));
    }
    let message = db::insert_message(
        pool,
        &access.network,
        &access.contract_key(),
        &access.caller_key(),
        content,
        now,
    )
    .await?;
    info!("Chat message {} posted to {}", message.id, access.contract);
    Ok(message)
}

async fn own_message(pool: &SqlitePool, access: &ChatAccess, id: i64, verb: &str) -> Result<ChatMessage> {
    let message = db::get_message(pool, &access.network, &access.contract_key(), id)
        .await?
        .ok_or_else(|| GatewayError::NotFound("Message not found".to_string()))?;
    if !message.sender.eq_ignore_ascii_case(&access.caller_key()) {
        return Err(GatewayError::Forbidden(format!("Not authorized to {verb}")));
    }
    Ok(message)
}

pub async fn edit(
    pool: &SqlitePool,
    access: &ChatAccess,
    id: i64,
    content: &str,
    now: i64,
) -> Result<ChatMessage> {
    let content = content.trim();
    if content.is_empty() {
        return Err(GatewayError::Validation("Message cannot be empty".to_string()));
    }
    let message = own_message(pool, access, id, "edit").await?;
    if message.timestamp < now - EDIT_WINDOW_SECS {
        return Err(GatewayError::Forbidden("Edit window expired".to_string()));
    }
    db::update_message(pool, id, content).await?;
    Ok(ChatMessage {
        content: content.to_string(),
        edited: true,
        ..message
    })
}

pub async fn delete(pool: &SqlitePool, access: &ChatAccess, id: i64) -> Result<()> {
    own_message(pool, access, id, "delete").await?;
    db::delete_message(pool, id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    async fn memory_pool() -> SqlitePool {
        db::init_pool("sqlite::memory:").await.unwrap()
    }

    fn access_for(caller: Address) -> ChatAccess {
        ChatAccess {
            network: "testnet".into(),
            contract: POOL,
            caller,
        }
    }

    #[tokio::test]
    async fn only_participants_of_listed_pools_get_access() {
        let agg = Fixture::new().aggregator();
        let pool = POOL.to_string();

        let access = authorize(&agg, "testnet", &pool, Some(&MEMBER.to_string())).await.unwrap();
        assert_eq!(access.caller, MEMBER);

        let outsider = authorize(&agg, "testnet", &pool, Some(&OUTSIDER.to_string())).await;
        assert!(matches!(outsider, Err(GatewayError::Forbidden(_))));

        let unlisted = authorize(&agg, "testnet", &GROUP_FUND.to_string(), Some(&MEMBER.to_string())).await;
        assert!(matches!(unlisted, Err(GatewayError::Validation(_))));

        let garbage = authorize(&agg, "testnet", "0x1234", Some(&MEMBER.to_string())).await;
        assert!(matches!(garbage, Err(GatewayError::Validation(_))));

        let anonymous = authorize(&agg, "testnet", &pool, None).await;
        assert!(matches!(anonymous, Err(GatewayError::Forbidden(_))));
    }

    #[tokio::test]
    async fn edit_window_and_sender_rules() {
        let pool = memory_pool().await;
        let me = access_for(MEMBER);
        let other = access_for(OTHER_MEMBER);

        let msg = post(&pool, &me, "  hello  ", 1_000).await.unwrap();
        assert_eq!(msg.content, "hello");

        let edited = edit(&pool, &me, msg.id, "hello all", 1_000 + EDIT_WINDOW_SECS).await.unwrap();
        assert!(edited.edited);
        assert!(matches!(
            edit(&pool, &me, msg.id, "too late", 1_001 + EDIT_WINDOW_SECS).await,
            Err(GatewayError::Forbidden(_))
        ));
        assert!(matches!(
            edit(&pool, &other, msg.id, "not mine", 1_001).await,
            Err(GatewayError::Forbidden(_))
        ));
        assert!(matches!(
            edit(&pool, &me, 999, "missing", 1_001).await,
            Err(GatewayError::NotFound(_))
        ));

        assert!(matches!(delete(&pool, &other, msg.id).await, Err(GatewayError::Forbidden(_))));
        delete(&pool, &me, msg.id).await.unwrap();
        assert!(history(&pool, &me).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_messages_are_rejected() {
        let pool = memory_pool().await;
        assert!(matches!(
            post(&pool, &access_for(MEMBER), "   ", 0).await,
            Err(GatewayError::Validation(_))
        ));
    }
}
