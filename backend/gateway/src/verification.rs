//! Identity verification: proof forwarding, policy checks and status
//! lookup with expiry.
//!
//! Proofs are checked by a third-party verifier service; this module only
//! applies the local policy (minimum age, OFAC, excluded countries) to its
//! answer and records the outcome.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::config::VerificationConfig;
use crate::db::{self, VerificationRecord};
use crate::errors::{GatewayError, Result};

// ─────────────────────────────────────────────────────────
// Request / verifier shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub attestation_id: Option<Value>,
    pub proof: Option<Value>,
    pub public_signals: Option<Value>,
    pub user_context_data: Option<String>,
}

fn present(v: &Option<Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

impl VerifyRequest {
    fn is_complete(&self) -> bool {
        present(&self.attestation_id)
            && present(&self.proof)
            && present(&self.public_signals)
            && self.user_context_data.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityDetails {
    pub is_valid: bool,
    pub is_minimum_age_valid: bool,
    #[serde(default)]
    pub is_ofac_valid: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub user_identifier: Option<String>,
}

/// What the verifier service says about one proof.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofResult {
    pub is_valid_details: ValidityDetails,
    #[serde(default)]
    pub disclose_output: Value,
    #[serde(default)]
    pub user_data: Option<UserData>,
}

impl ProofResult {
    pub fn nationality(&self) -> Option<&str> {
        self.disclose_output.get("nationality").and_then(Value::as_str)
    }
}

#[async_trait]
pub trait ProofVerifier: Send + Sync {
    async fn verify(&self, req: &VerifyRequest, policy: &VerificationConfig) -> Result<ProofResult>;
}

/// Verifier reached over HTTP; the policy is forwarded with the proof.
pub struct HttpVerifier {
    client: Client,
    url: String,
}

impl HttpVerifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ProofVerifier for HttpVerifier {
    async fn verify(&self, req: &VerifyRequest, policy: &VerificationConfig) -> Result<ProofResult> {
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({
                "scope": policy.scope,
                "attestationId": req.attestation_id,
                "proof": req.proof,
                "publicSignals": req.public_signals,
                "userContextData": req.user_context_data,
                "minimumAge": policy.minimum_age,
                "excludedCountries": policy.excluded_countries,
                "ofac": policy.ofac_check,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GatewayError::Verifier(format!(
                "verifier answered HTTP {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }
}

// ─────────────────────────────────────────────────────────
// Verify
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedUser {
    pub address: String,
    pub identifier: String,
    pub verified_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationDetails {
    pub age_verified: bool,
    pub ofac_verified: Option<bool>,
    pub nationality: Option<String>,
}

/// Body of `POST /api/verify`. Always sent with HTTP 200.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum VerifyResponse {
    Success {
        result: bool,
        message: String,
        user: VerifiedUser,
        verification_details: VerificationDetails,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        code: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<ValidityDetails>,
    },
}

impl VerifyResponse {
    fn rejected(code: &'static str, reason: String, details: Option<ValidityDetails>) -> Self {
        Self::Error {
            result: Some(false),
            message: None,
            reason: Some(reason),
            code,
            details,
        }
    }

    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Success { .. } => None,
            Self::Error { code, .. } => Some(code),
        }
    }
}

fn iso8601(secs: i64) -> String {
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

/// Check `req` with `verifier`, apply `policy`, and persist a success.
pub async fn verify(
    pool: &SqlitePool,
    verifier: Option<&dyn ProofVerifier>,
    policy: &VerificationConfig,
    req: &VerifyRequest,
    now: i64,
) -> VerifyResponse {
    if !req.is_complete() {
        warn!("Verification request with missing proof inputs");
        return VerifyResponse::Error {
            result: None,
            message: Some("Missing required proof inputs.".to_string()),
            reason: None,
            code: "INVALID_INPUT",
            details: None,
        };
    }

    let Some(verifier) = verifier else {
        error!("Verification requested but no verifier is configured");
        return VerifyResponse::rejected(
            "SERVER_ERROR",
            "Verification is not configured".to_string(),
            None,
        );
    };

    let result = match verifier.verify(req, policy).await {
        Ok(r) => r,
        Err(e) => {
            error!("Verification error: {e}");
            return VerifyResponse::rejected("SERVER_ERROR", e.to_string(), None);
        }
    };
    let details = &result.is_valid_details;

    if !details.is_valid {
        warn!("Proof failed hub verification");
        return VerifyResponse::rejected(
            "PROOF_INVALID",
            "Proof failed hub verification".to_string(),
            Some(details.clone()),
        );
    }
    if !details.is_minimum_age_valid {
        warn!("User does not meet minimum age requirement of {}", policy.minimum_age);
        return VerifyResponse::rejected(
            "AGE_REQUIREMENT_FAILED",
            format!("Did not meet age requirement ({}+)", policy.minimum_age),
            Some(details.clone()),
        );
    }
    if policy.ofac_check && details.is_ofac_valid == Some(false) {
        warn!("User failed OFAC screening");
        return VerifyResponse::rejected(
            "OFAC_BLOCKED",
            "User failed OFAC compliance screening".to_string(),
            None,
        );
    }
    if let Some(nationality) = result.nationality() {
        if policy
            .excluded_countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(nationality))
        {
            warn!("User from excluded country: {nationality}");
            return VerifyResponse::rejected(
                "COUNTRY_BLOCKED",
                "Access not available from your country".to_string(),
                None,
            );
        }
    }

    let address = req
        .user_context_data
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_string();
    let attestation_id = match &req.attestation_id {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let record = VerificationRecord {
        user_id: address.to_lowercase(),
        verified: true,
        timestamp: now,
        attestation_id,
        disclose_output: result.disclose_output.to_string(),
    };
    if let Err(e) = db::upsert_verification(pool, &record).await {
        error!("Failed to store verification for {address}: {e}");
        return VerifyResponse::rejected("SERVER_ERROR", e.to_string(), None);
    }

    info!("Verification successful for {address}");
    VerifyResponse::Success {
        result: true,
        message: "Identity verified.".to_string(),
        user: VerifiedUser {
            identifier: result
                .user_data
                .as_ref()
                .and_then(|u| u.user_identifier.clone())
                .unwrap_or_else(|| address.clone()),
            address,
            verified_at: iso8601(now),
        },
        verification_details: VerificationDetails {
            age_verified: details.is_minimum_age_valid,
            ofac_verified: if policy.ofac_check {
                details.is_ofac_valid
            } else {
                None
            },
            nationality: result.nationality().map(str::to_string),
        },
    }
}

// ─────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────

/// `0x` followed by exactly 40 hex digits, lower-cased.
static USER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("user id pattern is valid"));

pub fn normalize_user_id(raw: &str) -> Option<String> {
    USER_ID.is_match(raw).then(|| raw.to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStatus {
    pub status: &'static str,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclose_output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_expired: Option<bool>,
    pub message: &'static str,
    pub user_id: String,
}

/// Look up the stored verification of `user_id` (already normalised).
///
/// A record older than `ttl_days` reports `verified: false` and
/// `isExpired: true`.
pub async fn status(pool: &SqlitePool, user_id: &str, ttl_days: i64, now: i64) -> Result<VerificationStatus> {
    let not_verified = |message| VerificationStatus {
        status: "success",
        verified: false,
        timestamp: None,
        attestation_id: None,
        disclose_output: None,
        is_expired: None,
        message,
        user_id: user_id.to_string(),
    };

    let Some(record) = db::get_verification(pool, user_id).await? else {
        return Ok(not_verified("User not verified"));
    };
    if !record.verified {
        return Ok(not_verified("User verification incomplete or invalid"));
    }

    let cutoff = now - ttl_days * 86_400;
    let is_expired = record.timestamp < cutoff;
    Ok(VerificationStatus {
        status: "success",
        verified: !is_expired,
        timestamp: Some(iso8601(record.timestamp)),
        attestation_id: Some(record.attestation_id),
        disclose_output: serde_json::from_str(&record.disclose_output).ok(),
        is_expired: Some(is_expired),
        message: if is_expired {
            "User verification has expired"
        } else {
            "User is verified"
        },
        user_id: user_id.to_string(),
    })
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub const USER: &str = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01";

    /// Answers every proof with a fixed result.
    pub struct FixedVerifier(pub std::result::Result<ProofResult, String>);

    #[async_trait]
    impl ProofVerifier for FixedVerifier {
        async fn verify(&self, _: &VerifyRequest, _: &VerificationConfig) -> Result<ProofResult> {
            self.0.clone().map_err(GatewayError::Verifier)
        }
    }

    pub fn passing(nationality: &str) -> ProofResult {
        ProofResult {
            is_valid_details: ValidityDetails {
                is_valid: true,
                is_minimum_age_valid: true,
                is_ofac_valid: Some(true),
            },
            disclose_output: json!({ "nationality": nationality }),
            user_data: None,
        }
    }

    pub fn request() -> VerifyRequest {
        VerifyRequest {
            attestation_id: Some(json!(1)),
            proof: Some(json!({ "a": ["0x1"] })),
            public_signals: Some(json!(["0x2"])),
            user_context_data: Some(USER.to_string()),
        }
    }

    async fn memory_pool() -> SqlitePool {
        db::init_pool("sqlite::memory:").await.unwrap()
    }

    async fn code_for(result: ProofResult, policy: &VerificationConfig) -> Option<&'static str> {
        let pool = memory_pool().await;
        let verifier = FixedVerifier(Ok(result));
        verify(&pool, Some(&verifier), policy, &request(), 1_000).await.code()
    }

    #[tokio::test]
    async fn missing_field_is_invalid_input() {
        let pool = memory_pool().await;
        let verifier = FixedVerifier(Ok(passing("FRA")));
        let mut req = request();
        req.proof = None;
        let resp = verify(&pool, Some(&verifier), &VerificationConfig::default(), &req, 0).await;
        assert_eq!(resp.code(), Some("INVALID_INPUT"));

        let mut req = request();
        req.user_context_data = Some(String::new());
        let resp = verify(&pool, Some(&verifier), &VerificationConfig::default(), &req, 0).await;
        assert_eq!(resp.code(), Some("INVALID_INPUT"));
    }

    #[tokio::test]
    async fn policy_failures_map_to_codes() {
        let policy = VerificationConfig::default();

        let mut bad_proof = passing("FRA");
        bad_proof.is_valid_details.is_valid = false;
        assert_eq!(code_for(bad_proof, &policy).await, Some("PROOF_INVALID"));

        let mut too_young = passing("FRA");
        too_young.is_valid_details.is_minimum_age_valid = false;
        assert_eq!(code_for(too_young, &policy).await, Some("AGE_REQUIREMENT_FAILED"));

        let mut sanctioned = passing("FRA");
        sanctioned.is_valid_details.is_ofac_valid = Some(false);
        assert_eq!(code_for(sanctioned.clone(), &policy).await, None);
        let strict = VerificationConfig {
            ofac_check: true,
            ..VerificationConfig::default()
        };
        assert_eq!(code_for(sanctioned, &strict).await, Some("OFAC_BLOCKED"));

        let blocked = VerificationConfig {
            excluded_countries: vec!["PRK".into()],
            ..VerificationConfig::default()
        };
        assert_eq!(code_for(passing("PRK"), &blocked).await, Some("COUNTRY_BLOCKED"));
        assert_eq!(code_for(passing("FRA"), &blocked).await, None);
    }

    #[tokio::test]
    async fn verifier_failure_is_server_error() {
        let pool = memory_pool().await;
        let verifier = FixedVerifier(Err("boom".into()));
        let resp = verify(&pool, Some(&verifier), &VerificationConfig::default(), &request(), 0).await;
        assert_eq!(resp.code(), Some("SERVER_ERROR"));
        let resp = verify(&pool, None, &VerificationConfig::default(), &request(), 0).await;
        assert_eq!(resp.code(), Some("SERVER_ERROR"));
    }

    #[tokio::test]
    async fn success_persists_lowercased_record() {
        let pool = memory_pool().await;
        let verifier = FixedVerifier(Ok(passing("FRA")));
        let resp = verify(&pool, Some(&verifier), &VerificationConfig::default(), &request(), 1_000).await;
        let VerifyResponse::Success { user, verification_details, .. } = resp else {
            panic!("expected success");
        };
        assert_eq!(user.address, USER);
        assert_eq!(verification_details.nationality.as_deref(), Some("FRA"));
        assert_eq!(verification_details.ofac_verified, None);

        let stored = db::get_verification(&pool, &USER.to_lowercase()).await.unwrap().unwrap();
        assert!(stored.verified);
        assert_eq!(stored.attestation_id, "1");
        assert_eq!(stored.timestamp, 1_000);
    }

    #[test]
    fn user_id_format() {
        assert_eq!(normalize_user_id(USER), Some(USER.to_lowercase()));
        assert!(normalize_user_id("0x1234").is_none());
        assert!(normalize_user_id("AbCdEf0123456789aBcDeF0123456789AbCdEf0123").is_none());
        assert!(normalize_user_id("0xZZCdEf0123456789aBcDeF0123456789AbCdEf01").is_none());
        assert!(normalize_user_id(&format!("{USER}\n")).is_none());
        assert!(normalize_user_id(&format!("{USER}0")).is_none());
        assert!(normalize_user_id(&format!(" {USER}")).is_none());
        assert!(normalize_user_id(&USER.replacen("0x", "0X", 1)).is_none());
    }

    #[tokio::test]
    async fn status_expires_after_ttl() {
        let pool = memory_pool().await;
        let user = USER.to_lowercase();
        let day = 86_400;

        let missing = status(&pool, &user, 90, 0).await.unwrap();
        assert!(!missing.verified);
        assert_eq!(missing.message, "User not verified");

        db::upsert_verification(
            &pool,
            &VerificationRecord {
                user_id: user.clone(),
                verified: true,
                timestamp: 0,
                attestation_id: "1".into(),
                disclose_output: r#"{"nationality":"FRA"}"#.into(),
            },
        )
        .await
        .unwrap();

        let fresh = status(&pool, &user, 90, 90 * day).await.unwrap();
        assert!(fresh.verified);
        assert_eq!(fresh.is_expired, Some(false));
        assert_eq!(fresh.disclose_output.unwrap()["nationality"], "FRA");

        let stale = status(&pool, &user, 90, 90 * day + 1).await.unwrap();
        assert!(!stale.verified);
        assert_eq!(stale.is_expired, Some(true));
        assert_eq!(stale.message, "User verification has expired");
    }
}
