//! Single-purpose signed action tokens. A token authorizes exactly one
//! operation on one record (e.g. restocking one medicine) without a login,
//! and expires 24 hours after minting.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const ACTION_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Error, Debug, PartialEq)]
pub enum ActionTokenError {
    #[error("Invalid action token")]
    Invalid,

    #[error("Action token expired")]
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionClaims {
    pub record_id: Uuid,
    pub action: String,
    pub exp: i64,
}

/// Mint a token of the form `base64url(claims).base64url(hmac)`.
pub fn mint_action_token(
    record_id: Uuid,
    action: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> String {
    let claims = ActionClaims {
        record_id,
        action: action.to_string(),
        exp: (now + chrono::Duration::hours(ACTION_TOKEN_TTL_HOURS)).timestamp(),
    };

    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap_or_default());

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{}.{}", payload, signature)
}

/// Verify signature and expiry. Never reveals which check failed beyond the
/// invalid/expired split the caller surfaces.
pub fn verify_action_token(
    token: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<ActionClaims, ActionTokenError> {
    if secret.is_empty() {
        return Err(ActionTokenError::Invalid);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 2 {
        return Err(ActionTokenError::Invalid);
    }
    let (payload_b64, signature_b64) = (parts[0], parts[1]);

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| ActionTokenError::Invalid)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ActionTokenError::Invalid)?;
    mac.update(payload_b64.as_bytes());
    if mac.verify_slice(&signature).is_err() {
        debug!("Action token signature verification failed");
        return Err(ActionTokenError::Invalid);
    }

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| ActionTokenError::Invalid)?;
    let claims: ActionClaims =
        serde_json::from_slice(&payload).map_err(|_| ActionTokenError::Invalid)?;

    if claims.exp < now.timestamp() {
        debug!("Action token expired at {}", claims.exp);
        return Err(ActionTokenError::Expired);
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;

    const SECRET: &str = "test-secret-key-for-action-tokens";

    #[test]
    fn round_trip() {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let token = mint_action_token(id, "restock", SECRET, now);

        let claims = verify_action_token(&token, SECRET, now).unwrap();
        assert_eq!(claims.record_id, id);
        assert_eq!(claims.action, "restock");
    }

    #[test]
    fn rejects_tampered_payload() {
        let now = Utc::now();
        let token = mint_action_token(Uuid::new_v4(), "restock", SECRET, now);

        let forged_claims = ActionClaims {
            record_id: Uuid::new_v4(),
            action: "restock".to_string(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        let forged_payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        let original_sig = token.split('.').nth(1).unwrap();
        let forged = format!("{}.{}", forged_payload, original_sig);

        assert_matches!(
            verify_action_token(&forged, SECRET, now),
            Err(ActionTokenError::Invalid)
        );
    }

    #[test]
    fn rejects_wrong_secret() {
        let now = Utc::now();
        let token = mint_action_token(Uuid::new_v4(), "restock", SECRET, now);
        assert_matches!(
            verify_action_token(&token, "other-secret", now),
            Err(ActionTokenError::Invalid)
        );
    }

    #[test]
    fn rejects_expired() {
        let minted_at = Utc::now() - Duration::hours(ACTION_TOKEN_TTL_HOURS + 1);
        let token = mint_action_token(Uuid::new_v4(), "restock", SECRET, minted_at);
        assert_matches!(
            verify_action_token(&token, SECRET, Utc::now()),
            Err(ActionTokenError::Expired)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_matches!(
            verify_action_token("not-a-token", SECRET, Utc::now()),
            Err(ActionTokenError::Invalid)
        );
    }
}
