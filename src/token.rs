//! 无状态会话令牌：HS256 签名的 JWT 紧凑格式（`header.payload.signature`）。
//!
//! 校验不查询存储；签名有效且未超过 `exp`（若配置）即视为有效。

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

use crate::store::UserId;

type HmacSha256 = Hmac<Sha256>;

const HEADER_ALG: &str = "HS256";
const HEADER_TYP: &str = "JWT";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// 原因仅用于日志。
    #[error("invalid token: {0}")]
    Invalid(&'static str),
}

/// 令牌携带的身份信息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: UserId,
    pub email: String,
    pub username: String,
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    #[serde(flatten)]
    claims: Claims,
    iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
}

pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl: Option<Duration>,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// `ttl` 为 `None` 时签发的令牌不含 `exp`。
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Option<Duration>) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::Invalid("unusable secret"))
    }

    pub fn issue(&self, claims: &Claims) -> Result<String, TokenError> {
        self.issue_at(claims, Utc::now())
    }

    pub fn issue_at(&self, claims: &Claims, now: DateTime<Utc>) -> Result<String, TokenError> {
        let header = Header {
            alg: HEADER_ALG.into(),
            typ: HEADER_TYP.into(),
        };
        let exp = match self.ttl {
            Some(ttl) => Some(expiry(now, ttl)?.timestamp()),
            None => None,
        };
        let payload = Payload {
            claims: claims.clone(),
            iat: now.timestamp(),
            exp,
        };
        let header = serde_json::to_vec(&header)
            .map_err(|_| TokenError::Invalid("header not serializable"))?;
        let payload = serde_json::to_vec(&payload)
            .map_err(|_| TokenError::Invalid("payload not serializable"))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{signing_input}.{signature}"))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Invalid("malformed structure"));
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Invalid("malformed signature"))?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::Invalid("signature mismatch"))?;

        let header: Header = decode_part(header_b64)?;
        if header.alg != HEADER_ALG {
            return Err(TokenError::Invalid("unsupported algorithm"));
        }
        let payload: Payload = decode_part(payload_b64)?;
        if let Some(exp) = payload.exp
            && now.timestamp() >= exp
        {
            return Err(TokenError::Invalid("expired"));
        }
        Ok(payload.claims)
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, TokenError> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or(TokenError::Invalid("lifetime out of range"))
}

fn decode_part<T: for<'de> Deserialize<'de>>(part: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| TokenError::Invalid("malformed encoding"))?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Invalid("malformed json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn claims() -> Claims {
        Claims {
            user_id: UserId::new(),
            email: "alice@example.com".into(),
            username: "alice123".into(),
        }
    }

    #[test]
    fn verify_returns_issued_claims() {
        let issuer = TokenIssuer::new("top-secret", None);
        let claims = claims();
        let token = issuer.issue(&claims).expect("issue");

        assert_eq!(token.split('.').count(), 3);
        assert_eq!(issuer.verify(&token), Ok(claims));
    }

    #[test]
    fn tokens_issued_at_different_times_differ_but_verify_the_same() {
        let issuer = TokenIssuer::new("top-secret", None);
        let claims = claims();
        let first_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let second_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 5).unwrap();
        let first = issuer.issue_at(&claims, first_at).expect("issue");
        let second = issuer.issue_at(&claims, second_at).expect("issue");

        assert_ne!(first, second);
        assert_eq!(issuer.verify(&first), Ok(claims.clone()));
        assert_eq!(issuer.verify(&second), Ok(claims));
    }

    #[test]
    fn altered_signature_byte_is_rejected() {
        let issuer = TokenIssuer::new("top-secret", None);
        let token = issuer.issue(&claims()).expect("issue");
        let (signing_input, signature) = token.rsplit_once('.').expect("signature part");
        let mut signature = URL_SAFE_NO_PAD.decode(signature).expect("decode");
        signature[0] ^= 0x01;
        let tampered = format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature));

        assert!(matches!(issuer.verify(&tampered), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn altered_payload_is_rejected() {
        let issuer = TokenIssuer::new("top-secret", None);
        let token = issuer.issue(&claims()).expect("issue");
        let parts: Vec<&str> = token.split('.').collect();
        let forged = serde_json::json!({
            "userId": UserId::new(),
            "email": "mallory@example.com",
            "username": "mallory1",
            "iat": 0,
        });
        let forged = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).expect("json"));
        let tampered = format!("{}.{}.{}", parts[0], forged, parts[2]);

        assert!(issuer.verify(&tampered).is_err());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = TokenIssuer::new("secret-a", None)
            .issue(&claims())
            .expect("issue");
        let result = TokenIssuer::new("secret-b", None).verify(&token);

        assert_eq!(result, Err(TokenError::Invalid("signature mismatch")));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let issuer = TokenIssuer::new("top-secret", None);
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.??.**"] {
            assert!(issuer.verify(token).is_err(), "accepted {token:?}");
        }
    }

    #[test]
    fn expiry_is_enforced_when_configured() {
        let issuer = TokenIssuer::new("top-secret", Some(Duration::from_secs(60)));
        let issued_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let token = issuer.issue_at(&claims(), issued_at).expect("issue");

        assert!(
            issuer
                .verify_at(&token, issued_at + chrono::Duration::seconds(59))
                .is_ok()
        );
        assert_eq!(
            issuer.verify_at(&token, issued_at + chrono::Duration::seconds(60)),
            Err(TokenError::Invalid("expired"))
        );
    }

    #[test]
    fn oversized_lifetime_fails_instead_of_dropping_exp() {
        for secs in [u64::MAX, 1_000_000_000_000_000] {
            let issuer = TokenIssuer::new("top-secret", Some(Duration::from_secs(secs)));
            assert_eq!(
                issuer.issue(&claims()),
                Err(TokenError::Invalid("lifetime out of range")),
                "ttl {secs}"
            );
        }
    }

    #[test]
    fn largest_configurable_lifetime_still_issues() {
        let issuer = TokenIssuer::new(
            "top-secret",
            Some(Duration::from_secs(crate::config::MAX_TOKEN_TTL_SECS)),
        );
        let issued_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let token = issuer.issue_at(&claims(), issued_at).expect("issue");

        assert!(issuer.verify_at(&token, issued_at).is_ok());
    }

    #[test]
    fn tokens_without_ttl_never_expire() {
        let issuer = TokenIssuer::new("top-secret", None);
        let issued_at = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let token = issuer.issue_at(&claims(), issued_at).expect("issue");

        assert!(issuer.verify(&token).is_ok());
    }
}
