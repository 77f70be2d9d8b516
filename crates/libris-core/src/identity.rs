//! Id generation, password digests and session tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::IdentityError;
use crate::models::Role;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Random suffix length of generated ids.
const ID_SUFFIX_LEN: u32 = 7;

/// Session lifetime in days.
pub const TOKEN_TTL_DAYS: i64 = 7;

const DIGEST_SCHEME: &str = "sha256";

fn to_base36(mut n: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize] as char);
        n /= 36;
    }
    digits.iter().rev().collect()
}

/// Generate a record id: `prefix-<base36 millis>-<7 random base36 chars>`.
///
/// Unique enough for a single library; not a security token.
pub fn generate_id(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u128;
    let random = Uuid::new_v4().as_u128() % 36u128.pow(ID_SUFFIX_LEN);
    let suffix = format!("{:0>width$}", to_base36(random), width = ID_SUFFIX_LEN as usize);
    if prefix.is_empty() {
        format!("{}-{}", to_base36(millis), suffix)
    } else {
        format!("{}-{}-{}", prefix, to_base36(millis), suffix)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn salted_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{}${}${}", DIGEST_SCHEME, salt, hex(&hasher.finalize()))
}

/// Hash a password with a fresh salt on the blocking pool.
pub async fn hash_password(password: &str) -> Result<String, IdentityError> {
    let password = password.to_owned();
    let salt = Uuid::new_v4().simple().to_string();
    tokio::task::spawn_blocking(move || salted_digest(&salt, &password))
        .await
        .map_err(|e| IdentityError::HashTask(e.to_string()))
}

/// Check a password against a stored digest.
///
/// Anything that is not a well-formed digest never verifies; in particular a
/// stored plaintext password is not accepted.
pub async fn verify_password(password: &str, stored: &str) -> Result<bool, IdentityError> {
    let mut parts = stored.splitn(3, '$');
    let (Some(DIGEST_SCHEME), Some(salt), Some(_)) = (parts.next(), parts.next(), parts.next())
    else {
        return Ok(false);
    };

    let password = password.to_owned();
    let salt = salt.to_owned();
    let stored = stored.to_owned();
    tokio::task::spawn_blocking(move || salted_digest(&salt, &password) == stored)
        .await
        .map_err(|e| IdentityError::HashTask(e.to_string()))
}

/// Session principal carried inside a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    /// Expiry as seconds since the Unix epoch.
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: String, username: String, role: Role, issued_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            username,
            role,
            exp: (issued_at + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

#[derive(Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

const HEADER: Header = Header {
    alg: "HS256",
    typ: "JWT",
};

/// Signs and verifies `header.claims.signature` session tokens.
pub struct TokenCodec {
    key: Vec<u8>,
}

impl TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> Option<Hmac<Sha256>> {
        // HMAC accepts keys of any length
        <Hmac<Sha256>>::new_from_slice(&self.key).ok()
    }

    pub fn issue(&self, claims: &Claims) -> Result<String, IdentityError> {
        let header = serde_json::to_vec(&HEADER)
            .map_err(|e| IdentityError::TokenEncoding(e.to_string()))?;
        let payload =
            serde_json::to_vec(claims).map_err(|e| IdentityError::TokenEncoding(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );

        let mut mac = self
            .mac()
            .ok_or_else(|| IdentityError::TokenEncoding("invalid signing key".to_string()))?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Decode a token, returning `None` if it is malformed or its signature
    /// does not verify. Expiry is not checked here.
    pub fn parse(&self, token: &str) -> Option<Claims> {
        let (signing_input, signature) = token.rsplit_once('.')?;
        let (_, payload) = signing_input.split_once('.')?;

        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let payload = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&payload).ok()
    }

    /// Expired or unreadable tokens both count as expired.
    pub fn is_expired(&self, token: &str, now: DateTime<Utc>) -> bool {
        match self.parse(token) {
            Some(claims) => claims.is_expired_at(now),
            None => true,
        }
    }
}
