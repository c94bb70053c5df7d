use rallypoint_core::OrgRole;
use rallypoint_db::entities::api_keys;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use sea_orm::prelude::Uuid;
use serde::{Deserialize, Serialize};

/// One org-role assignment carried by an API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyGrant {
    pub org_id: Uuid,
    pub role: OrgRole,
}

/// Resolved identity of a validated bearer key.
#[derive(Debug, Clone)]
pub struct ApiKeyIdentity {
    pub id: Uuid,
    pub name: String,
    pub grants: Vec<ApiKeyGrant>,
}

pub fn generate_token() -> String {
    use base64::Engine;
    use rand::RngCore;
    let mut buf = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    format!(
        "rpk_{}",
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
    )
}

pub fn hash_token(raw: &str) -> String {
    use sha2::Digest;
    let mut hasher = sha2::Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Live = not revoked and not past its optional expiry.
pub fn key_is_live(
    revoked_at: Option<chrono::DateTime<chrono::FixedOffset>>,
    expires_at: Option<chrono::DateTime<chrono::FixedOffset>>,
    now: chrono::DateTime<chrono::Utc>,
) -> bool {
    if revoked_at.is_some() {
        return false;
    }
    match expires_at {
        Some(exp) => exp > now.fixed_offset(),
        None => true,
    }
}

pub fn parse_grants(raw: &serde_json::Value) -> Vec<ApiKeyGrant> {
    serde_json::from_value(raw.clone()).unwrap_or_default()
}

/// Look up a raw bearer token. Returns None for unknown, revoked, or expired
/// keys; only database failures surface as errors.
pub async fn authenticate(
    db: &DatabaseConnection,
    raw_token: &str,
) -> Result<Option<ApiKeyIdentity>, sea_orm::DbErr> {
    let hash = hash_token(raw_token);
    let Some(row) = api_keys::Entity::find()
        .filter(api_keys::Column::TokenHash.eq(hash))
        .one(db)
        .await?
    else {
        return Ok(None);
    };

    if !key_is_live(row.revoked_at, row.expires_at, chrono::Utc::now()) {
        return Ok(None);
    }

    Ok(Some(ApiKeyIdentity {
        id: row.id,
        name: row.name,
        grants: parse_grants(&row.grants),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_prefixed_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert!(a.starts_with("rpk_"));
        assert_ne!(a, b);
    }

    #[test]
    fn hashing_is_stable_and_hex() {
        let h = hash_token("rpk_example");
        assert_eq!(h, hash_token("rpk_example"));
        assert_eq!(h.len(), 64);
        assert!(h.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn liveness_rules() {
        let now = chrono::Utc::now();
        let past = (now - chrono::Duration::hours(1)).fixed_offset();
        let future = (now + chrono::Duration::hours(1)).fixed_offset();

        assert!(key_is_live(None, None, now));
        assert!(key_is_live(None, Some(future), now));
        assert!(!key_is_live(None, Some(past), now));
        assert!(!key_is_live(Some(past), None, now));
        assert!(!key_is_live(Some(past), Some(future), now));
    }

    #[test]
    fn malformed_grants_resolve_to_no_access() {
        assert!(parse_grants(&serde_json::json!("not a list")).is_empty());
        assert_eq!(
            parse_grants(&serde_json::json!([
                {"org_id": "8f4a1f9e-0000-0000-0000-000000000001", "role": "editor"}
            ]))
            .len(),
            1
        );
    }
}
