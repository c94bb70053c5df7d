use rspc::{Procedure, ProcedureError, ResolverError, Router};

use specta::Type;
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use rallypoint_core::{OrgRole, OrgType, RequestStatus};
use rallypoint_db::entities::{
    api_keys, event_event_types, event_types, events, locations, org_roles, orgs, update_requests,
};
use sea_orm::prelude::Uuid;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};

use crate::apikeys::{self, ApiKeyIdentity};
use crate::audit;
use crate::requests::{self, ApplyError, RequestPayload};

#[derive(Clone, Debug, serde::Serialize, Type)]
pub struct AuthUser {
    pub user_id: String,
    pub f3_name: String,
    pub is_admin: bool,
}

// Request context for rspc procedures.
#[derive(Clone)]
pub struct Ctx {
    pub db: Arc<rallypoint_db::sea_orm::DatabaseConnection>,
    pub user: Option<AuthUser>,
    pub api_key: Option<ApiKeyIdentity>,
    pub request_id: String,
}

#[derive(Debug, Clone, serde::Serialize, Type)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub request_id: String,
    pub field_errors: std::collections::BTreeMap<String, String>,
    pub hint: Option<String>,
}

impl rspc::Error for ApiError {
    fn into_procedure_error(self) -> ProcedureError {
        // Keep error payload intentionally minimal/safe for frontend.
        ResolverError::new(self, Option::<std::io::Error>::None).into()
    }
}

fn api_error(ctx: &Ctx, code: &str, message: impl Into<String>) -> ApiError {
    ApiError {
        code: code.to_string(),
        message: message.into(),
        request_id: ctx.request_id.clone(),
        field_errors: std::collections::BTreeMap::new(),
        hint: None,
    }
}

fn api_error_with_fields(
    ctx: &Ctx,
    code: &str,
    message: impl Into<String>,
    field_errors: std::collections::BTreeMap<String, String>,
) -> ApiError {
    ApiError {
        code: code.to_string(),
        message: message.into(),
        request_id: ctx.request_id.clone(),
        field_errors,
        hint: None,
    }
}

fn db_error(ctx: &Ctx, e: sea_orm::DbErr) -> ApiError {
    api_error(ctx, "db_error", format!("db error: {e}"))
}

fn apply_error(ctx: &Ctx, e: ApplyError) -> ApiError {
    match e {
        ApplyError::NotFound { entity, id } => {
            api_error(ctx, "not_found", format!("{entity} {id} not found"))
        }
        ApplyError::Invalid { field, message } => {
            let mut fields = std::collections::BTreeMap::new();
            fields.insert(field.clone(), message.clone());
            api_error_with_fields(ctx, "invalid_param", format!("{field}: {message}"), fields)
        }
        ApplyError::Db(e) => db_error(ctx, e),
    }
}

fn is_read_only() -> bool {
    matches!(
        std::env::var("RP_READ_ONLY")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn ensure_writable(ctx: &Ctx) -> Result<(), ApiError> {
    if is_read_only() {
        return Err(api_error(ctx, "read_only", "service is in read-only mode"));
    }
    Ok(())
}

struct RateLimiter {
    window: Duration,
    max_hits: usize,
    hits: std::sync::Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    fn global() -> &'static RateLimiter {
        static RL: OnceLock<RateLimiter> = OnceLock::new();
        RL.get_or_init(|| {
            let max_hits = std::env::var("RP_RATE_LIMIT_MAX_HITS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(30)
                .clamp(1, 10_000);
            let window_ms = std::env::var("RP_RATE_LIMIT_WINDOW_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(10_000)
                .clamp(1000, 600_000);
            RateLimiter {
                window: Duration::from_millis(window_ms),
                max_hits,
                hits: std::sync::Mutex::new(HashMap::new()),
            }
        })
    }

    fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut map = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        let q = map.entry(key.to_string()).or_default();
        while q
            .front()
            .is_some_and(|t| now.duration_since(*t) > self.window)
        {
            q.pop_front();
        }
        if q.len() >= self.max_hits {
            return false;
        }
        q.push_back(now);
        true
    }
}

fn rate_limit_key(ctx: &Ctx) -> String {
    if let Some(u) = ctx.user.as_ref() {
        return format!("user:{}", u.user_id);
    }
    if let Some(k) = ctx.api_key.as_ref() {
        return format!("key:{}", k.id);
    }
    "anon".to_string()
}

fn enforce_rate_limit(ctx: &Ctx) -> Result<(), ApiError> {
    let key = rate_limit_key(ctx);
    if !RateLimiter::global().allow(&key) {
        return Err(api_error(ctx, "rate_limited", "too many requests"));
    }
    Ok(())
}

fn require_admin(ctx: &Ctx) -> Result<&AuthUser, ApiError> {
    let user = ctx
        .user
        .as_ref()
        .ok_or_else(|| api_error(ctx, "unauthorized", "unauthorized"))?;
    if !user.is_admin {
        return Err(api_error(ctx, "forbidden", "forbidden"));
    }
    Ok(user)
}

fn parse_id(ctx: &Ctx, field: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| api_error(ctx, "invalid_param", format!("invalid {field}")))
}

/// Region plus its ancestors, bottom-up. The hierarchy is at most five
/// levels deep, so the walk is bounded.
async fn org_ancestor_chain(ctx: &Ctx, org_id: Uuid) -> Result<Vec<Uuid>, ApiError> {
    let mut chain = vec![org_id];
    let mut cursor = org_id;
    for _ in 0..4 {
        let Some(org) = orgs::Entity::find_by_id(cursor)
            .one(&*ctx.db)
            .await
            .map_err(|e| db_error(ctx, e))?
        else {
            break;
        };
        match org.parent_id {
            Some(parent) => {
                chain.push(parent);
                cursor = parent;
            }
            None => break,
        }
    }
    Ok(chain)
}

/// A moderator is a global admin, a user holding a moderating role on the
/// region (or one of its ancestors), or an API key granted one there.
async fn require_region_moderator(ctx: &Ctx, region_id: Uuid) -> Result<(), ApiError> {
    if ctx.user.as_ref().is_some_and(|u| u.is_admin) {
        return Ok(());
    }

    let chain = org_ancestor_chain(ctx, region_id).await?;

    if let Some(user) = ctx.user.as_ref() {
        let user_id = parse_id(ctx, "user_id", &user.user_id)?;
        let rows = org_roles::Entity::find()
            .filter(org_roles::Column::UserId.eq(user_id))
            .filter(org_roles::Column::OrgId.is_in(chain.clone()))
            .all(&*ctx.db)
            .await
            .map_err(|e| db_error(ctx, e))?;
        if rows
            .iter()
            .any(|r| OrgRole::parse(&r.role).is_some_and(|role| role.can_moderate()))
        {
            return Ok(());
        }
    }

    if let Some(key) = ctx.api_key.as_ref()
        && key
            .grants
            .iter()
            .any(|g| chain.contains(&g.org_id) && g.role.can_moderate())
    {
        return Ok(());
    }

    Err(api_error(ctx, "forbidden", "forbidden"))
}

#[derive(Debug, Clone, serde::Serialize, Type)]
pub struct PingResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, serde::Serialize, Type)]
pub struct OrgDto {
    pub id: String,
    pub parent_id: Option<String>,
    pub org_type: String,
    pub name: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, serde::Serialize, Type)]
pub struct LocationDto {
    pub id: String,
    pub region_id: String,
    pub name: String,
    pub description: Option<String>,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_state: Option<String>,
    pub address_zip: Option<String>,
    pub address_country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_active: bool,
}

#[derive(Debug, Clone, serde::Serialize, Type)]
pub struct EventDto {
    pub id: String,
    pub ao_id: String,
    pub location_id: String,
    pub name: String,
    pub description: Option<String>,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub recurrence: String,
    pub event_types: Vec<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, serde::Serialize, Type)]
pub struct UpdateRequestDto {
    pub id: String,
    pub region_id: String,
    pub kind: String,
    pub status: String,
    pub submitted_by: String,
    pub payload: serde_json::Value,
    pub meta: Option<serde_json::Value>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, serde::Serialize, Type)]
pub struct ApiKeyDto {
    pub id: String,
    pub name: String,
    pub grants: Vec<ApiKeyGrantDto>,
    pub expires_at: Option<String>,
    pub revoked_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Type)]
pub struct ApiKeyGrantDto {
    pub org_id: String,
    pub role: String,
}

#[derive(Debug, Clone, serde::Serialize, Type)]
pub struct CreatedApiKey {
    pub key: ApiKeyDto,
    /// Shown exactly once; only the hash is stored.
    pub token: String,
}

#[derive(Debug, Clone, serde::Serialize, Type)]
pub struct MapAoDto {
    pub ao: OrgDto,
    pub events: Vec<EventDto>,
}

#[derive(Debug, Clone, serde::Serialize, Type)]
pub struct MapRegionDto {
    pub region: OrgDto,
    pub locations: Vec<LocationDto>,
    pub aos: Vec<MapAoDto>,
}

#[derive(Debug, Clone, serde::Deserialize, Type)]
pub struct ListOrgsInput {
    pub org_type: Option<String>,
    pub parent_id: Option<String>,
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Clone, serde::Deserialize, Type)]
pub struct OrgIdInput {
    pub org_id: String,
}

#[derive(Debug, Clone, serde::Deserialize, Type)]
pub struct ListLocationsInput {
    pub region_id: Option<String>,
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Clone, serde::Deserialize, Type)]
pub struct ListEventsInput {
    pub ao_id: Option<String>,
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Clone, serde::Deserialize, Type)]
pub struct SubmitRequestInput {
    /// Client-suppliable so offline tooling can resubmit idempotently.
    pub id: Option<String>,
    pub submitted_by: String,
    pub payload: RequestPayload,
}

#[derive(Debug, Clone, serde::Deserialize, Type)]
pub struct ListRequestsInput {
    pub region_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize, Type)]
pub struct RequestIdInput {
    pub request_id: String,
}

#[derive(Debug, Clone, serde::Deserialize, Type)]
pub struct RejectRequestInput {
    pub request_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize, Type)]
pub struct CreateApiKeyInput {
    pub name: String,
    pub grants: Vec<ApiKeyGrantDto>,
    /// RFC 3339.
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize, Type)]
pub struct ApiKeyIdInput {
    pub key_id: String,
}

fn map_org(m: orgs::Model) -> OrgDto {
    OrgDto {
        id: m.id.to_string(),
        parent_id: m.parent_id.map(|p| p.to_string()),
        org_type: m.org_type,
        name: m.name,
        description: m.description,
        website: m.website,
        is_active: m.is_active,
    }
}

fn map_location(m: locations::Model) -> LocationDto {
    LocationDto {
        id: m.id.to_string(),
        region_id: m.org_id.to_string(),
        name: m.name,
        description: m.description,
        address_street: m.address_street,
        address_city: m.address_city,
        address_state: m.address_state,
        address_zip: m.address_zip,
        address_country: m.address_country,
        latitude: m.latitude,
        longitude: m.longitude,
        is_active: m.is_active,
    }
}

fn map_event(m: events::Model, type_names: Vec<String>) -> EventDto {
    EventDto {
        id: m.id.to_string(),
        ao_id: m.org_id.to_string(),
        location_id: m.location_id.to_string(),
        name: m.name,
        description: m.description,
        day_of_week: m.day_of_week,
        start_time: m.start_time,
        end_time: m.end_time,
        recurrence: m.recurrence,
        event_types: type_names,
        is_active: m.is_active,
    }
}

fn map_request(m: update_requests::Model) -> UpdateRequestDto {
    UpdateRequestDto {
        id: m.id.to_string(),
        region_id: m.region_id.to_string(),
        kind: m.kind,
        status: m.status,
        submitted_by: m.submitted_by,
        payload: m.payload,
        meta: m.meta,
        reviewed_by: m.reviewed_by.map(|u| u.to_string()),
        reviewed_at: m.reviewed_at.map(|t| t.to_rfc3339()),
        created_at: m.created_at.to_rfc3339(),
    }
}

fn map_api_key(m: api_keys::Model) -> ApiKeyDto {
    let grants = apikeys::parse_grants(&m.grants)
        .into_iter()
        .map(|g| ApiKeyGrantDto {
            org_id: g.org_id.to_string(),
            role: g.role.as_str().to_string(),
        })
        .collect();
    ApiKeyDto {
        id: m.id.to_string(),
        name: m.name,
        grants,
        expires_at: m.expires_at.map(|t| t.to_rfc3339()),
        revoked_at: m.revoked_at.map(|t| t.to_rfc3339()),
        created_at: m.created_at.to_rfc3339(),
    }
}

/// Event-type names per event, for the read surface.
async fn event_type_names(
    ctx: &Ctx,
    event_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<String>>, ApiError> {
    if event_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let joins = event_event_types::Entity::find()
        .filter(event_event_types::Column::EventId.is_in(event_ids.to_vec()))
        .all(&*ctx.db)
        .await
        .map_err(|e| db_error(ctx, e))?;

    let type_rows = event_types::Entity::find()
        .all(&*ctx.db)
        .await
        .map_err(|e| db_error(ctx, e))?;
    let names: HashMap<Uuid, String> = type_rows.into_iter().map(|t| (t.id, t.name)).collect();

    let mut out: HashMap<Uuid, Vec<String>> = HashMap::new();
    for join in joins {
        if let Some(name) = names.get(&join.event_type_id) {
            out.entry(join.event_id).or_default().push(name.clone());
        }
    }
    Ok(out)
}

pub fn router() -> Router<Ctx> {
    // NOTE: Procedure keys are nested segments; the runtime request path
    // flattens to "segment.segment".
    let control = Router::new().procedure(
        "ping",
        Procedure::builder::<ApiError>().query(|_, _: ()| async move {
            Ok(PingResponse {
                status: "ok".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
        }),
    );

    let org = Router::new()
        .procedure(
            "list",
            Procedure::builder::<ApiError>().query(|ctx: Ctx, input: ListOrgsInput| async move {
                let mut query = orgs::Entity::find();
                if let Some(t) = input.org_type.as_deref() {
                    let t = OrgType::parse(t)
                        .ok_or_else(|| api_error(&ctx, "invalid_param", "invalid org_type"))?;
                    query = query.filter(orgs::Column::OrgType.eq(t.as_str()));
                }
                if let Some(parent) = input.parent_id.as_deref() {
                    let parent = parse_id(&ctx, "parent_id", parent)?;
                    query = query.filter(orgs::Column::ParentId.eq(parent));
                }
                if !input.include_inactive.unwrap_or(false) {
                    query = query.filter(orgs::Column::IsActive.eq(true));
                }

                let rows = query
                    .order_by_asc(orgs::Column::Name)
                    .all(&*ctx.db)
                    .await
                    .map_err(|e| db_error(&ctx, e))?;
                Ok(rows.into_iter().map(map_org).collect::<Vec<_>>())
            }),
        )
        .procedure(
            "get",
            Procedure::builder::<ApiError>().query(|ctx: Ctx, input: OrgIdInput| async move {
                let id = parse_id(&ctx, "org_id", &input.org_id)?;
                let org = orgs::Entity::find_by_id(id)
                    .one(&*ctx.db)
                    .await
                    .map_err(|e| db_error(&ctx, e))?
                    .ok_or_else(|| api_error(&ctx, "not_found", "org not found"))?;
                Ok(map_org(org))
            }),
        );

    let location = Router::new().procedure(
        "list",
        Procedure::builder::<ApiError>().query(|ctx: Ctx, input: ListLocationsInput| async move {
            let mut query = locations::Entity::find();
            if let Some(region) = input.region_id.as_deref() {
                let region = parse_id(&ctx, "region_id", region)?;
                query = query.filter(locations::Column::OrgId.eq(region));
            }
            if !input.include_inactive.unwrap_or(false) {
                query = query.filter(locations::Column::IsActive.eq(true));
            }

            let rows = query
                .order_by_asc(locations::Column::Name)
                .all(&*ctx.db)
                .await
                .map_err(|e| db_error(&ctx, e))?;
            Ok(rows.into_iter().map(map_location).collect::<Vec<_>>())
        }),
    );

    let event = Router::new().procedure(
        "list",
        Procedure::builder::<ApiError>().query(|ctx: Ctx, input: ListEventsInput| async move {
            let mut query = events::Entity::find();
            if let Some(ao) = input.ao_id.as_deref() {
                let ao = parse_id(&ctx, "ao_id", ao)?;
                query = query.filter(events::Column::OrgId.eq(ao));
            }
            if !input.include_inactive.unwrap_or(false) {
                query = query.filter(events::Column::IsActive.eq(true));
            }

            let rows = query
                .order_by_asc(events::Column::Name)
                .all(&*ctx.db)
                .await
                .map_err(|e| db_error(&ctx, e))?;

            let ids: Vec<Uuid> = rows.iter().map(|e| e.id).collect();
            let mut type_names = event_type_names(&ctx, &ids).await?;
            Ok(rows
                .into_iter()
                .map(|e| {
                    let names = type_names.remove(&e.id).unwrap_or_default();
                    map_event(e, names)
                })
                .collect::<Vec<_>>())
        }),
    );

    let map = Router::new().procedure(
        "data",
        Procedure::builder::<ApiError>().query(|ctx: Ctx, _: ()| async move {
            let org_rows = orgs::Entity::find()
                .filter(orgs::Column::IsActive.eq(true))
                .all(&*ctx.db)
                .await
                .map_err(|e| db_error(&ctx, e))?;

            let location_rows = locations::Entity::find()
                .filter(locations::Column::IsActive.eq(true))
                .all(&*ctx.db)
                .await
                .map_err(|e| db_error(&ctx, e))?;

            let event_rows = events::Entity::find()
                .filter(events::Column::IsActive.eq(true))
                .all(&*ctx.db)
                .await
                .map_err(|e| db_error(&ctx, e))?;

            let ids: Vec<Uuid> = event_rows.iter().map(|e| e.id).collect();
            let mut type_names = event_type_names(&ctx, &ids).await?;

            let mut events_by_ao: HashMap<Uuid, Vec<EventDto>> = HashMap::new();
            for e in event_rows {
                let ao = e.org_id;
                let names = type_names.remove(&e.id).unwrap_or_default();
                events_by_ao.entry(ao).or_default().push(map_event(e, names));
            }

            let mut locations_by_region: HashMap<Uuid, Vec<LocationDto>> = HashMap::new();
            for l in location_rows {
                locations_by_region
                    .entry(l.org_id)
                    .or_default()
                    .push(map_location(l));
            }

            let mut aos_by_region: HashMap<Uuid, Vec<MapAoDto>> = HashMap::new();
            let mut regions = Vec::new();
            for org in &org_rows {
                if org.org_type == OrgType::Ao.as_str()
                    && let Some(region_id) = org.parent_id
                {
                    aos_by_region.entry(region_id).or_default().push(MapAoDto {
                        ao: map_org(org.clone()),
                        events: events_by_ao.remove(&org.id).unwrap_or_default(),
                    });
                }
            }
            for org in org_rows {
                if org.org_type == OrgType::Region.as_str() {
                    let id = org.id;
                    regions.push(MapRegionDto {
                        region: map_org(org),
                        locations: locations_by_region.remove(&id).unwrap_or_default(),
                        aos: aos_by_region.remove(&id).unwrap_or_default(),
                    });
                }
            }

            regions.sort_by(|a, b| a.region.name.cmp(&b.region.name));
            Ok(regions)
        }),
    );

    let request = Router::new()
        .procedure(
            "submit",
            Procedure::builder::<ApiError>().mutation(
                |ctx: Ctx, input: SubmitRequestInput| async move {
                    ensure_writable(&ctx)?;
                    enforce_rate_limit(&ctx)?;

                    if input.submitted_by.trim().is_empty() {
                        return Err(api_error(&ctx, "invalid_param", "submitted_by is required"));
                    }

                    let field_errors = requests::validate(&input.payload);
                    if !field_errors.is_empty() {
                        return Err(api_error_with_fields(
                            &ctx,
                            "invalid_param",
                            "validation failed",
                            field_errors,
                        ));
                    }

                    let region_id = requests::resolve_region(&*ctx.db, &input.payload)
                        .await
                        .map_err(|e| apply_error(&ctx, e))?;

                    let original = requests::original_snapshot(&*ctx.db, &input.payload)
                        .await
                        .map_err(|e| apply_error(&ctx, e))?;
                    let meta =
                        requests::meta_value(original, requests::new_snapshot(&input.payload));

                    let id = match input.id.as_deref() {
                        Some(raw) => parse_id(&ctx, "id", raw)?,
                        None => Uuid::new_v4(),
                    };
                    let now = chrono::Utc::now();
                    let payload_json = serde_json::to_value(&input.payload)
                        .map_err(|e| api_error(&ctx, "internal", format!("encode: {e}")))?;

                    let model = update_requests::ActiveModel {
                        id: Set(id),
                        region_id: Set(region_id),
                        kind: Set(input.payload.kind().to_string()),
                        status: Set(RequestStatus::Pending.as_str().to_string()),
                        submitted_by: Set(input.submitted_by.trim().to_string()),
                        payload: Set(payload_json),
                        meta: Set(Some(meta)),
                        reviewed_by: Set(None),
                        reviewed_at: Set(None),
                        created_at: Set(now.into()),
                        updated_at: Set(now.into()),
                    };
                    requests::upsert_request(&*ctx.db, model)
                        .await
                        .map_err(|e| db_error(&ctx, e))?;

                    audit::record(
                        &ctx,
                        "request.submit",
                        &id.to_string(),
                        Some(serde_json::json!({ "kind": input.payload.kind() })),
                    )
                    .await;

                    let row = update_requests::Entity::find_by_id(id)
                        .one(&*ctx.db)
                        .await
                        .map_err(|e| db_error(&ctx, e))?
                        .ok_or_else(|| api_error(&ctx, "internal", "request row missing"))?;
                    Ok(map_request(row))
                },
            ),
        )
        .procedure(
            "list",
            Procedure::builder::<ApiError>().query(
                |ctx: Ctx, input: ListRequestsInput| async move {
                    let mut query = update_requests::Entity::find();
                    if let Some(region) = input.region_id.as_deref() {
                        let region = parse_id(&ctx, "region_id", region)?;
                        query = query.filter(update_requests::Column::RegionId.eq(region));
                    }
                    if let Some(status) = input.status.as_deref() {
                        let status = RequestStatus::parse(status)
                            .ok_or_else(|| api_error(&ctx, "invalid_param", "invalid status"))?;
                        query = query.filter(update_requests::Column::Status.eq(status.as_str()));
                    }

                    let mut rows = query
                        .order_by_desc(update_requests::Column::CreatedAt)
                        .all(&*ctx.db)
                        .await
                        .map_err(|e| db_error(&ctx, e))?;

                    // Moderation queue reads pending-first.
                    rows.sort_by_key(|r| r.status != RequestStatus::Pending.as_str());
                    Ok(rows.into_iter().map(map_request).collect::<Vec<_>>())
                },
            ),
        )
        .procedure(
            "get",
            Procedure::builder::<ApiError>().query(|ctx: Ctx, input: RequestIdInput| async move {
                let id = parse_id(&ctx, "request_id", &input.request_id)?;
                let row = update_requests::Entity::find_by_id(id)
                    .one(&*ctx.db)
                    .await
                    .map_err(|e| db_error(&ctx, e))?
                    .ok_or_else(|| api_error(&ctx, "not_found", "request not found"))?;
                Ok(map_request(row))
            }),
        )
        .procedure(
            "approve",
            Procedure::builder::<ApiError>().mutation(
                |ctx: Ctx, input: RequestIdInput| async move {
                    ensure_writable(&ctx)?;
                    enforce_rate_limit(&ctx)?;

                    let id = parse_id(&ctx, "request_id", &input.request_id)?;
                    let row = update_requests::Entity::find_by_id(id)
                        .one(&*ctx.db)
                        .await
                        .map_err(|e| db_error(&ctx, e))?
                        .ok_or_else(|| api_error(&ctx, "not_found", "request not found"))?;

                    if row.status != RequestStatus::Pending.as_str() {
                        return Err(api_error(
                            &ctx,
                            "failed_precondition",
                            format!("request is {}, not pending", row.status),
                        ));
                    }

                    require_region_moderator(&ctx, row.region_id).await?;

                    let payload: RequestPayload = serde_json::from_value(row.payload.clone())
                        .map_err(|e| {
                            api_error(&ctx, "internal", format!("stored payload: {e}"))
                        })?;

                    let reviewer = ctx
                        .user
                        .as_ref()
                        .and_then(|u| Uuid::parse_str(&u.user_id).ok());
                    let kind = row.kind.clone();
                    let now = chrono::Utc::now();

                    // Apply and mark approved in the same transaction; a failed
                    // apply leaves the request pending and the data untouched.
                    let txn = ctx.db.begin().await.map_err(|e| db_error(&ctx, e))?;
                    if let Err(err) = requests::apply(&txn, &payload).await {
                        let _ = txn.rollback().await;
                        return Err(apply_error(&ctx, err));
                    }

                    let mut active: update_requests::ActiveModel = row.into();
                    active.status = Set(RequestStatus::Approved.as_str().to_string());
                    active.reviewed_by = Set(reviewer);
                    active.reviewed_at = Set(Some(now.into()));
                    active.updated_at = Set(now.into());
                    let updated = match active.update(&txn).await {
                        Ok(v) => v,
                        Err(e) => {
                            let _ = txn.rollback().await;
                            return Err(db_error(&ctx, e));
                        }
                    };
                    txn.commit().await.map_err(|e| db_error(&ctx, e))?;

                    audit::record(
                        &ctx,
                        "request.approve",
                        &id.to_string(),
                        Some(serde_json::json!({ "kind": kind })),
                    )
                    .await;

                    Ok(map_request(updated))
                },
            ),
        )
        .procedure(
            "reject",
            Procedure::builder::<ApiError>().mutation(
                |ctx: Ctx, input: RejectRequestInput| async move {
                    ensure_writable(&ctx)?;
                    enforce_rate_limit(&ctx)?;

                    let id = parse_id(&ctx, "request_id", &input.request_id)?;
                    let row = update_requests::Entity::find_by_id(id)
                        .one(&*ctx.db)
                        .await
                        .map_err(|e| db_error(&ctx, e))?
                        .ok_or_else(|| api_error(&ctx, "not_found", "request not found"))?;

                    if row.status != RequestStatus::Pending.as_str() {
                        return Err(api_error(
                            &ctx,
                            "failed_precondition",
                            format!("request is {}, not pending", row.status),
                        ));
                    }

                    require_region_moderator(&ctx, row.region_id).await?;

                    let reviewer = ctx
                        .user
                        .as_ref()
                        .and_then(|u| Uuid::parse_str(&u.user_id).ok());
                    let kind = row.kind.clone();
                    let now = chrono::Utc::now();

                    let mut meta = row.meta.clone().unwrap_or(serde_json::json!({}));
                    if let Some(reason) = input.reason.as_deref().filter(|r| !r.trim().is_empty())
                        && let Some(obj) = meta.as_object_mut()
                    {
                        obj.insert(
                            "review_note".to_string(),
                            serde_json::Value::String(reason.trim().to_string()),
                        );
                    }

                    let mut active: update_requests::ActiveModel = row.into();
                    active.status = Set(RequestStatus::Rejected.as_str().to_string());
                    active.meta = Set(Some(meta));
                    active.reviewed_by = Set(reviewer);
                    active.reviewed_at = Set(Some(now.into()));
                    active.updated_at = Set(now.into());
                    let updated = active
                        .update(&*ctx.db)
                        .await
                        .map_err(|e| db_error(&ctx, e))?;

                    audit::record(
                        &ctx,
                        "request.reject",
                        &id.to_string(),
                        Some(serde_json::json!({ "kind": kind })),
                    )
                    .await;

                    Ok(map_request(updated))
                },
            ),
        );

    let api_key = Router::new()
        .procedure(
            "create",
            Procedure::builder::<ApiError>().mutation(
                |ctx: Ctx, input: CreateApiKeyInput| async move {
                    ensure_writable(&ctx)?;
                    enforce_rate_limit(&ctx)?;
                    require_admin(&ctx)?;

                    if input.name.trim().is_empty() {
                        return Err(api_error(&ctx, "invalid_param", "name is required"));
                    }

                    let mut grants = Vec::with_capacity(input.grants.len());
                    for g in &input.grants {
                        let org_id = parse_id(&ctx, "grants.org_id", &g.org_id)?;
                        let role = OrgRole::parse(&g.role).ok_or_else(|| {
                            api_error(&ctx, "invalid_param", "invalid grants.role")
                        })?;
                        orgs::Entity::find_by_id(org_id)
                            .one(&*ctx.db)
                            .await
                            .map_err(|e| db_error(&ctx, e))?
                            .ok_or_else(|| api_error(&ctx, "not_found", "grant org not found"))?;
                        grants.push(apikeys::ApiKeyGrant { org_id, role });
                    }

                    let expires_at = match input.expires_at.as_deref() {
                        Some(raw) => Some(
                            chrono::DateTime::parse_from_rfc3339(raw)
                                .map_err(|_| {
                                    api_error(&ctx, "invalid_param", "invalid expires_at")
                                })?
                                .with_timezone(&chrono::Utc),
                        ),
                        None => None,
                    };

                    let token = apikeys::generate_token();
                    let model = api_keys::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        name: Set(input.name.trim().to_string()),
                        token_hash: Set(apikeys::hash_token(&token)),
                        grants: Set(serde_json::to_value(&grants)
                            .map_err(|e| api_error(&ctx, "internal", format!("encode: {e}")))?),
                        expires_at: Set(expires_at.map(Into::into)),
                        revoked_at: Set(None),
                        created_at: Set(chrono::Utc::now().into()),
                    };
                    let inserted = model
                        .insert(&*ctx.db)
                        .await
                        .map_err(|e| db_error(&ctx, e))?;

                    audit::record(
                        &ctx,
                        "apiKey.create",
                        &inserted.id.to_string(),
                        Some(serde_json::json!({ "name": inserted.name })),
                    )
                    .await;

                    Ok(CreatedApiKey {
                        key: map_api_key(inserted),
                        token,
                    })
                },
            ),
        )
        .procedure(
            "list",
            Procedure::builder::<ApiError>().query(|ctx: Ctx, _: ()| async move {
                require_admin(&ctx)?;
                let rows = api_keys::Entity::find()
                    .order_by_desc(api_keys::Column::CreatedAt)
                    .all(&*ctx.db)
                    .await
                    .map_err(|e| db_error(&ctx, e))?;
                Ok(rows.into_iter().map(map_api_key).collect::<Vec<_>>())
            }),
        )
        .procedure(
            "revoke",
            Procedure::builder::<ApiError>().mutation(|ctx: Ctx, input: ApiKeyIdInput| async move {
                ensure_writable(&ctx)?;
                enforce_rate_limit(&ctx)?;
                require_admin(&ctx)?;

                let id = parse_id(&ctx, "key_id", &input.key_id)?;
                let row = api_keys::Entity::find_by_id(id)
                    .one(&*ctx.db)
                    .await
                    .map_err(|e| db_error(&ctx, e))?
                    .ok_or_else(|| api_error(&ctx, "not_found", "api key not found"))?;

                if row.revoked_at.is_some() {
                    return Ok(map_api_key(row));
                }

                let mut active: api_keys::ActiveModel = row.into();
                active.revoked_at = Set(Some(chrono::Utc::now().into()));
                let updated = active
                    .update(&*ctx.db)
                    .await
                    .map_err(|e| db_error(&ctx, e))?;

                audit::record(&ctx, "apiKey.revoke", &updated.id.to_string(), None).await;

                Ok(map_api_key(updated))
            }),
        );

    Router::new()
        .nest("control", control)
        .nest("org", org)
        .nest("location", location)
        .nest("event", event)
        .nest("map", map)
        .nest("request", request)
        .nest("apiKey", api_key)
}
