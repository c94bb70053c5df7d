//! Update-request application layer.
//!
//! A submitted request is a tagged payload describing one proposed change to
//! AO/location/event data. Submission records it as a pending
//! `update_requests` row (PK upsert, so resubmission with the same id is
//! idempotent); approval applies it inside one transaction via the handler
//! for its variant. Handlers only write through the shared helpers below.

use std::collections::BTreeMap;

use rallypoint_core::{DayOfWeek, OrgType, Recurrence, valid_hhmm};
use rallypoint_db::entities::{event_event_types, event_types, events, locations, orgs, update_requests};
use sea_orm::prelude::{Expr, Uuid};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use specta::Type;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Type)]
pub struct AoFields {
    pub name: String,
    pub description: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Type)]
pub struct LocationFields {
    pub name: String,
    pub description: Option<String>,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_state: Option<String>,
    pub address_zip: Option<String>,
    pub address_country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Type)]
pub struct EventFields {
    pub name: String,
    pub description: Option<String>,
    pub day_of_week: DayOfWeek,
    /// "HHMM" wall clock.
    pub start_time: String,
    pub end_time: Option<String>,
    pub recurrence: Recurrence,
    pub event_type_ids: Vec<String>,
}

/// One proposed change, discriminated by `request_type`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Type)]
#[serde(tag = "request_type", rename_all = "snake_case")]
pub enum RequestPayload {
    /// New AO under a region, with its first location and event.
    CreateAo {
        region_id: String,
        ao: AoFields,
        location: LocationFields,
        event: EventFields,
    },
    /// Additional event for an existing AO.
    CreateEvent {
        ao_id: String,
        location_id: String,
        event: EventFields,
    },
    EditAo {
        ao_id: String,
        ao: AoFields,
    },
    EditLocation {
        location_id: String,
        location: LocationFields,
    },
    EditEvent {
        event_id: String,
        event: EventFields,
    },
    /// Reassign an AO's events to another location: an existing one, or a new
    /// one inserted from `location`.
    MoveAo {
        ao_id: String,
        location_id: Option<String>,
        location: Option<LocationFields>,
    },
    DeleteAo {
        ao_id: String,
    },
    DeleteEvent {
        event_id: String,
    },
}

impl RequestPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            RequestPayload::CreateAo { .. } => "create_ao",
            RequestPayload::CreateEvent { .. } => "create_event",
            RequestPayload::EditAo { .. } => "edit_ao",
            RequestPayload::EditLocation { .. } => "edit_location",
            RequestPayload::EditEvent { .. } => "edit_event",
            RequestPayload::MoveAo { .. } => "move_ao",
            RequestPayload::DeleteAo { .. } => "delete_ao",
            RequestPayload::DeleteEvent { .. } => "delete_event",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{field}: {message}")]
    Invalid { field: String, message: String },

    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

fn invalid(field: &str, message: &str) -> ApplyError {
    ApplyError::Invalid {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, ApplyError> {
    Uuid::parse_str(raw).map_err(|_| invalid(field, "not a valid id"))
}

fn push_event_field_errors(prefix: &str, event: &EventFields, errors: &mut BTreeMap<String, String>) {
    if event.name.trim().is_empty() {
        errors.insert(format!("{prefix}.name"), "must not be empty".to_string());
    }
    if !valid_hhmm(&event.start_time) {
        errors.insert(
            format!("{prefix}.start_time"),
            "expected HHMM".to_string(),
        );
    }
    if let Some(end) = &event.end_time
        && !valid_hhmm(end)
    {
        errors.insert(format!("{prefix}.end_time"), "expected HHMM".to_string());
    }
}

fn push_location_field_errors(
    prefix: &str,
    location: &LocationFields,
    errors: &mut BTreeMap<String, String>,
) {
    if location.name.trim().is_empty() {
        errors.insert(format!("{prefix}.name"), "must not be empty".to_string());
    }
    if let Some(lat) = location.latitude
        && !(-90.0..=90.0).contains(&lat)
    {
        errors.insert(format!("{prefix}.latitude"), "out of range".to_string());
    }
    if let Some(lng) = location.longitude
        && !(-180.0..=180.0).contains(&lng)
    {
        errors.insert(format!("{prefix}.longitude"), "out of range".to_string());
    }
}

/// Field-level validation run at submit time. Empty map = acceptable.
pub fn validate(payload: &RequestPayload) -> BTreeMap<String, String> {
    let mut errors = BTreeMap::new();
    match payload {
        RequestPayload::CreateAo {
            ao,
            location,
            event,
            ..
        } => {
            if ao.name.trim().is_empty() {
                errors.insert("ao.name".to_string(), "must not be empty".to_string());
            }
            push_location_field_errors("location", location, &mut errors);
            push_event_field_errors("event", event, &mut errors);
        }
        RequestPayload::CreateEvent { event, .. } | RequestPayload::EditEvent { event, .. } => {
            push_event_field_errors("event", event, &mut errors);
        }
        RequestPayload::EditAo { ao, .. } => {
            if ao.name.trim().is_empty() {
                errors.insert("ao.name".to_string(), "must not be empty".to_string());
            }
        }
        RequestPayload::EditLocation { location, .. } => {
            push_location_field_errors("location", location, &mut errors);
        }
        RequestPayload::MoveAo {
            location_id,
            location,
            ..
        } => {
            match (location_id, location) {
                (None, None) => {
                    errors.insert(
                        "location_id".to_string(),
                        "either location_id or location is required".to_string(),
                    );
                }
                (Some(_), Some(_)) => {
                    errors.insert(
                        "location_id".to_string(),
                        "location_id and location are mutually exclusive".to_string(),
                    );
                }
                (None, Some(fields)) => push_location_field_errors("location", fields, &mut errors),
                (Some(_), None) => {}
            }
        }
        RequestPayload::DeleteAo { .. } | RequestPayload::DeleteEvent { .. } => {}
    }
    errors
}

async fn load_org<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    expected: OrgType,
) -> Result<orgs::Model, ApplyError> {
    let org = orgs::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or(ApplyError::NotFound {
            entity: "org",
            id: id.to_string(),
        })?;
    if org.org_type != expected.as_str() {
        return Err(ApplyError::NotFound {
            entity: expected.as_str(),
            id: id.to_string(),
        });
    }
    Ok(org)
}

async fn load_location<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<locations::Model, ApplyError> {
    locations::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or(ApplyError::NotFound {
            entity: "location",
            id: id.to_string(),
        })
}

async fn load_event<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<events::Model, ApplyError> {
    events::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or(ApplyError::NotFound {
            entity: "event",
            id: id.to_string(),
        })
}

/// Region an AO belongs to. The parent link must exist and point at a region.
async fn ao_region<C: ConnectionTrait>(conn: &C, ao: &orgs::Model) -> Result<Uuid, ApplyError> {
    let parent_id = ao.parent_id.ok_or(ApplyError::NotFound {
        entity: "region",
        id: format!("parent of {}", ao.id),
    })?;
    let region = load_org(conn, parent_id, OrgType::Region).await?;
    Ok(region.id)
}

/// Resolve the governing region of a payload. Every request must map to one;
/// submission fails otherwise.
pub async fn resolve_region<C: ConnectionTrait>(
    conn: &C,
    payload: &RequestPayload,
) -> Result<Uuid, ApplyError> {
    match payload {
        RequestPayload::CreateAo { region_id, .. } => {
            let id = parse_uuid("region_id", region_id)?;
            let region = load_org(conn, id, OrgType::Region).await?;
            Ok(region.id)
        }
        RequestPayload::CreateEvent { ao_id, .. }
        | RequestPayload::EditAo { ao_id, .. }
        | RequestPayload::MoveAo { ao_id, .. }
        | RequestPayload::DeleteAo { ao_id } => {
            let id = parse_uuid("ao_id", ao_id)?;
            let ao = load_org(conn, id, OrgType::Ao).await?;
            ao_region(conn, &ao).await
        }
        RequestPayload::EditLocation { location_id, .. } => {
            let id = parse_uuid("location_id", location_id)?;
            let location = load_location(conn, id).await?;
            Ok(location.org_id)
        }
        RequestPayload::EditEvent { event_id, .. }
        | RequestPayload::DeleteEvent { event_id } => {
            let id = parse_uuid("event_id", event_id)?;
            let event = load_event(conn, id).await?;
            let ao = load_org(conn, event.org_id, OrgType::Ao).await?;
            ao_region(conn, &ao).await
        }
    }
}

// --- shared write helpers -------------------------------------------------
//
// Every handler goes through these; nothing else in the crate writes org,
// location, or event rows.

pub async fn insert_location<C: ConnectionTrait>(
    conn: &C,
    region_id: Uuid,
    fields: &LocationFields,
) -> Result<Uuid, ApplyError> {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now();
    locations::ActiveModel {
        id: Set(id),
        org_id: Set(region_id),
        name: Set(fields.name.clone()),
        description: Set(fields.description.clone()),
        address_street: Set(fields.address_street.clone()),
        address_city: Set(fields.address_city.clone()),
        address_state: Set(fields.address_state.clone()),
        address_zip: Set(fields.address_zip.clone()),
        address_country: Set(fields.address_country.clone()),
        latitude: Set(fields.latitude),
        longitude: Set(fields.longitude),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(conn)
    .await?;
    Ok(id)
}

pub async fn update_location<C: ConnectionTrait>(
    conn: &C,
    location_id: Uuid,
    fields: &LocationFields,
) -> Result<(), ApplyError> {
    let model = load_location(conn, location_id).await?;
    let mut active: locations::ActiveModel = model.into();
    active.name = Set(fields.name.clone());
    active.description = Set(fields.description.clone());
    active.address_street = Set(fields.address_street.clone());
    active.address_city = Set(fields.address_city.clone());
    active.address_state = Set(fields.address_state.clone());
    active.address_zip = Set(fields.address_zip.clone());
    active.address_country = Set(fields.address_country.clone());
    active.latitude = Set(fields.latitude);
    active.longitude = Set(fields.longitude);
    active.updated_at = Set(chrono::Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

pub async fn create_ao<C: ConnectionTrait>(
    conn: &C,
    region_id: Uuid,
    fields: &AoFields,
) -> Result<Uuid, ApplyError> {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now();
    orgs::ActiveModel {
        id: Set(id),
        parent_id: Set(Some(region_id)),
        org_type: Set(OrgType::Ao.as_str().to_string()),
        name: Set(fields.name.clone()),
        description: Set(fields.description.clone()),
        website: Set(fields.website.clone()),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(conn)
    .await?;
    Ok(id)
}

pub async fn update_ao<C: ConnectionTrait>(
    conn: &C,
    ao_id: Uuid,
    fields: &AoFields,
) -> Result<(), ApplyError> {
    let model = load_org(conn, ao_id, OrgType::Ao).await?;
    let mut active: orgs::ActiveModel = model.into();
    active.name = Set(fields.name.clone());
    active.description = Set(fields.description.clone());
    active.website = Set(fields.website.clone());
    active.updated_at = Set(chrono::Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

pub async fn insert_event<C: ConnectionTrait>(
    conn: &C,
    ao_id: Uuid,
    location_id: Uuid,
    fields: &EventFields,
) -> Result<Uuid, ApplyError> {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now();
    events::ActiveModel {
        id: Set(id),
        org_id: Set(ao_id),
        location_id: Set(location_id),
        name: Set(fields.name.clone()),
        description: Set(fields.description.clone()),
        day_of_week: Set(fields.day_of_week.as_str().to_string()),
        start_time: Set(fields.start_time.clone()),
        end_time: Set(fields.end_time.clone()),
        recurrence: Set(fields.recurrence.as_str().to_string()),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(conn)
    .await?;
    Ok(id)
}

pub async fn update_event<C: ConnectionTrait>(
    conn: &C,
    event_id: Uuid,
    fields: &EventFields,
) -> Result<(), ApplyError> {
    let model = load_event(conn, event_id).await?;
    let mut active: events::ActiveModel = model.into();
    active.name = Set(fields.name.clone());
    active.description = Set(fields.description.clone());
    active.day_of_week = Set(fields.day_of_week.as_str().to_string());
    active.start_time = Set(fields.start_time.clone());
    active.end_time = Set(fields.end_time.clone());
    active.recurrence = Set(fields.recurrence.as_str().to_string());
    active.updated_at = Set(chrono::Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

/// Replace an event's type assignments wholesale.
pub async fn update_event_types<C: ConnectionTrait>(
    conn: &C,
    event_id: Uuid,
    type_ids: &[String],
) -> Result<(), ApplyError> {
    let mut ids = Vec::with_capacity(type_ids.len());
    for raw in type_ids {
        let id = parse_uuid("event_type_ids", raw)?;
        event_types::Entity::find_by_id(id)
            .one(conn)
            .await?
            .ok_or(ApplyError::NotFound {
                entity: "event_type",
                id: id.to_string(),
            })?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    event_event_types::Entity::delete_many()
        .filter(event_event_types::Column::EventId.eq(event_id))
        .exec(conn)
        .await?;

    if ids.is_empty() {
        return Ok(());
    }

    event_event_types::Entity::insert_many(ids.into_iter().map(|type_id| {
        event_event_types::ActiveModel {
            event_id: Set(event_id),
            event_type_id: Set(type_id),
        }
    }))
    .exec(conn)
    .await?;
    Ok(())
}

// --- handlers -------------------------------------------------------------

async fn apply_create_ao<C: ConnectionTrait>(
    conn: &C,
    region_id: &str,
    ao: &AoFields,
    location: &LocationFields,
    event: &EventFields,
) -> Result<(), ApplyError> {
    let region = load_org(conn, parse_uuid("region_id", region_id)?, OrgType::Region).await?;
    let ao_id = create_ao(conn, region.id, ao).await?;
    let location_id = insert_location(conn, region.id, location).await?;
    let event_id = insert_event(conn, ao_id, location_id, event).await?;
    update_event_types(conn, event_id, &event.event_type_ids).await
}

async fn apply_create_event<C: ConnectionTrait>(
    conn: &C,
    ao_id: &str,
    location_id: &str,
    event: &EventFields,
) -> Result<(), ApplyError> {
    let ao = load_org(conn, parse_uuid("ao_id", ao_id)?, OrgType::Ao).await?;
    let location = load_location(conn, parse_uuid("location_id", location_id)?).await?;
    let event_id = insert_event(conn, ao.id, location.id, event).await?;
    update_event_types(conn, event_id, &event.event_type_ids).await
}

async fn apply_move_ao<C: ConnectionTrait>(
    conn: &C,
    ao_id: &str,
    location_id: &Option<String>,
    location: &Option<LocationFields>,
) -> Result<(), ApplyError> {
    let ao = load_org(conn, parse_uuid("ao_id", ao_id)?, OrgType::Ao).await?;
    let region_id = ao_region(conn, &ao).await?;

    let target = match (location_id, location) {
        (Some(raw), None) => {
            let existing = load_location(conn, parse_uuid("location_id", raw)?).await?;
            if existing.org_id != region_id {
                return Err(invalid("location_id", "location belongs to another region"));
            }
            existing.id
        }
        (None, Some(fields)) => insert_location(conn, region_id, fields).await?,
        _ => return Err(invalid("location_id", "exactly one target location required")),
    };

    events::Entity::update_many()
        .col_expr(events::Column::LocationId, Expr::value(target))
        .col_expr(events::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
        .filter(events::Column::OrgId.eq(ao.id))
        .exec(conn)
        .await?;
    Ok(())
}

async fn apply_delete_ao<C: ConnectionTrait>(conn: &C, ao_id: &str) -> Result<(), ApplyError> {
    let ao = load_org(conn, parse_uuid("ao_id", ao_id)?, OrgType::Ao).await?;
    let now = chrono::Utc::now();

    let mut active: orgs::ActiveModel = ao.clone().into();
    active.is_active = Set(false);
    active.updated_at = Set(now.into());
    active.update(conn).await?;

    events::Entity::update_many()
        .col_expr(events::Column::IsActive, Expr::value(false))
        .col_expr(events::Column::UpdatedAt, Expr::value(now))
        .filter(events::Column::OrgId.eq(ao.id))
        .exec(conn)
        .await?;
    Ok(())
}

async fn apply_delete_event<C: ConnectionTrait>(conn: &C, event_id: &str) -> Result<(), ApplyError> {
    let event = load_event(conn, parse_uuid("event_id", event_id)?).await?;
    let mut active: events::ActiveModel = event.into();
    active.is_active = Set(false);
    active.updated_at = Set(chrono::Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

/// Apply one payload. Callers run this inside a transaction; any error rolls
/// the whole request back.
pub async fn apply<C: ConnectionTrait>(conn: &C, payload: &RequestPayload) -> Result<(), ApplyError> {
    match payload {
        RequestPayload::CreateAo {
            region_id,
            ao,
            location,
            event,
        } => apply_create_ao(conn, region_id, ao, location, event).await,
        RequestPayload::CreateEvent {
            ao_id,
            location_id,
            event,
        } => apply_create_event(conn, ao_id, location_id, event).await,
        RequestPayload::EditAo { ao_id, ao } => {
            update_ao(conn, parse_uuid("ao_id", ao_id)?, ao).await
        }
        RequestPayload::EditLocation {
            location_id,
            location,
        } => update_location(conn, parse_uuid("location_id", location_id)?, location).await,
        RequestPayload::EditEvent { event_id, event } => {
            let id = parse_uuid("event_id", event_id)?;
            update_event(conn, id, event).await?;
            update_event_types(conn, id, &event.event_type_ids).await
        }
        RequestPayload::MoveAo {
            ao_id,
            location_id,
            location,
        } => apply_move_ao(conn, ao_id, location_id, location).await,
        RequestPayload::DeleteAo { ao_id } => apply_delete_ao(conn, ao_id).await,
        RequestPayload::DeleteEvent { event_id } => apply_delete_event(conn, event_id).await,
    }
}

// --- meta snapshots -------------------------------------------------------

/// Denormalized original/new snapshot stored on the request row so history
/// can be read without chasing ids through the live schema.
pub fn meta_value(
    original: Option<serde_json::Value>,
    new: serde_json::Value,
) -> serde_json::Value {
    serde_json::json!({
        "original": original,
        "new": new,
    })
}

/// Identifier fields of the requested state, by variant.
pub fn new_snapshot(payload: &RequestPayload) -> serde_json::Value {
    match payload {
        RequestPayload::CreateAo {
            region_id,
            ao,
            location,
            event,
        } => serde_json::json!({
            "region_id": region_id,
            "ao_name": ao.name,
            "location_name": location.name,
            "event_name": event.name,
        }),
        RequestPayload::CreateEvent {
            ao_id,
            location_id,
            event,
        } => serde_json::json!({
            "ao_id": ao_id,
            "location_id": location_id,
            "event_name": event.name,
        }),
        RequestPayload::EditAo { ao_id, ao } => serde_json::json!({
            "ao_id": ao_id,
            "ao_name": ao.name,
        }),
        RequestPayload::EditLocation {
            location_id,
            location,
        } => serde_json::json!({
            "location_id": location_id,
            "location_name": location.name,
        }),
        RequestPayload::EditEvent { event_id, event } => serde_json::json!({
            "event_id": event_id,
            "event_name": event.name,
        }),
        RequestPayload::MoveAo {
            ao_id,
            location_id,
            location,
        } => serde_json::json!({
            "ao_id": ao_id,
            "location_id": location_id,
            "location_name": location.as_ref().map(|l| l.name.clone()),
        }),
        RequestPayload::DeleteAo { ao_id } => serde_json::json!({ "ao_id": ao_id }),
        RequestPayload::DeleteEvent { event_id } => serde_json::json!({ "event_id": event_id }),
    }
}

/// Current-state snapshot for edit/move/delete payloads; None for creates.
pub async fn original_snapshot<C: ConnectionTrait>(
    conn: &C,
    payload: &RequestPayload,
) -> Result<Option<serde_json::Value>, ApplyError> {
    let snapshot = match payload {
        RequestPayload::CreateAo { .. } | RequestPayload::CreateEvent { .. } => None,
        RequestPayload::EditAo { ao_id, .. }
        | RequestPayload::DeleteAo { ao_id }
        | RequestPayload::MoveAo { ao_id, .. } => {
            let ao = load_org(conn, parse_uuid("ao_id", ao_id)?, OrgType::Ao).await?;
            Some(serde_json::json!({
                "ao_id": ao.id,
                "ao_name": ao.name,
                "region_id": ao.parent_id,
            }))
        }
        RequestPayload::EditLocation { location_id, .. } => {
            let location = load_location(conn, parse_uuid("location_id", location_id)?).await?;
            Some(serde_json::json!({
                "location_id": location.id,
                "location_name": location.name,
                "region_id": location.org_id,
            }))
        }
        RequestPayload::EditEvent { event_id, .. }
        | RequestPayload::DeleteEvent { event_id } => {
            let event = load_event(conn, parse_uuid("event_id", event_id)?).await?;
            Some(serde_json::json!({
                "event_id": event.id,
                "event_name": event.name,
                "ao_id": event.org_id,
                "location_id": event.location_id,
            }))
        }
    };
    Ok(snapshot)
}

/// Insert-or-update keyed on the primary key: writing an existing id updates
/// every non-id column.
pub async fn upsert_request<C: ConnectionTrait>(
    conn: &C,
    model: update_requests::ActiveModel,
) -> Result<(), sea_orm::DbErr> {
    update_requests::Entity::insert(model)
        .on_conflict(
            OnConflict::column(update_requests::Column::Id)
                .update_columns([
                    update_requests::Column::RegionId,
                    update_requests::Column::Kind,
                    update_requests::Column::Status,
                    update_requests::Column::SubmittedBy,
                    update_requests::Column::Payload,
                    update_requests::Column::Meta,
                    update_requests::Column::ReviewedBy,
                    update_requests::Column::ReviewedAt,
                    update_requests::Column::CreatedAt,
                    update_requests::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> EventFields {
        EventFields {
            name: "The Forge".to_string(),
            description: None,
            day_of_week: DayOfWeek::Saturday,
            start_time: "0600".to_string(),
            end_time: Some("0700".to_string()),
            recurrence: Recurrence::Weekly,
            event_type_ids: vec![],
        }
    }

    #[test]
    fn payloads_discriminate_on_request_type() {
        let raw = serde_json::json!({
            "request_type": "delete_event",
            "event_id": "2c9e4a1e-0000-0000-0000-000000000001",
        });
        let payload: RequestPayload = serde_json::from_value(raw).unwrap();
        assert!(matches!(payload, RequestPayload::DeleteEvent { .. }));
        assert_eq!(payload.kind(), "delete_event");
    }

    #[test]
    fn unknown_request_type_is_rejected() {
        let raw = serde_json::json!({ "request_type": "rename_nation" });
        assert!(serde_json::from_value::<RequestPayload>(raw).is_err());
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let payload = RequestPayload::EditEvent {
            event_id: "x".to_string(),
            event: sample_event(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["request_type"], payload.kind());
    }

    #[test]
    fn validate_flags_bad_event_times() {
        let mut event = sample_event();
        event.start_time = "9am".to_string();
        let payload = RequestPayload::EditEvent {
            event_id: "x".to_string(),
            event,
        };
        let errors = validate(&payload);
        assert_eq!(errors.get("event.start_time").unwrap(), "expected HHMM");
    }

    #[test]
    fn validate_flags_move_without_target() {
        let payload = RequestPayload::MoveAo {
            ao_id: "x".to_string(),
            location_id: None,
            location: None,
        };
        assert!(validate(&payload).contains_key("location_id"));
    }

    #[test]
    fn validate_flags_out_of_range_coordinates() {
        let payload = RequestPayload::EditLocation {
            location_id: "x".to_string(),
            location: LocationFields {
                name: "The Hill".to_string(),
                description: None,
                address_street: None,
                address_city: None,
                address_state: None,
                address_zip: None,
                address_country: None,
                latitude: Some(91.0),
                longitude: Some(-200.0),
            },
        };
        let errors = validate(&payload);
        assert!(errors.contains_key("location.latitude"));
        assert!(errors.contains_key("location.longitude"));
    }

    #[test]
    fn validate_accepts_well_formed_create() {
        let payload = RequestPayload::CreateAo {
            region_id: "r".to_string(),
            ao: AoFields {
                name: "The Anvil".to_string(),
                description: None,
                website: None,
            },
            location: LocationFields {
                name: "City Park".to_string(),
                description: None,
                address_street: None,
                address_city: Some("Raleigh".to_string()),
                address_state: Some("NC".to_string()),
                address_zip: None,
                address_country: None,
                latitude: Some(35.79),
                longitude: Some(-78.64),
            },
            event: sample_event(),
        };
        assert!(validate(&payload).is_empty());
    }

    #[test]
    fn meta_snapshot_shape() {
        let payload = RequestPayload::DeleteAo {
            ao_id: "abc".to_string(),
        };
        let meta = meta_value(
            Some(serde_json::json!({ "ao_id": "abc", "ao_name": "The Anvil" })),
            new_snapshot(&payload),
        );
        assert_eq!(meta["original"]["ao_name"], "The Anvil");
        assert_eq!(meta["new"]["ao_id"], "abc");

        let create = RequestPayload::CreateEvent {
            ao_id: "abc".to_string(),
            location_id: "loc".to_string(),
            event: sample_event(),
        };
        let meta = meta_value(None, new_snapshot(&create));
        assert!(meta["original"].is_null());
        assert_eq!(meta["new"]["event_name"], "The Forge");
    }
}
