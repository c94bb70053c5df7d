use sea_orm::entity::prelude::*;

/// Auditable proposed change to org/location/event data.
///
/// `payload` is the tagged request body as submitted; `meta` is a
/// denormalized original/new snapshot preserving identifier fields that have
/// no dedicated column, so history survives schema evolution.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "update_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    /// Governing region; always resolvable at submit time.
    pub region_id: Uuid,
    pub kind: String,
    pub status: String,
    /// Free-form submitter contact (e.g. email); submissions are unauthenticated.
    pub submitted_by: String,
    pub payload: Json,
    pub meta: Option<Json>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::orgs::Entity",
        from = "Column::RegionId",
        to = "super::orgs::Column::Id"
    )]
    Orgs,
}

impl Related<super::orgs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orgs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
