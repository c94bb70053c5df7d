use sea_orm::entity::prelude::*;

/// Event ↔ event-type join. Replaced wholesale when an event's types change.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "event_event_types")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub event_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub event_type_id: Uuid,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::events::Entity",
        from = "Column::EventId",
        to = "super::events::Column::Id"
    )]
    Events,
    #[sea_orm(
        belongs_to = "super::event_types::Entity",
        from = "Column::EventTypeId",
        to = "super::event_types::Column::Id"
    )]
    EventTypes,
}

impl Related<super::events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Events.def()
    }
}

impl Related<super::event_types::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EventTypes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
