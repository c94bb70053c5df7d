use sea_orm_migration::prelude::*;

mod m0001_create_orgs;
mod m0002_create_locations;
mod m0003_create_events;
mod m0004_create_event_types;
mod m0005_create_users;
mod m0006_create_refresh_tokens;
mod m0007_create_update_requests;
mod m0008_create_api_keys;
mod m0009_create_audit_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m0001_create_orgs::Migration),
            Box::new(m0002_create_locations::Migration),
            Box::new(m0003_create_events::Migration),
            Box::new(m0004_create_event_types::Migration),
            Box::new(m0005_create_users::Migration),
            Box::new(m0006_create_refresh_tokens::Migration),
            Box::new(m0007_create_update_requests::Migration),
            Box::new(m0008_create_api_keys::Migration),
            Box::new(m0009_create_audit_events::Migration),
        ]
    }
}
