pub mod api_keys;
pub mod audit_events;
pub mod event_event_types;
pub mod event_types;
pub mod events;
pub mod locations;
pub mod org_roles;
pub mod orgs;
pub mod refresh_tokens;
pub mod update_requests;
pub mod users;
