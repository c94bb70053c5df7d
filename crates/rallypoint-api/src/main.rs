use std::net::SocketAddr;

use rallypoint_api::auth;
use rallypoint_api::rpc;
use rallypoint_api::security;
use rallypoint_api::security::RequestMeta;
use rallypoint_api::state::AppState;
use rallypoint_core::OrgType;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use sea_orm_migration::MigratorTrait;
use serde::Serialize;

use axum::extract::State;
use axum::middleware;
use axum::{
    Json, Router,
    routing::{get, post},
};

#[derive(Debug, Serialize)]
struct HealthzDb {
    ok: bool,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthzResponse {
    status: &'static str,
    version: &'static str,
    read_only: bool,
    db: HealthzDb,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthzResponse> {
    let db = match state.db.ping().await {
        Ok(()) => HealthzDb {
            ok: true,
            error: None,
        },
        Err(e) => HealthzDb {
            ok: false,
            error: Some(e.to_string()),
        },
    };

    Json(HealthzResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        read_only: std::env::var("RP_READ_ONLY").is_ok_and(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        }),
        db,
    })
}

/// Ensure the nation root org exists so regions have somewhere to hang.
/// Idempotent and safe to run on every boot.
async fn ensure_nation_root(db: &rallypoint_db::sea_orm::DatabaseConnection) -> anyhow::Result<()> {
    use rallypoint_db::entities::orgs;
    use sea_orm::Set;

    let name = std::env::var("RP_NATION_NAME").unwrap_or_else(|_| "F3 Nation".to_string());

    let existing = orgs::Entity::find()
        .filter(orgs::Column::OrgType.eq(OrgType::Nation.as_str()))
        .one(db)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let now = chrono::Utc::now();
    orgs::Entity::insert(orgs::ActiveModel {
        id: Set(sea_orm::prelude::Uuid::new_v4()),
        parent_id: Set(None),
        org_type: Set(OrgType::Nation.as_str().to_string()),
        name: Set(name),
        description: Set(None),
        website: Set(None),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    })
    .exec(db)
    .await?;
    Ok(())
}

async fn init_db_and_migrate() -> anyhow::Result<AppState> {
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?;
    let db = rallypoint_db::connect(&database_url).await?;

    // Apply migrations on boot (idempotent).
    rallypoint_migration::Migrator::up(&db, None).await?;

    ensure_nation_root(&db).await?;

    Ok(AppState {
        db: std::sync::Arc::new(db),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let state = init_db_and_migrate().await?;

    let router = rpc::router();
    let (procedures, _types) = router
        .build()
        .map_err(|errs| anyhow::anyhow!("rspc build failed: {errs:?}"))?;

    // State-changing auth routes are protected by CSRF double-submit + Origin allowlist.
    let auth_router = Router::new()
        .route("/csrf", get(auth::csrf))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .layer(middleware::from_fn(security::csrf_and_origin))
        .with_state(state.clone());

    // Protect /rspc procedures with the JWT cookie or an API key; the public
    // read surface and request submission are allowlisted in the guard.
    let rspc_router = rspc_axum::endpoint(
        procedures,
        |axum::extract::State(state): axum::extract::State<AppState>,
         axum::extract::Extension(meta): axum::extract::Extension<RequestMeta>,
         user: Option<axum::Extension<rpc::AuthUser>>,
         api_key: Option<axum::Extension<rallypoint_api::apikeys::ApiKeyIdentity>>| {
            rpc::Ctx {
                db: state.db.clone(),
                user: user.map(|axum::Extension(u)| u),
                api_key: api_key.map(|axum::Extension(k)| k),
                request_id: meta.request_id,
            }
        },
    )
    .layer(middleware::from_fn_with_state(
        state.clone(),
        security::rspc_auth_guard,
    ));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/whoami", get(auth::whoami))
        .nest("/auth", auth_router)
        .nest("/rspc", rspc_router)
        .layer(middleware::from_fn(security::request_id))
        .with_state(state);
    let addr: SocketAddr = ([0, 0, 0, 0], 8080).into();
    tracing::info!(%addr, "rallypoint-api HTTP listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
