use anyhow::Result;
use axum::Router;
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use vetcare_clinicservice::{
    bootstrap::{self, bootstrap},
    config, db, routes, swagger,
};

/// Migrations embedded into the binary which helps with streamlining image building process
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_tracing();
    bootstrap::init_env();

    let routes = routes::auth::routes_with_openapi()
        .merge(routes::tenants::routes_with_openapi())
        .merge(routes::customers::routes_with_openapi())
        .merge(routes::pets::routes_with_openapi())
        .merge(routes::appointments::routes_with_openapi())
        .merge(routes::staff::routes_with_openapi())
        .merge(routes::suppliers::routes_with_openapi())
        .merge(routes::products::routes_with_openapi())
        .merge(routes::inventory::routes_with_openapi())
        .merge(routes::procedures::routes_with_openapi())
        .merge(routes::treatment_plans::routes_with_openapi())
        .merge(routes::orders::routes_with_openapi())
        .merge(routes::imports::routes_with_openapi());

    let mut openapi = routes.get_openapi().clone();
    openapi.info = utoipa::openapi::InfoBuilder::new()
        .title("VetCare ClinicService API")
        .version("1.0.0")
        .build();
    let swagger_ui = swagger::create_swagger_ui(openapi)?;

    let app = Router::new().merge(routes).merge(swagger_ui);

    tracing::info!("Running migrations...");
    let config = config::load()?;
    let migrations_count = db::run_migrations_blocking(MIGRATIONS, &config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    tracing::info!("Bootstrapping...");
    bootstrap("ClinicService", app).await?;
    Ok(())
}
