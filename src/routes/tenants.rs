use anyhow::Context;
use axum::{Extension, Json, extract::State, response::IntoResponse};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{self, AuthStaff},
    models::{
        CreateStaffEntity, CreateTenantEntity, StaffEntity, TenantEntity, UpdateTenantEntity,
    },
    rbac::Role,
    routes::auth::hash_password,
    schema::{staff_accounts, tenants},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new()
        .nest(
            "/tenants",
            OpenApiRouter::new().routes(utoipa_axum::routes!(create_tenant)),
        )
        .nest(
            "/tenants",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_my_tenant))
                .routes(utoipa_axum::routes!(update_my_tenant))
                .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
        )
}

#[derive(Deserialize, ToSchema)]
struct CreateTenantReq {
    name: String,
    legal_name: Option<String>,
    currency: Option<String>,
    timezone: Option<String>,
    admin_full_name: String,
    admin_email: String,
    admin_password: String,
}

#[derive(Serialize, ToSchema)]
struct CreateTenantRes {
    tenant: TenantEntity,
    admin: StaffEntity,
}

/// Public signup: creates the tenant and its first admin account together.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Tenants"],
    request_body = CreateTenantReq,
    responses(
        (status = 200, description = "Tenant created successfully", body = StdResponse<CreateTenantRes, String>)
    )
)]
async fn create_tenant(
    State(state): State<AppState>,
    Json(body): Json<CreateTenantReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("Tenant name is required".into()));
    }
    let password_hash = hash_password(&body.admin_password)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let (tenant, admin) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let tenant: TenantEntity = diesel::insert_into(tenants::table)
                    .values(CreateTenantEntity {
                        name: body.name,
                        legal_name: body.legal_name,
                        currency: body.currency.unwrap_or_else(|| "EUR".to_string()),
                        timezone: body.timezone.unwrap_or_else(|| "UTC".to_string()),
                    })
                    .returning(TenantEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create tenant")?;

                let admin: StaffEntity = diesel::insert_into(staff_accounts::table)
                    .values(CreateStaffEntity {
                        tenant_id: tenant.id,
                        full_name: body.admin_full_name,
                        email: body.admin_email,
                        password_hash,
                        role: Role::Admin.as_str().to_string(),
                    })
                    .returning(StaffEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create admin account")?;

                Ok::<(TenantEntity, StaffEntity), anyhow::Error>((tenant, admin))
            })
        })
        .await
        .context("Transaction failed")?;

    Ok(StdResponse {
        data: Some(CreateTenantRes { tenant, admin }),
        message: Some("Tenant created successfully"),
    })
}

/// Fetch the authenticated tenant's branding and operational settings.
#[utoipa::path(
    get,
    path = "/me",
    tags = ["Tenants"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get tenant successfully", body = StdResponse<TenantEntity, String>)
    )
)]
async fn get_my_tenant(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("tenant_settings", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let tenant: TenantEntity = tenants::table
        .find(staff.tenant_id)
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    Ok(StdResponse {
        data: Some(tenant),
        message: Some("Get tenant successfully"),
    })
}

/// Update branding/operational settings for the authenticated tenant.
#[utoipa::path(
    patch,
    path = "/me",
    tags = ["Tenants"],
    security(("bearerAuth" = [])),
    request_body = UpdateTenantEntity,
    responses(
        (status = 200, description = "Updated tenant successfully", body = StdResponse<TenantEntity, String>)
    )
)]
async fn update_my_tenant(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<UpdateTenantEntity>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("tenant_settings", "update")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let tenant: TenantEntity = diesel::update(tenants::table.find(staff.tenant_id))
        .set((body, tenants::updated_at.eq(diesel::dsl::now)))
        .returning(TenantEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to update tenant")?;

    Ok(StdResponse {
        data: Some(tenant),
        message: Some("Updated tenant successfully"),
    })
}
