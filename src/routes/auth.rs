use anyhow::Context;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, response::IntoResponse};
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    config, jwt,
    middleware::{self, AuthStaff},
    models::StaffEntity,
    rbac,
    schema::staff_accounts,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new()
        .nest(
            "/auth",
            OpenApiRouter::new().routes(utoipa_axum::routes!(login)),
        )
        .nest(
            "/auth",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(me))
                .routes(utoipa_axum::routes!(my_permissions))
                .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
        )
}

/// Argon2-hashes a plaintext password for storage.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    if password.len() < 8 {
        return Err(AppError::BadRequest(
            "Password must be at least 8 characters long".into(),
        ));
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::Other(anyhow::anyhow!("Failed to hash password: {err}")))
}

#[derive(Deserialize, ToSchema)]
struct LoginReq {
    email: String,
    password: String,
}

#[derive(Serialize, ToSchema)]
struct LoginRes {
    token: String,
    staff: StaffEntity,
}

/// Verify credentials and issue a staff access token.
#[utoipa::path(
    post,
    path = "/login",
    tags = ["Auth"],
    request_body = LoginReq,
    responses(
        (status = 200, description = "Logged in successfully", body = StdResponse<LoginRes, String>)
    )
)]
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    // A missing account and a bad password answer identically.
    let staff: StaffEntity = staff_accounts::table
        .filter(staff_accounts::email.eq(&body.email))
        .filter(staff_accounts::is_active.eq(true))
        .get_result(conn)
        .await
        .map_err(|_| AppError::Unauthorized("Invalid credentials".into()))?;

    let parsed_hash = PasswordHash::new(&staff.password_hash)
        .map_err(|_| AppError::Unauthorized("Invalid credentials".into()))?;
    Argon2::default()
        .verify_password(body.password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized("Invalid credentials".into()))?;

    let config = config::load()?;
    let token = jwt::issue(
        staff.id,
        staff.tenant_id,
        &staff.role,
        &config.auth.jwt_secret,
        config.auth.token_ttl_minutes,
    )
    .map_err(|err| AppError::Other(anyhow::anyhow!(err)))?;

    Ok(StdResponse {
        data: Some(LoginRes { token, staff }),
        message: Some("Logged in successfully"),
    })
}

/// Fetch the authenticated staff account.
#[utoipa::path(
    get,
    path = "/me",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get profile successfully", body = StdResponse<StaffEntity, String>)
    )
)]
async fn me(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let account: StaffEntity = staff_accounts::table
        .find(staff.staff_id)
        .filter(staff_accounts::tenant_id.eq(staff.tenant_id))
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    Ok(StdResponse {
        data: Some(account),
        message: Some("Get profile successfully"),
    })
}

#[derive(Serialize, ToSchema)]
struct PermissionRes {
    resource: String,
    action: String,
    granted: bool,
}

#[derive(Serialize, ToSchema)]
struct PermissionGroupRes {
    domain: String,
    permissions: Vec<PermissionRes>,
}

#[derive(Serialize, ToSchema)]
struct MyPermissionsRes {
    role: String,
    domains: Vec<PermissionGroupRes>,
}

/// The full permission catalog, annotated with what the caller's role grants.
/// Access-check UIs drive their gating off this response.
#[utoipa::path(
    get,
    path = "/permissions",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get permissions successfully", body = StdResponse<MyPermissionsRes, String>)
    )
)]
async fn my_permissions(
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    let domains = rbac::CATALOG
        .iter()
        .map(|group| PermissionGroupRes {
            domain: group.domain.to_string(),
            permissions: group
                .permissions
                .iter()
                .map(|permission| PermissionRes {
                    resource: permission.resource.to_string(),
                    action: permission.action.to_string(),
                    granted: staff.role.allows(permission.resource, permission.action),
                })
                .collect(),
        })
        .collect();

    Ok(StdResponse {
        data: Some(MyPermissionsRes {
            role: staff.role.as_str().to_string(),
            domains,
        }),
        message: Some("Get permissions successfully"),
    })
}
