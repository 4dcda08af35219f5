use std::collections::HashMap;

use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{
    ExpressionMethods, QueryDsl, QueryResult, SelectableHelper,
    result::DatabaseErrorKind,
};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{self, AuthStaff},
    models::{
        CreateSpecialtyEntity, CreateStaffEntity, SpecialtyEntity, StaffEntity,
        StaffSpecialtyEntity, UpdateStaffEntity,
    },
    rbac::Role,
    routes::auth::hash_password,
    schema::{specialties, staff_accounts, staff_specialties},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new()
        .nest(
            "/staff",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_staff))
                .routes(utoipa_axum::routes!(create_staff))
                .routes(utoipa_axum::routes!(update_staff))
                .routes(utoipa_axum::routes!(deactivate_staff))
                .routes(utoipa_axum::routes!(set_staff_specialties))
                .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
        )
        .nest(
            "/specialties",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_specialties))
                .routes(utoipa_axum::routes!(create_specialty))
                .routes(utoipa_axum::routes!(delete_specialty))
                .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
        )
}

#[derive(Serialize, ToSchema)]
struct StaffWithSpecialties {
    staff: StaffEntity,
    specialties: Vec<SpecialtyEntity>,
}

/// Fetch all staff accounts of the tenant with their specialties embedded.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Staff"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List staff", body = StdResponse<Vec<StaffWithSpecialties>, String>)
    )
)]
async fn get_staff(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("staff", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let accounts: Vec<StaffEntity> = staff_accounts::table
        .filter(staff_accounts::tenant_id.eq(staff.tenant_id))
        .order_by(staff_accounts::full_name.asc())
        .get_results(conn)
        .await
        .context("Failed to get staff")?;

    let staff_ids: Vec<i32> = accounts.iter().map(|account| account.id).collect();

    let assignments: Vec<(StaffSpecialtyEntity, SpecialtyEntity)> = staff_specialties::table
        .inner_join(specialties::table)
        .filter(staff_specialties::staff_id.eq_any(&staff_ids))
        .select((
            StaffSpecialtyEntity::as_select(),
            SpecialtyEntity::as_select(),
        ))
        .get_results(conn)
        .await
        .context("Failed to get staff specialties")?;

    let mut group: HashMap<i32, Vec<SpecialtyEntity>> = HashMap::new();
    for (assignment, specialty) in assignments {
        group.entry(assignment.staff_id).or_default().push(specialty);
    }

    let staff_with_specialties: Vec<StaffWithSpecialties> = accounts
        .into_iter()
        .map(|account| {
            let specialties = group.remove(&account.id).unwrap_or_default();
            StaffWithSpecialties {
                staff: account,
                specialties,
            }
        })
        .collect();

    Ok(StdResponse {
        data: Some(staff_with_specialties),
        message: Some("Get staff successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct CreateStaffReq {
    full_name: String,
    email: String,
    password: String,
    role: String,
}

/// Create a staff account with a hashed password.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Staff"],
    security(("bearerAuth" = [])),
    request_body = CreateStaffReq,
    responses(
        (status = 200, description = "Created staff successfully", body = StdResponse<StaffEntity, String>)
    )
)]
async fn create_staff(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<CreateStaffReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("staff", "create")?;

    let role = Role::parse(&body.role)
        .ok_or_else(|| AppError::BadRequest(format!("{} is not a valid role", body.role)))?;
    let password_hash = hash_password(&body.password)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let account: QueryResult<StaffEntity> = diesel::insert_into(staff_accounts::table)
        .values(CreateStaffEntity {
            tenant_id: staff.tenant_id,
            full_name: body.full_name,
            email: body.email,
            password_hash,
            role: role.as_str().to_string(),
        })
        .returning(StaffEntity::as_returning())
        .get_result(conn)
        .await;

    match account {
        Ok(account) => Ok(StdResponse {
            data: Some(account),
            message: Some("Created staff successfully"),
        }),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            Err(AppError::BadRequest("Email is already in use".into()))
        }
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// Update a staff account's profile or role.
#[utoipa::path(
    patch,
    path = "/{id}",
    tags = ["Staff"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Staff ID to update")
    ),
    request_body = UpdateStaffEntity,
    responses(
        (status = 200, description = "Updated staff successfully", body = StdResponse<StaffEntity, String>)
    )
)]
async fn update_staff(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<UpdateStaffEntity>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("staff", "update")?;

    if let Some(role) = &body.role {
        if Role::parse(role).is_none() {
            return Err(AppError::BadRequest(format!("{role} is not a valid role")));
        }
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let account: QueryResult<StaffEntity> = diesel::update(
        staff_accounts::table
            .find(id)
            .filter(staff_accounts::tenant_id.eq(staff.tenant_id)),
    )
    .set((body, staff_accounts::updated_at.eq(diesel::dsl::now)))
    .returning(StaffEntity::as_returning())
    .get_result(conn)
    .await;

    match account {
        Ok(account) => Ok(StdResponse {
            data: Some(account),
            message: Some("Updated staff successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// Deactivate a staff account. Deactivated accounts cannot log in.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Staff"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Staff ID to deactivate")
    ),
    responses(
        (status = 200, description = "Deactivated staff successfully", body = StdResponse<StaffEntity, String>)
    )
)]
async fn deactivate_staff(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("staff", "deactivate")?;

    if id == staff.staff_id {
        return Err(AppError::BadRequest(
            "You cannot deactivate your own account".into(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let account: QueryResult<StaffEntity> = diesel::update(
        staff_accounts::table
            .find(id)
            .filter(staff_accounts::tenant_id.eq(staff.tenant_id)),
    )
    .set((
        staff_accounts::is_active.eq(false),
        staff_accounts::updated_at.eq(diesel::dsl::now),
    ))
    .returning(StaffEntity::as_returning())
    .get_result(conn)
    .await;

    match account {
        Ok(account) => Ok(StdResponse {
            data: Some(account),
            message: Some("Deactivated staff successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

#[derive(Deserialize, ToSchema)]
struct SetStaffSpecialtiesReq {
    specialty_ids: Vec<i32>,
}

/// Replace a staff member's specialty assignments atomically.
#[utoipa::path(
    put,
    path = "/{id}/specialties",
    tags = ["Staff"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Staff ID to assign specialties to")
    ),
    request_body = SetStaffSpecialtiesReq,
    responses(
        (status = 200, description = "Assigned specialties successfully", body = StdResponse<Vec<SpecialtyEntity>, String>)
    )
)]
async fn set_staff_specialties(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<SetStaffSpecialtiesReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("staff", "update")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let assigned = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let account: i64 = staff_accounts::table
                    .find(id)
                    .filter(staff_accounts::tenant_id.eq(staff.tenant_id))
                    .count()
                    .get_result(conn)
                    .await
                    .context("Failed to check staff account")?;

                if account == 0 {
                    return Err(AppError::NotFound);
                }

                let known: Vec<SpecialtyEntity> = specialties::table
                    .filter(specialties::tenant_id.eq(staff.tenant_id))
                    .filter(specialties::id.eq_any(&body.specialty_ids))
                    .get_results(conn)
                    .await
                    .context("Failed to get specialties")?;

                if known.len() != body.specialty_ids.len() {
                    return Err(AppError::BadRequest(
                        "One or more specialties do not exist".into(),
                    ));
                }

                diesel::delete(staff_specialties::table.filter(staff_specialties::staff_id.eq(id)))
                    .execute(conn)
                    .await
                    .context("Failed to clear specialties")?;

                let rows: Vec<StaffSpecialtyEntity> = body
                    .specialty_ids
                    .iter()
                    .map(|specialty_id| StaffSpecialtyEntity {
                        staff_id: id,
                        specialty_id: *specialty_id,
                    })
                    .collect();

                diesel::insert_into(staff_specialties::table)
                    .values(rows)
                    .execute(conn)
                    .await
                    .context("Failed to assign specialties")?;

                Ok::<Vec<SpecialtyEntity>, AppError>(known)
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(assigned),
        message: Some("Assigned specialties successfully"),
    })
}

/// Fetch all specialties of the tenant.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Specialties"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List specialties", body = StdResponse<Vec<SpecialtyEntity>, String>)
    )
)]
async fn get_specialties(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("specialties", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let specialties: Vec<SpecialtyEntity> = specialties::table
        .filter(specialties::tenant_id.eq(staff.tenant_id))
        .order_by(specialties::name.asc())
        .get_results(conn)
        .await
        .context("Failed to get specialties")?;

    Ok(StdResponse {
        data: Some(specialties),
        message: Some("Get specialties successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct CreateSpecialtyReq {
    name: String,
    description: Option<String>,
}

/// Create a specialty.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Specialties"],
    security(("bearerAuth" = [])),
    request_body = CreateSpecialtyReq,
    responses(
        (status = 200, description = "Created specialty successfully", body = StdResponse<SpecialtyEntity, String>)
    )
)]
async fn create_specialty(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<CreateSpecialtyReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("specialties", "create")?;

    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("Specialty name is required".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let specialty: SpecialtyEntity = diesel::insert_into(specialties::table)
        .values(CreateSpecialtyEntity {
            tenant_id: staff.tenant_id,
            name: body.name,
            description: body.description,
        })
        .returning(SpecialtyEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create specialty")?;

    Ok(StdResponse {
        data: Some(specialty),
        message: Some("Created specialty successfully"),
    })
}

/// Delete a specialty. Assignments to staff are removed with it.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Specialties"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Specialty ID to delete")
    ),
    responses(
        (status = 200, description = "Deleted specialty successfully", body = StdResponse<SpecialtyEntity, String>)
    )
)]
async fn delete_specialty(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("specialties", "delete")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let specialty: QueryResult<SpecialtyEntity> = diesel::delete(
        specialties::table
            .find(id)
            .filter(specialties::tenant_id.eq(staff.tenant_id)),
    )
    .returning(SpecialtyEntity::as_returning())
    .get_result(conn)
    .await;

    match specialty {
        Ok(specialty) => Ok(StdResponse {
            data: Some(specialty),
            message: Some("Deleted specialty successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}
