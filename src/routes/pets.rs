use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::NaiveDate;
use diesel::{
    ExpressionMethods, QueryDsl, QueryResult, SelectableHelper, result::DatabaseErrorKind,
};
use diesel_async::RunQueryDsl;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{self, AuthStaff},
    models::{CreatePetEntity, PetEntity, UpdatePetEntity},
    schema::{customers, pets},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/pets",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_pets))
            .routes(utoipa_axum::routes!(get_pet))
            .routes(utoipa_axum::routes!(create_pet))
            .routes(utoipa_axum::routes!(update_pet))
            .routes(utoipa_axum::routes!(delete_pet))
            .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
    )
}

#[derive(Deserialize, IntoParams)]
struct PetListQuery {
    customer_id: Option<i32>,
}

/// Fetch all pets of the tenant, optionally narrowed to one customer.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Pets"],
    security(("bearerAuth" = [])),
    params(PetListQuery),
    responses(
        (status = 200, description = "List pets", body = StdResponse<Vec<PetEntity>, String>)
    )
)]
async fn get_pets(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Query(query): Query<PetListQuery>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("pets", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mut statement = pets::table
        .filter(pets::tenant_id.eq(staff.tenant_id))
        .order_by(pets::name.asc())
        .into_boxed();

    if let Some(customer_id) = query.customer_id {
        statement = statement.filter(pets::customer_id.eq(customer_id));
    }

    let pets: Vec<PetEntity> = statement
        .get_results(conn)
        .await
        .context("Failed to get pets")?;

    Ok(StdResponse {
        data: Some(pets),
        message: Some("Get pets successfully"),
    })
}

/// Fetch a single pet.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Pets"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Pet ID to fetch")
    ),
    responses(
        (status = 200, description = "Get pet successfully", body = StdResponse<PetEntity, String>)
    )
)]
async fn get_pet(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("pets", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let pet: QueryResult<PetEntity> = pets::table
        .find(id)
        .filter(pets::tenant_id.eq(staff.tenant_id))
        .get_result(conn)
        .await;

    match pet {
        Ok(pet) => Ok(StdResponse {
            data: Some(pet),
            message: Some("Get pet successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

#[derive(Deserialize, ToSchema)]
struct CreatePetReq {
    customer_id: i32,
    name: String,
    species: String,
    breed: Option<String>,
    sex: Option<String>,
    birth_date: Option<NaiveDate>,
    weight_kg: Option<Decimal>,
    notes: Option<String>,
}

/// Register a pet under one of the tenant's customers.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Pets"],
    security(("bearerAuth" = [])),
    request_body = CreatePetReq,
    responses(
        (status = 200, description = "Created pet successfully", body = StdResponse<PetEntity, String>)
    )
)]
async fn create_pet(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<CreatePetReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("pets", "create")?;

    if body.name.trim().is_empty() || body.species.trim().is_empty() {
        return Err(AppError::BadRequest("Name and species are required".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let owner_exists: i64 = customers::table
        .find(body.customer_id)
        .filter(customers::tenant_id.eq(staff.tenant_id))
        .filter(customers::deleted_at.is_null())
        .count()
        .get_result(conn)
        .await
        .context("Failed to check customer")?;

    if owner_exists == 0 {
        return Err(AppError::BadRequest("Customer does not exist".into()));
    }

    let pet: PetEntity = diesel::insert_into(pets::table)
        .values(CreatePetEntity {
            tenant_id: staff.tenant_id,
            customer_id: body.customer_id,
            name: body.name,
            species: body.species,
            breed: body.breed,
            sex: body.sex,
            birth_date: body.birth_date,
            weight_kg: body.weight_kg,
            notes: body.notes,
        })
        .returning(PetEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create pet")?;

    Ok(StdResponse {
        data: Some(pet),
        message: Some("Created pet successfully"),
    })
}

/// Update a pet.
#[utoipa::path(
    patch,
    path = "/{id}",
    tags = ["Pets"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Pet ID to update")
    ),
    request_body = UpdatePetEntity,
    responses(
        (status = 200, description = "Updated pet successfully", body = StdResponse<PetEntity, String>)
    )
)]
async fn update_pet(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<UpdatePetEntity>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("pets", "update")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let pet: QueryResult<PetEntity> = diesel::update(
        pets::table
            .find(id)
            .filter(pets::tenant_id.eq(staff.tenant_id)),
    )
    .set((body, pets::updated_at.eq(diesel::dsl::now)))
    .returning(PetEntity::as_returning())
    .get_result(conn)
    .await;

    match pet {
        Ok(pet) => Ok(StdResponse {
            data: Some(pet),
            message: Some("Updated pet successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// Delete a pet.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Pets"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Pet ID to delete")
    ),
    responses(
        (status = 200, description = "Deleted pet successfully", body = StdResponse<PetEntity, String>)
    )
)]
async fn delete_pet(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("pets", "delete")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let pet: QueryResult<PetEntity> = diesel::delete(
        pets::table
            .find(id)
            .filter(pets::tenant_id.eq(staff.tenant_id)),
    )
    .returning(PetEntity::as_returning())
    .get_result(conn)
    .await;

    match pet {
        Ok(pet) => Ok(StdResponse {
            data: Some(pet),
            message: Some("Deleted pet successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _)) => Err(
            AppError::BadRequest("Pet has clinical history and cannot be deleted".into()),
        ),
        Err(err) => Err(AppError::Other(err.into())),
    }
}
