use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
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
    models::{CreateProcedureEntity, ProcedureEntity, UpdateProcedureEntity},
    schema::{order_items, procedures, treatment_plan_items},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/procedures",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_procedures))
            .routes(utoipa_axum::routes!(create_procedure))
            .routes(utoipa_axum::routes!(update_procedure))
            .routes(utoipa_axum::routes!(delete_procedure))
            .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
    )
}

#[derive(Deserialize, IntoParams)]
struct ProcedureListQuery {
    is_active: Option<bool>,
}

/// Fetch the tenant's billable procedures.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Procedures"],
    security(("bearerAuth" = [])),
    params(ProcedureListQuery),
    responses(
        (status = 200, description = "List procedures", body = StdResponse<Vec<ProcedureEntity>, String>)
    )
)]
async fn get_procedures(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Query(query): Query<ProcedureListQuery>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("procedures", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mut statement = procedures::table
        .filter(procedures::tenant_id.eq(staff.tenant_id))
        .order_by(procedures::name.asc())
        .into_boxed();

    if let Some(is_active) = query.is_active {
        statement = statement.filter(procedures::is_active.eq(is_active));
    }

    let procedures: Vec<ProcedureEntity> = statement
        .get_results(conn)
        .await
        .context("Failed to get procedures")?;

    Ok(StdResponse {
        data: Some(procedures),
        message: Some("Get procedures successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct CreateProcedureReq {
    name: String,
    category: Option<String>,
    price: Decimal,
    duration_minutes: Option<i32>,
}

/// Create a billable procedure.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Procedures"],
    security(("bearerAuth" = [])),
    request_body = CreateProcedureReq,
    responses(
        (status = 200, description = "Created procedure successfully", body = StdResponse<ProcedureEntity, String>)
    )
)]
async fn create_procedure(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<CreateProcedureReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("procedures", "create")?;

    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("Procedure name is required".into()));
    }
    if body.price < Decimal::ZERO {
        return Err(AppError::BadRequest("Price cannot be negative".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let procedure: ProcedureEntity = diesel::insert_into(procedures::table)
        .values(CreateProcedureEntity {
            tenant_id: staff.tenant_id,
            name: body.name,
            category: body.category,
            price: body.price,
            duration_minutes: body.duration_minutes,
        })
        .returning(ProcedureEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create procedure")?;

    Ok(StdResponse {
        data: Some(procedure),
        message: Some("Created procedure successfully"),
    })
}

/// Update a procedure. Price changes never touch already-authored plans.
#[utoipa::path(
    patch,
    path = "/{id}",
    tags = ["Procedures"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Procedure ID to update")
    ),
    request_body = UpdateProcedureEntity,
    responses(
        (status = 200, description = "Updated procedure successfully", body = StdResponse<ProcedureEntity, String>)
    )
)]
async fn update_procedure(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<UpdateProcedureEntity>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("procedures", "update")?;

    if let Some(price) = body.price {
        if price < Decimal::ZERO {
            return Err(AppError::BadRequest("Price cannot be negative".into()));
        }
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let procedure: QueryResult<ProcedureEntity> = diesel::update(
        procedures::table
            .find(id)
            .filter(procedures::tenant_id.eq(staff.tenant_id)),
    )
    .set((body, procedures::updated_at.eq(diesel::dsl::now)))
    .returning(ProcedureEntity::as_returning())
    .get_result(conn)
    .await;

    match procedure {
        Ok(procedure) => Ok(StdResponse {
            data: Some(procedure),
            message: Some("Updated procedure successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// Delete a procedure that was never billed or planned; otherwise deactivate.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Procedures"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Procedure ID to delete")
    ),
    responses(
        (status = 200, description = "Deleted procedure successfully", body = StdResponse<ProcedureEntity, String>)
    )
)]
async fn delete_procedure(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("procedures", "delete")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let planned: i64 = treatment_plan_items::table
        .filter(treatment_plan_items::procedure_id.eq(id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count plan items")?;

    let billed: i64 = order_items::table
        .filter(order_items::procedure_id.eq(id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count order items")?;

    if planned > 0 || billed > 0 {
        return Err(AppError::BadRequest(
            "Procedure has clinical or billing history; deactivate it instead".into(),
        ));
    }

    let procedure: QueryResult<ProcedureEntity> = diesel::delete(
        procedures::table
            .find(id)
            .filter(procedures::tenant_id.eq(staff.tenant_id)),
    )
    .returning(ProcedureEntity::as_returning())
    .get_result(conn)
    .await;

    match procedure {
        Ok(procedure) => Ok(StdResponse {
            data: Some(procedure),
            message: Some("Deleted procedure successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}
