use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{self, AuthStaff},
    models::{
        BrandEntity, CreateBrandEntity, CreateSupplierEntity, SupplierEntity, UpdateBrandEntity,
        UpdateSupplierEntity,
    },
    schema::{brands, products, suppliers},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new()
        .nest(
            "/suppliers",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_suppliers))
                .routes(utoipa_axum::routes!(create_supplier))
                .routes(utoipa_axum::routes!(update_supplier))
                .routes(utoipa_axum::routes!(delete_supplier))
                .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
        )
        .nest(
            "/brands",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_brands))
                .routes(utoipa_axum::routes!(create_brand))
                .routes(utoipa_axum::routes!(update_brand))
                .routes(utoipa_axum::routes!(delete_brand))
                .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
        )
}

/// Fetch all suppliers of the tenant.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Suppliers"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List suppliers", body = StdResponse<Vec<SupplierEntity>, String>)
    )
)]
async fn get_suppliers(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("suppliers", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let suppliers: Vec<SupplierEntity> = suppliers::table
        .filter(suppliers::tenant_id.eq(staff.tenant_id))
        .order_by(suppliers::name.asc())
        .get_results(conn)
        .await
        .context("Failed to get suppliers")?;

    Ok(StdResponse {
        data: Some(suppliers),
        message: Some("Get suppliers successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct CreateSupplierReq {
    name: String,
    contact_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

/// Create a supplier.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Suppliers"],
    security(("bearerAuth" = [])),
    request_body = CreateSupplierReq,
    responses(
        (status = 200, description = "Created supplier successfully", body = StdResponse<SupplierEntity, String>)
    )
)]
async fn create_supplier(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<CreateSupplierReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("suppliers", "create")?;

    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("Supplier name is required".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let supplier: SupplierEntity = diesel::insert_into(suppliers::table)
        .values(CreateSupplierEntity {
            tenant_id: staff.tenant_id,
            name: body.name,
            contact_name: body.contact_name,
            email: body.email,
            phone: body.phone,
        })
        .returning(SupplierEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create supplier")?;

    Ok(StdResponse {
        data: Some(supplier),
        message: Some("Created supplier successfully"),
    })
}

/// Update a supplier.
#[utoipa::path(
    patch,
    path = "/{id}",
    tags = ["Suppliers"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Supplier ID to update")
    ),
    request_body = UpdateSupplierEntity,
    responses(
        (status = 200, description = "Updated supplier successfully", body = StdResponse<SupplierEntity, String>)
    )
)]
async fn update_supplier(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<UpdateSupplierEntity>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("suppliers", "update")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let supplier: QueryResult<SupplierEntity> = diesel::update(
        suppliers::table
            .find(id)
            .filter(suppliers::tenant_id.eq(staff.tenant_id)),
    )
    .set((body, suppliers::updated_at.eq(diesel::dsl::now)))
    .returning(SupplierEntity::as_returning())
    .get_result(conn)
    .await;

    match supplier {
        Ok(supplier) => Ok(StdResponse {
            data: Some(supplier),
            message: Some("Updated supplier successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// Delete a supplier. Rejected while brands or products still reference it.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Suppliers"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Supplier ID to delete")
    ),
    responses(
        (status = 200, description = "Deleted supplier successfully", body = StdResponse<SupplierEntity, String>)
    )
)]
async fn delete_supplier(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("suppliers", "delete")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let linked_brands: i64 = brands::table
        .filter(brands::supplier_id.eq(id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count linked brands")?;

    let linked_products: i64 = products::table
        .filter(products::supplier_id.eq(id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count linked products")?;

    if linked_brands > 0 || linked_products > 0 {
        return Err(AppError::BadRequest(
            "Supplier is still linked to brands or products".into(),
        ));
    }

    let supplier: QueryResult<SupplierEntity> = diesel::delete(
        suppliers::table
            .find(id)
            .filter(suppliers::tenant_id.eq(staff.tenant_id)),
    )
    .returning(SupplierEntity::as_returning())
    .get_result(conn)
    .await;

    match supplier {
        Ok(supplier) => Ok(StdResponse {
            data: Some(supplier),
            message: Some("Deleted supplier successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// Fetch all brands of the tenant.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Brands"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List brands", body = StdResponse<Vec<BrandEntity>, String>)
    )
)]
async fn get_brands(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("brands", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let brands: Vec<BrandEntity> = brands::table
        .filter(brands::tenant_id.eq(staff.tenant_id))
        .order_by(brands::name.asc())
        .get_results(conn)
        .await
        .context("Failed to get brands")?;

    Ok(StdResponse {
        data: Some(brands),
        message: Some("Get brands successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct CreateBrandReq {
    name: String,
    supplier_id: Option<i32>,
}

/// Create a brand, optionally linked to one of the tenant's suppliers.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Brands"],
    security(("bearerAuth" = [])),
    request_body = CreateBrandReq,
    responses(
        (status = 200, description = "Created brand successfully", body = StdResponse<BrandEntity, String>)
    )
)]
async fn create_brand(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<CreateBrandReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("brands", "create")?;

    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("Brand name is required".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    if let Some(supplier_id) = body.supplier_id {
        let exists: i64 = suppliers::table
            .find(supplier_id)
            .filter(suppliers::tenant_id.eq(staff.tenant_id))
            .count()
            .get_result(conn)
            .await
            .context("Failed to check supplier")?;
        if exists == 0 {
            return Err(AppError::BadRequest("Supplier does not exist".into()));
        }
    }

    let brand: BrandEntity = diesel::insert_into(brands::table)
        .values(CreateBrandEntity {
            tenant_id: staff.tenant_id,
            supplier_id: body.supplier_id,
            name: body.name,
        })
        .returning(BrandEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create brand")?;

    Ok(StdResponse {
        data: Some(brand),
        message: Some("Created brand successfully"),
    })
}

/// Update a brand.
#[utoipa::path(
    patch,
    path = "/{id}",
    tags = ["Brands"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Brand ID to update")
    ),
    request_body = UpdateBrandEntity,
    responses(
        (status = 200, description = "Updated brand successfully", body = StdResponse<BrandEntity, String>)
    )
)]
async fn update_brand(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<UpdateBrandEntity>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("brands", "update")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let brand: QueryResult<BrandEntity> = diesel::update(
        brands::table
            .find(id)
            .filter(brands::tenant_id.eq(staff.tenant_id)),
    )
    .set((body, brands::updated_at.eq(diesel::dsl::now)))
    .returning(BrandEntity::as_returning())
    .get_result(conn)
    .await;

    match brand {
        Ok(brand) => Ok(StdResponse {
            data: Some(brand),
            message: Some("Updated brand successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// Delete a brand. Rejected while products still reference it.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Brands"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Brand ID to delete")
    ),
    responses(
        (status = 200, description = "Deleted brand successfully", body = StdResponse<BrandEntity, String>)
    )
)]
async fn delete_brand(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("brands", "delete")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let linked_products: i64 = products::table
        .filter(products::brand_id.eq(id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count linked products")?;

    if linked_products > 0 {
        return Err(AppError::BadRequest(
            "Brand is still linked to products".into(),
        ));
    }

    let brand: QueryResult<BrandEntity> = diesel::delete(
        brands::table
            .find(id)
            .filter(brands::tenant_id.eq(staff.tenant_id)),
    )
    .returning(BrandEntity::as_returning())
    .get_result(conn)
    .await;

    match brand {
        Ok(brand) => Ok(StdResponse {
            data: Some(brand),
            message: Some("Deleted brand successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}
