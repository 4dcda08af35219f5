use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{
    BoolExpressionMethods, ExpressionMethods, PgTextExpressionMethods, QueryDsl, QueryResult,
    SelectableHelper, result::DatabaseErrorKind,
};
use diesel_async::{AsyncConnection, RunQueryDsl};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{self, AuthStaff},
    models::{
        CreateProductEntity, CreateProductUnitEntity, CreateStockMovementEntity, ProductEntity,
        ProductUnitEntity, UpdateProductEntity,
    },
    routes::inventory::ADJUSTMENT,
    schema::{brands, order_items, product_units, products, stock_movements, suppliers},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new()
        .nest(
            "/products",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_products))
                .routes(utoipa_axum::routes!(get_product))
                .routes(utoipa_axum::routes!(create_product))
                .routes(utoipa_axum::routes!(update_product))
                .routes(utoipa_axum::routes!(delete_product))
                .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
        )
        .nest(
            "/product-units",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_units))
                .routes(utoipa_axum::routes!(create_unit))
                .routes(utoipa_axum::routes!(update_unit))
                .routes(utoipa_axum::routes!(delete_unit))
                .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
        )
}

#[derive(Deserialize, IntoParams)]
struct ProductListQuery {
    /// Case-insensitive substring match on SKU or name.
    q: Option<String>,
    /// When set, only products with the given active flag.
    is_active: Option<bool>,
}

/// Fetch the tenant's product catalog.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    params(ProductListQuery),
    responses(
        (status = 200, description = "List products", body = StdResponse<Vec<ProductEntity>, String>)
    )
)]
async fn get_products(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Query(query): Query<ProductListQuery>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("products", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mut statement = products::table
        .filter(products::tenant_id.eq(staff.tenant_id))
        .order_by(products::name.asc())
        .into_boxed();

    if let Some(q) = query.q.filter(|q| !q.trim().is_empty()) {
        let pattern = format!("%{}%", q.trim());
        statement = statement.filter(
            products::name
                .ilike(pattern.clone())
                .or(products::sku.ilike(pattern)),
        );
    }
    if let Some(is_active) = query.is_active {
        statement = statement.filter(products::is_active.eq(is_active));
    }

    let products: Vec<ProductEntity> = statement
        .get_results(conn)
        .await
        .context("Failed to get products")?;

    Ok(StdResponse {
        data: Some(products),
        message: Some("Get products successfully"),
    })
}

/// Fetch a single product.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID to fetch")
    ),
    responses(
        (status = 200, description = "Get product successfully", body = StdResponse<ProductEntity, String>)
    )
)]
async fn get_product(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("products", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product: QueryResult<ProductEntity> = products::table
        .find(id)
        .filter(products::tenant_id.eq(staff.tenant_id))
        .get_result(conn)
        .await;

    match product {
        Ok(product) => Ok(StdResponse {
            data: Some(product),
            message: Some("Get product successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

#[derive(Deserialize, ToSchema)]
struct CreateProductReq {
    sku: String,
    name: String,
    brand_id: Option<i32>,
    supplier_id: Option<i32>,
    unit_id: Option<i32>,
    cost_price: Decimal,
    sale_price: Decimal,
    #[serde(default)]
    initial_stock: i32,
    #[serde(default)]
    min_stock: i32,
}

/// Create a product. A non-zero opening stock is recorded as an adjustment
/// movement so the stock ledger stays complete.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    request_body = CreateProductReq,
    responses(
        (status = 200, description = "Created product successfully", body = StdResponse<ProductEntity, String>)
    )
)]
async fn create_product(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<CreateProductReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("products", "create")?;

    if body.sku.trim().is_empty() || body.name.trim().is_empty() {
        return Err(AppError::BadRequest("SKU and name are required".into()));
    }
    if body.sale_price < Decimal::ZERO || body.cost_price < Decimal::ZERO {
        return Err(AppError::BadRequest("Prices cannot be negative".into()));
    }
    if body.initial_stock < 0 || body.min_stock < 0 {
        return Err(AppError::BadRequest(
            "Stock quantities cannot be negative".into(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    if let Some(brand_id) = body.brand_id {
        let exists: i64 = brands::table
            .find(brand_id)
            .filter(brands::tenant_id.eq(staff.tenant_id))
            .count()
            .get_result(conn)
            .await
            .context("Failed to check brand")?;
        if exists == 0 {
            return Err(AppError::BadRequest("Brand does not exist".into()));
        }
    }
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
    if let Some(unit_id) = body.unit_id {
        let exists: i64 = product_units::table
            .find(unit_id)
            .filter(product_units::tenant_id.eq(staff.tenant_id))
            .count()
            .get_result(conn)
            .await
            .context("Failed to check unit")?;
        if exists == 0 {
            return Err(AppError::BadRequest("Unit does not exist".into()));
        }
    }

    let product = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let product: QueryResult<ProductEntity> = diesel::insert_into(products::table)
                    .values(CreateProductEntity {
                        tenant_id: staff.tenant_id,
                        sku: body.sku,
                        name: body.name,
                        brand_id: body.brand_id,
                        supplier_id: body.supplier_id,
                        unit_id: body.unit_id,
                        cost_price: body.cost_price,
                        sale_price: body.sale_price,
                        stock_quantity: body.initial_stock,
                        min_stock: body.min_stock,
                    })
                    .returning(ProductEntity::as_returning())
                    .get_result(conn)
                    .await;

                let product = match product {
                    Ok(product) => product,
                    Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                        return Err(AppError::BadRequest("SKU is already in use".into()));
                    }
                    Err(err) => return Err(AppError::Other(err.into())),
                };

                if body.initial_stock > 0 {
                    diesel::insert_into(stock_movements::table)
                        .values(CreateStockMovementEntity {
                            tenant_id: staff.tenant_id,
                            product_id: product.id,
                            staff_id: staff.staff_id,
                            movement_type: ADJUSTMENT.to_string(),
                            quantity: body.initial_stock,
                            reason: Some("Opening stock".to_string()),
                            order_id: None,
                        })
                        .execute(conn)
                        .await
                        .context("Failed to record opening stock")?;
                }

                Ok::<ProductEntity, AppError>(product)
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(product),
        message: Some("Created product successfully"),
    })
}

/// Update a product. Stock changes go through stock movements, not here.
#[utoipa::path(
    patch,
    path = "/{id}",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID to update")
    ),
    request_body = UpdateProductEntity,
    responses(
        (status = 200, description = "Updated product successfully", body = StdResponse<ProductEntity, String>)
    )
)]
async fn update_product(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<UpdateProductEntity>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("products", "update")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product: QueryResult<ProductEntity> = diesel::update(
        products::table
            .find(id)
            .filter(products::tenant_id.eq(staff.tenant_id)),
    )
    .set((body, products::updated_at.eq(diesel::dsl::now)))
    .returning(ProductEntity::as_returning())
    .get_result(conn)
    .await;

    match product {
        Ok(product) => Ok(StdResponse {
            data: Some(product),
            message: Some("Updated product successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            Err(AppError::BadRequest("SKU is already in use".into()))
        }
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// Delete a product with no trading history. Products that have been sold or
/// moved must be deactivated instead.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID to delete")
    ),
    responses(
        (status = 200, description = "Deleted product successfully", body = StdResponse<ProductEntity, String>)
    )
)]
async fn delete_product(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("products", "delete")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let movements: i64 = stock_movements::table
        .filter(stock_movements::product_id.eq(id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count stock movements")?;

    let sold: i64 = order_items::table
        .filter(order_items::product_id.eq(id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count order items")?;

    if movements > 0 || sold > 0 {
        return Err(AppError::BadRequest(
            "Product has trading history; deactivate it instead".into(),
        ));
    }

    let product: QueryResult<ProductEntity> = diesel::delete(
        products::table
            .find(id)
            .filter(products::tenant_id.eq(staff.tenant_id)),
    )
    .returning(ProductEntity::as_returning())
    .get_result(conn)
    .await;

    match product {
        Ok(product) => Ok(StdResponse {
            data: Some(product),
            message: Some("Deleted product successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// Fetch all product units of the tenant.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Product Units"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List product units", body = StdResponse<Vec<ProductUnitEntity>, String>)
    )
)]
async fn get_units(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("product_units", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let units: Vec<ProductUnitEntity> = product_units::table
        .filter(product_units::tenant_id.eq(staff.tenant_id))
        .order_by(product_units::name.asc())
        .get_results(conn)
        .await
        .context("Failed to get product units")?;

    Ok(StdResponse {
        data: Some(units),
        message: Some("Get product units successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct CreateUnitReq {
    name: String,
    abbreviation: String,
}

/// Create a product unit (e.g. "box", "tablet").
#[utoipa::path(
    post,
    path = "/",
    tags = ["Product Units"],
    security(("bearerAuth" = [])),
    request_body = CreateUnitReq,
    responses(
        (status = 200, description = "Created product unit successfully", body = StdResponse<ProductUnitEntity, String>)
    )
)]
async fn create_unit(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<CreateUnitReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("product_units", "create")?;

    if body.name.trim().is_empty() || body.abbreviation.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Name and abbreviation are required".into(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let unit: ProductUnitEntity = diesel::insert_into(product_units::table)
        .values(CreateProductUnitEntity {
            tenant_id: staff.tenant_id,
            name: body.name,
            abbreviation: body.abbreviation,
        })
        .returning(ProductUnitEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create product unit")?;

    Ok(StdResponse {
        data: Some(unit),
        message: Some("Created product unit successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct UpdateUnitReq {
    name: Option<String>,
    abbreviation: Option<String>,
}

/// Update a product unit.
#[utoipa::path(
    patch,
    path = "/{id}",
    tags = ["Product Units"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product unit ID to update")
    ),
    request_body = UpdateUnitReq,
    responses(
        (status = 200, description = "Updated product unit successfully", body = StdResponse<ProductUnitEntity, String>)
    )
)]
async fn update_unit(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<UpdateUnitReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("product_units", "update")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let current: ProductUnitEntity = product_units::table
        .find(id)
        .filter(product_units::tenant_id.eq(staff.tenant_id))
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    let unit: ProductUnitEntity = diesel::update(product_units::table.find(id))
        .set((
            product_units::name.eq(body.name.unwrap_or(current.name)),
            product_units::abbreviation.eq(body.abbreviation.unwrap_or(current.abbreviation)),
            product_units::updated_at.eq(diesel::dsl::now),
        ))
        .returning(ProductUnitEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to update product unit")?;

    Ok(StdResponse {
        data: Some(unit),
        message: Some("Updated product unit successfully"),
    })
}

/// Delete a product unit. Rejected while products still reference it.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Product Units"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product unit ID to delete")
    ),
    responses(
        (status = 200, description = "Deleted product unit successfully", body = StdResponse<ProductUnitEntity, String>)
    )
)]
async fn delete_unit(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("product_units", "delete")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let linked_products: i64 = products::table
        .filter(products::unit_id.eq(id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count linked products")?;

    if linked_products > 0 {
        return Err(AppError::BadRequest(
            "Unit is still linked to products".into(),
        ));
    }

    let unit: QueryResult<ProductUnitEntity> = diesel::delete(
        product_units::table
            .find(id)
            .filter(product_units::tenant_id.eq(staff.tenant_id)),
    )
    .returning(ProductUnitEntity::as_returning())
    .get_result(conn)
    .await;

    match unit {
        Ok(unit) => Ok(StdResponse {
            data: Some(unit),
            message: Some("Deleted product unit successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}
