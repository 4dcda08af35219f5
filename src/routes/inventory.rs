use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{self, AuthStaff},
    models::{CreateStockMovementEntity, ProductEntity, StockMovementEntity},
    schema::{products, stock_movements},
};

pub const PURCHASE: &str = "PURCHASE";
pub const SALE: &str = "SALE";
pub const ADJUSTMENT: &str = "ADJUSTMENT";
pub const RETURN: &str = "RETURN";

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new()
        .nest(
            "/stock-movements",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_stock_movements))
                .routes(utoipa_axum::routes!(create_stock_movement))
                .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
        )
        .nest(
            "/inventory",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_low_stock))
                .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
        )
}

#[derive(Deserialize, IntoParams)]
struct StockMovementListQuery {
    product_id: Option<i32>,
}

/// Fetch the tenant's stock ledger, newest first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Inventory"],
    security(("bearerAuth" = [])),
    params(StockMovementListQuery),
    responses(
        (status = 200, description = "List stock movements", body = StdResponse<Vec<StockMovementEntity>, String>)
    )
)]
async fn get_stock_movements(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Query(query): Query<StockMovementListQuery>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("stock_movements", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mut statement = stock_movements::table
        .filter(stock_movements::tenant_id.eq(staff.tenant_id))
        .order_by(stock_movements::created_at.desc())
        .into_boxed();

    if let Some(product_id) = query.product_id {
        statement = statement.filter(stock_movements::product_id.eq(product_id));
    }

    let movements: Vec<StockMovementEntity> = statement
        .get_results(conn)
        .await
        .context("Failed to get stock movements")?;

    Ok(StdResponse {
        data: Some(movements),
        message: Some("Get stock movements successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct CreateStockMovementReq {
    product_id: i32,
    /// PURCHASE, ADJUSTMENT or RETURN. SALE movements are created by orders.
    movement_type: String,
    /// Signed quantity delta applied to the on-hand stock.
    quantity: i32,
    reason: Option<String>,
}

#[derive(Serialize, ToSchema)]
struct CreateStockMovementRes {
    movement: StockMovementEntity,
    updated_product: ProductEntity,
}

/// Record a stock movement and apply it to the product's on-hand stock.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Inventory"],
    security(("bearerAuth" = [])),
    request_body = CreateStockMovementReq,
    responses(
        (status = 200, description = "Created stock movement successfully", body = StdResponse<CreateStockMovementRes, String>)
    )
)]
async fn create_stock_movement(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<CreateStockMovementReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("stock_movements", "create")?;

    let movement_type = body.movement_type.to_ascii_uppercase();
    match movement_type.as_str() {
        PURCHASE | RETURN => {
            if body.quantity <= 0 {
                return Err(AppError::BadRequest(format!(
                    "{movement_type} movements must have a positive quantity"
                )));
            }
        }
        ADJUSTMENT => {
            if body.quantity == 0 {
                return Err(AppError::BadRequest(
                    "Adjustment quantity cannot be zero".into(),
                ));
            }
        }
        SALE => {
            return Err(AppError::BadRequest(
                "SALE movements are created by orders".into(),
            ));
        }
        _ => {
            return Err(AppError::BadRequest(format!(
                "{} is not a valid movement type",
                body.movement_type
            )));
        }
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let (movement, updated_product) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let exists: i64 = products::table
                    .find(body.product_id)
                    .filter(products::tenant_id.eq(staff.tenant_id))
                    .count()
                    .get_result(conn)
                    .await
                    .context("Failed to check product")?;
                if exists == 0 {
                    return Err(AppError::NotFound);
                }

                // The guard keeps the on-hand stock non-negative under
                // concurrent movements.
                let updated_product: QueryResult<ProductEntity> = diesel::update(
                    products::table
                        .find(body.product_id)
                        .filter(products::stock_quantity.ge(-body.quantity)),
                )
                .set((
                    products::stock_quantity.eq(products::stock_quantity + body.quantity),
                    products::updated_at.eq(diesel::dsl::now),
                ))
                .returning(ProductEntity::as_returning())
                .get_result(conn)
                .await;

                let updated_product = match updated_product {
                    Ok(product) => product,
                    Err(DieselError::NotFound) => {
                        return Err(AppError::BadRequest(
                            "Movement would drive stock negative".into(),
                        ));
                    }
                    Err(err) => return Err(AppError::Other(err.into())),
                };

                let movement: StockMovementEntity =
                    diesel::insert_into(stock_movements::table)
                        .values(CreateStockMovementEntity {
                            tenant_id: staff.tenant_id,
                            product_id: body.product_id,
                            staff_id: staff.staff_id,
                            movement_type,
                            quantity: body.quantity,
                            reason: body.reason,
                            order_id: None,
                        })
                        .returning(StockMovementEntity::as_returning())
                        .get_result(conn)
                        .await
                        .context("Failed to create stock movement")?;

                Ok::<(StockMovementEntity, ProductEntity), AppError>((movement, updated_product))
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(CreateStockMovementRes {
            movement,
            updated_product,
        }),
        message: Some("Created stock movement successfully"),
    })
}

/// Fetch active products at or below their minimum stock.
#[utoipa::path(
    get,
    path = "/low-stock",
    tags = ["Inventory"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List low-stock products", body = StdResponse<Vec<ProductEntity>, String>)
    )
)]
async fn get_low_stock(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("products", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let low_stock: Vec<ProductEntity> = products::table
        .filter(products::tenant_id.eq(staff.tenant_id))
        .filter(products::is_active.eq(true))
        .filter(products::stock_quantity.le(products::min_stock))
        .order_by(products::stock_quantity.asc())
        .get_results(conn)
        .await
        .context("Failed to get low-stock products")?;

    Ok(StdResponse {
        data: Some(low_stock),
        message: Some("Get low-stock products successfully"),
    })
}
