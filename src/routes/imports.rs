use anyhow::Context;
use axum::{Extension, Json, extract::State, response::IntoResponse};
use base64::Engine;
use diesel::SelectableHelper;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    imports::{self, ImportFormat, ImportKind, ImportReport, ValidRow},
    middleware::{self, AuthStaff},
    models::{
        CreateCustomerEntity, CreateProductEntity, CreateStockMovementEntity,
        CreateSupplierEntity, ProductEntity,
    },
    routes::inventory::ADJUSTMENT,
    schema::{customers, products, stock_movements, suppliers},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/imports",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(preview_import))
            .routes(utoipa_axum::routes!(commit_import))
            .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
    )
}

#[derive(Deserialize, ToSchema)]
struct ImportReq {
    kind: ImportKind,
    format: ImportFormat,
    /// File content, base64-encoded.
    content_base64: String,
}

fn decode_content(content_base64: &str) -> Result<Vec<u8>, AppError> {
    base64::engine::general_purpose::STANDARD
        .decode(content_base64)
        .map_err(|_| AppError::BadRequest("Content is not valid base64".into()))
}

/// Dry-run an import: parse, map columns and validate every row.
#[utoipa::path(
    post,
    path = "/preview",
    tags = ["Imports"],
    security(("bearerAuth" = [])),
    request_body = ImportReq,
    responses(
        (status = 200, description = "Validated import file", body = StdResponse<ImportReport, String>)
    )
)]
async fn preview_import(
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<ImportReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("imports", "preview")?;

    let bytes = decode_content(&body.content_base64)?;
    let (report, _) = imports::run(body.kind, body.format, &bytes)?;

    Ok(StdResponse {
        data: Some(report),
        message: Some("Validated import file"),
    })
}

#[derive(Serialize, ToSchema)]
struct CommitImportRes {
    imported: usize,
    skipped_invalid: usize,
    skipped_duplicates: usize,
    report: ImportReport,
}

/// Re-run the pipeline and insert the valid rows in one transaction. Invalid
/// rows are skipped and reported, as are duplicate product SKUs.
#[utoipa::path(
    post,
    path = "/commit",
    tags = ["Imports"],
    security(("bearerAuth" = [])),
    request_body = ImportReq,
    responses(
        (status = 200, description = "Imported rows successfully", body = StdResponse<CommitImportRes, String>)
    )
)]
async fn commit_import(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<ImportReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("imports", "commit")?;

    let bytes = decode_content(&body.content_base64)?;
    let (report, valid) = imports::run(body.kind, body.format, &bytes)?;
    let valid_count = valid.len();

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let imported = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let mut customer_rows = Vec::new();
                let mut product_rows = Vec::new();
                let mut supplier_rows = Vec::new();

                for row in valid {
                    match row {
                        ValidRow::Customer(row) => customer_rows.push(CreateCustomerEntity {
                            tenant_id: staff.tenant_id,
                            full_name: row.full_name,
                            email: row.email,
                            phone: row.phone,
                            address: row.address,
                            notes: row.notes,
                        }),
                        ValidRow::Product(row) => product_rows.push(CreateProductEntity {
                            tenant_id: staff.tenant_id,
                            sku: row.sku,
                            name: row.name,
                            brand_id: None,
                            supplier_id: None,
                            unit_id: None,
                            cost_price: row.cost_price,
                            sale_price: row.sale_price,
                            stock_quantity: row.stock_quantity,
                            min_stock: row.min_stock,
                        }),
                        ValidRow::Supplier(row) => supplier_rows.push(CreateSupplierEntity {
                            tenant_id: staff.tenant_id,
                            name: row.name,
                            contact_name: row.contact_name,
                            email: row.email,
                            phone: row.phone,
                        }),
                    }
                }

                let mut imported = 0;

                if !customer_rows.is_empty() {
                    imported += diesel::insert_into(customers::table)
                        .values(customer_rows)
                        .execute(conn)
                        .await
                        .context("Failed to import customers")?;
                }

                if !supplier_rows.is_empty() {
                    imported += diesel::insert_into(suppliers::table)
                        .values(supplier_rows)
                        .execute(conn)
                        .await
                        .context("Failed to import suppliers")?;
                }

                if !product_rows.is_empty() {
                    // Duplicate SKUs (within the tenant) are skipped, not errors.
                    let inserted: Vec<ProductEntity> = diesel::insert_into(products::table)
                        .values(product_rows)
                        .on_conflict((products::tenant_id, products::sku))
                        .do_nothing()
                        .returning(ProductEntity::as_returning())
                        .get_results(conn)
                        .await
                        .context("Failed to import products")?;

                    let opening_movements: Vec<CreateStockMovementEntity> = inserted
                        .iter()
                        .filter(|product| product.stock_quantity > 0)
                        .map(|product| CreateStockMovementEntity {
                            tenant_id: staff.tenant_id,
                            product_id: product.id,
                            staff_id: staff.staff_id,
                            movement_type: ADJUSTMENT.to_string(),
                            quantity: product.stock_quantity,
                            reason: Some("Imported opening stock".to_string()),
                            order_id: None,
                        })
                        .collect();

                    if !opening_movements.is_empty() {
                        diesel::insert_into(stock_movements::table)
                            .values(opening_movements)
                            .execute(conn)
                            .await
                            .context("Failed to record imported opening stock")?;
                    }

                    imported += inserted.len();
                }

                Ok::<usize, anyhow::Error>(imported)
            })
        })
        .await
        .context("Transaction failed")?;

    Ok(StdResponse {
        data: Some(CommitImportRes {
            imported,
            skipped_invalid: report.invalid_rows,
            skipped_duplicates: valid_count - imported,
            report,
        }),
        message: Some("Imported rows successfully"),
    })
}
