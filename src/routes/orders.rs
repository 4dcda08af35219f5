use std::collections::HashMap;

use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{self, AuthStaff},
    models::{
        CreateOrderEntity, CreateOrderItemEntity, CreatePaymentEntity, CreateStockMovementEntity,
        OrderEntity, OrderItemEntity, PaymentEntity, ProcedureEntity, ProductEntity,
    },
    pos::{PaymentDraft, PaymentMethod, SplitRegister, round_money},
    routes::inventory::{RETURN, SALE},
    schema::{customers, order_items, orders, payments, procedures, products, stock_movements},
};

pub const OPEN: &str = "OPEN";
pub const PARTIALLY_PAID: &str = "PARTIALLY_PAID";
pub const PAID: &str = "PAID";
pub const CANCELLED: &str = "CANCELLED";

/// Statuses that still accept payments or cancellation.
const UNSETTLED: [&str; 2] = [OPEN, PARTIALLY_PAID];

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_orders))
            .routes(utoipa_axum::routes!(get_order))
            .routes(utoipa_axum::routes!(create_order))
            .routes(utoipa_axum::routes!(cancel_order))
            .routes(utoipa_axum::routes!(add_payment))
            .routes(utoipa_axum::routes!(quick_fill))
            .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
    )
}

#[derive(Serialize, ToSchema)]
struct GetOrderRes {
    order: OrderEntity,
    order_items: Vec<OrderItemEntity>,
    balance: Decimal,
}

#[derive(Serialize, ToSchema)]
struct GetOrderDetailRes {
    order: OrderEntity,
    order_items: Vec<OrderItemEntity>,
    payments: Vec<PaymentEntity>,
    balance: Decimal,
}

fn balance_of(order: &OrderEntity) -> Decimal {
    (order.total - order.paid_amount).max(Decimal::ZERO)
}

#[derive(Deserialize, IntoParams)]
struct OrderListQuery {
    status: Option<String>,
}

/// Fetch orders with their items embedded, newest first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(OrderListQuery),
    responses(
        (status = 200, description = "List orders", body = StdResponse<Vec<GetOrderRes>, String>)
    )
)]
async fn get_orders(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Query(query): Query<OrderListQuery>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("orders", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mut statement = orders::table
        .filter(orders::tenant_id.eq(staff.tenant_id))
        .order_by(orders::updated_at.desc())
        .into_boxed();

    if let Some(status) = query.status {
        statement = statement.filter(orders::status.eq(status.to_ascii_uppercase()));
    } else {
        statement = statement.filter(orders::deleted_at.is_null());
    }

    let orders: Vec<OrderEntity> = statement
        .get_results(conn)
        .await
        .context("Failed to get orders")?;

    let order_ids: Vec<i32> = orders.iter().map(|order| order.id).collect();
    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq_any(&order_ids))
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let mut group: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        group.entry(item.order_id).or_default().push(item);
    }

    let orders_with_items: Vec<GetOrderRes> = orders
        .into_iter()
        .map(|order| {
            let order_items = group.remove(&order.id).unwrap_or_default();
            let balance = balance_of(&order);
            GetOrderRes {
                order,
                order_items,
                balance,
            }
        })
        .collect();

    Ok(StdResponse {
        data: Some(orders_with_items),
        message: Some("Get orders successfully"),
    })
}

/// Fetch an order with items, payments and the outstanding balance.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to fetch")
    ),
    responses(
        (status = 200, description = "Get order successfully", body = StdResponse<GetOrderDetailRes, String>)
    )
)]
async fn get_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("orders", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: QueryResult<OrderEntity> = orders::table
        .find(id)
        .filter(orders::tenant_id.eq(staff.tenant_id))
        .get_result(conn)
        .await;

    let order = match order {
        Ok(order) => order,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    let order_items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq(order.id))
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let payments: Vec<PaymentEntity> = payments::table
        .filter(payments::order_id.eq(order.id))
        .order_by(payments::created_at.asc())
        .get_results(conn)
        .await
        .context("Failed to get payments")?;

    let balance = balance_of(&order);

    Ok(StdResponse {
        data: Some(GetOrderDetailRes {
            order,
            order_items,
            payments,
            balance,
        }),
        message: Some("Get order successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct CreateOrderReqItem {
    product_id: Option<i32>,
    procedure_id: Option<i32>,
    quantity: i32,
}

#[derive(Deserialize, ToSchema)]
struct CreateOrderReq {
    customer_id: Option<i32>,
    notes: Option<String>,
    items: Vec<CreateOrderReqItem>,
}

/// Open a POS order. Product lines decrement stock through SALE movements in
/// the same transaction; insufficient stock rejects the whole order.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    request_body = CreateOrderReq,
    responses(
        (status = 200, description = "Created order successfully", body = StdResponse<GetOrderRes, String>)
    )
)]
async fn create_order(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<CreateOrderReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("orders", "create")?;

    if body.items.is_empty() {
        return Err(AppError::BadRequest(
            "An order needs at least one item".into(),
        ));
    }
    for item in &body.items {
        if item.quantity <= 0 {
            return Err(AppError::BadRequest(
                "Item quantities must be positive".into(),
            ));
        }
        match (item.product_id, item.procedure_id) {
            (Some(_), None) | (None, Some(_)) => {}
            _ => {
                return Err(AppError::BadRequest(
                    "Each line must reference exactly one product or procedure".into(),
                ));
            }
        }
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    if let Some(customer_id) = body.customer_id {
        let exists: i64 = customers::table
            .find(customer_id)
            .filter(customers::tenant_id.eq(staff.tenant_id))
            .filter(customers::deleted_at.is_null())
            .count()
            .get_result(conn)
            .await
            .context("Failed to check customer")?;
        if exists == 0 {
            return Err(AppError::BadRequest("Customer does not exist".into()));
        }
    }

    let (order, order_items) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let product_ids: Vec<i32> = body
                    .items
                    .iter()
                    .filter_map(|item| item.product_id)
                    .collect();
                let known_products: Vec<ProductEntity> = products::table
                    .filter(products::tenant_id.eq(staff.tenant_id))
                    .filter(products::is_active.eq(true))
                    .filter(products::id.eq_any(&product_ids))
                    .get_results(conn)
                    .await
                    .context("Failed to get products")?;
                let known_products: HashMap<i32, ProductEntity> = known_products
                    .into_iter()
                    .map(|product| (product.id, product))
                    .collect();

                let procedure_ids: Vec<i32> = body
                    .items
                    .iter()
                    .filter_map(|item| item.procedure_id)
                    .collect();
                let known_procedures: Vec<ProcedureEntity> = procedures::table
                    .filter(procedures::tenant_id.eq(staff.tenant_id))
                    .filter(procedures::is_active.eq(true))
                    .filter(procedures::id.eq_any(&procedure_ids))
                    .get_results(conn)
                    .await
                    .context("Failed to get procedures")?;
                let known_procedures: HashMap<i32, ProcedureEntity> = known_procedures
                    .into_iter()
                    .map(|procedure| (procedure.id, procedure))
                    .collect();

                let mut lines: Vec<(Option<i32>, Option<i32>, String, i32, Decimal)> = Vec::new();
                for item in &body.items {
                    if let Some(product_id) = item.product_id {
                        let product = known_products.get(&product_id).ok_or_else(|| {
                            AppError::BadRequest(format!(
                                "Product {product_id} is unknown or inactive"
                            ))
                        })?;
                        lines.push((
                            Some(product.id),
                            None,
                            product.name.clone(),
                            item.quantity,
                            product.sale_price,
                        ));
                    } else if let Some(procedure_id) = item.procedure_id {
                        let procedure = known_procedures.get(&procedure_id).ok_or_else(|| {
                            AppError::BadRequest(format!(
                                "Procedure {procedure_id} is unknown or inactive"
                            ))
                        })?;
                        lines.push((
                            None,
                            Some(procedure.id),
                            procedure.name.clone(),
                            item.quantity,
                            procedure.price,
                        ));
                    }
                }

                let total = round_money(
                    lines
                        .iter()
                        .map(|(_, _, _, quantity, unit_price)| {
                            *unit_price * Decimal::from(*quantity)
                        })
                        .sum(),
                );

                let order: OrderEntity = diesel::insert_into(orders::table)
                    .values(CreateOrderEntity {
                        tenant_id: staff.tenant_id,
                        customer_id: body.customer_id,
                        staff_id: staff.staff_id,
                        status: OPEN.to_string(),
                        total,
                        paid_amount: Decimal::ZERO,
                        notes: body.notes,
                    })
                    .returning(OrderEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create order")?;

                let rows: Vec<CreateOrderItemEntity> = lines
                    .iter()
                    .map(
                        |(product_id, procedure_id, description, quantity, unit_price)| {
                            CreateOrderItemEntity {
                                order_id: order.id,
                                product_id: *product_id,
                                procedure_id: *procedure_id,
                                description: description.clone(),
                                quantity: *quantity,
                                unit_price: *unit_price,
                                line_total: round_money(*unit_price * Decimal::from(*quantity)),
                            }
                        },
                    )
                    .collect();

                let order_items: Vec<OrderItemEntity> = diesel::insert_into(order_items::table)
                    .values(rows)
                    .returning(OrderItemEntity::as_returning())
                    .get_results(conn)
                    .await
                    .context("Failed to create order items")?;

                // Stock leaves the shelf the moment the sale line is written.
                for (product_id, _, description, quantity, _) in &lines {
                    let Some(product_id) = product_id else {
                        continue;
                    };

                    let decremented: QueryResult<ProductEntity> = diesel::update(
                        products::table
                            .find(*product_id)
                            .filter(products::stock_quantity.ge(*quantity)),
                    )
                    .set((
                        products::stock_quantity.eq(products::stock_quantity - *quantity),
                        products::updated_at.eq(diesel::dsl::now),
                    ))
                    .returning(ProductEntity::as_returning())
                    .get_result(conn)
                    .await;

                    if let Err(DieselError::NotFound) = decremented {
                        return Err(AppError::BadRequest(format!(
                            "Insufficient stock for {description}"
                        )));
                    }
                    decremented.context("Failed to decrement stock")?;

                    diesel::insert_into(stock_movements::table)
                        .values(CreateStockMovementEntity {
                            tenant_id: staff.tenant_id,
                            product_id: *product_id,
                            staff_id: staff.staff_id,
                            movement_type: SALE.to_string(),
                            quantity: -quantity,
                            reason: None,
                            order_id: Some(order.id),
                        })
                        .execute(conn)
                        .await
                        .context("Failed to record sale movement")?;
                }

                Ok::<(OrderEntity, Vec<OrderItemEntity>), AppError>((order, order_items))
            })
        })
        .await?;

    let balance = balance_of(&order);

    Ok(StdResponse {
        data: Some(GetOrderRes {
            order,
            order_items,
            balance,
        }),
        message: Some("Created order successfully"),
    })
}

/// Cancel an unsettled order, restoring product stock with RETURN movements.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to cancel")
    ),
    responses(
        (status = 200, description = "Cancelled order successfully", body = StdResponse<OrderEntity, String>)
    )
)]
async fn cancel_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("orders", "cancel")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cancelled_order = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let cancelled_order: OrderEntity = diesel::update(
                    orders::table
                        .find(id)
                        .filter(orders::tenant_id.eq(staff.tenant_id))
                        .filter(orders::deleted_at.is_null())
                        .filter(orders::status.eq_any(UNSETTLED)),
                )
                .set((
                    orders::status.eq(CANCELLED),
                    orders::deleted_at.eq(diesel::dsl::now),
                    orders::updated_at.eq(diesel::dsl::now),
                ))
                .returning(OrderEntity::as_returning())
                .get_result(conn)
                .await
                .map_err(|_| AppError::NotFound)?;

                let product_lines: Vec<OrderItemEntity> = order_items::table
                    .filter(order_items::order_id.eq(cancelled_order.id))
                    .filter(order_items::product_id.is_not_null())
                    .get_results(conn)
                    .await
                    .context("Failed to get order items")?;

                for line in &product_lines {
                    let Some(product_id) = line.product_id else {
                        continue;
                    };

                    diesel::update(products::table.find(product_id))
                        .set((
                            products::stock_quantity.eq(products::stock_quantity + line.quantity),
                            products::updated_at.eq(diesel::dsl::now),
                        ))
                        .execute(conn)
                        .await
                        .context("Failed to restore stock")?;

                    diesel::insert_into(stock_movements::table)
                        .values(CreateStockMovementEntity {
                            tenant_id: staff.tenant_id,
                            product_id,
                            staff_id: staff.staff_id,
                            movement_type: RETURN.to_string(),
                            quantity: line.quantity,
                            reason: Some("Order cancelled".to_string()),
                            order_id: Some(cancelled_order.id),
                        })
                        .execute(conn)
                        .await
                        .context("Failed to record return movement")?;
                }

                Ok::<OrderEntity, AppError>(cancelled_order)
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(cancelled_order),
        message: Some("Cancelled order successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct AddPaymentReq {
    /// CASH, CARD, TRANSFER or MOBILE.
    method: String,
    amount: Decimal,
    /// Cash handed over; required for CASH payments.
    tendered: Option<Decimal>,
    /// Authorization or transfer reference; required for non-cash payments.
    reference: Option<String>,
}

#[derive(Serialize, ToSchema)]
struct AddPaymentRes {
    payment: PaymentEntity,
    updated_order: OrderEntity,
    balance: Decimal,
}

/// Record a (partial) payment against an order. The split register enforces
/// the method's required fields and the paid <= total invariant.
#[utoipa::path(
    post,
    path = "/{id}/payments",
    tags = ["Payments"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to pay")
    ),
    request_body = AddPaymentReq,
    responses(
        (status = 200, description = "Recorded payment successfully", body = StdResponse<AddPaymentRes, String>)
    )
)]
async fn add_payment(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<AddPaymentReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("payments", "create")?;

    let method = PaymentMethod::parse(&body.method).ok_or_else(|| {
        AppError::BadRequest(format!("{} is not a valid payment method", body.method))
    })?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let (payment, updated_order) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let order: OrderEntity = orders::table
                    .find(id)
                    .filter(orders::tenant_id.eq(staff.tenant_id))
                    .filter(orders::deleted_at.is_null())
                    .filter(orders::status.eq_any(UNSETTLED))
                    .get_result(conn)
                    .await
                    .map_err(|_| AppError::NotFound)?;

                let mut register = SplitRegister::with_paid(order.total, order.paid_amount);
                let applied = register
                    .add(PaymentDraft {
                        method,
                        amount: body.amount,
                        tendered: body.tendered,
                        reference: body.reference,
                    })
                    .map_err(|err| AppError::BadRequest(err.to_string()))?;

                let payment: PaymentEntity = diesel::insert_into(payments::table)
                    .values(CreatePaymentEntity {
                        order_id: order.id,
                        method: applied.method.as_str().to_string(),
                        amount: applied.amount,
                        tendered: applied.tendered,
                        change_given: applied.change_given,
                        reference: applied.reference.clone(),
                        status: "CAPTURED".to_string(),
                    })
                    .returning(PaymentEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create payment")?;

                let new_status = if register.is_settled() {
                    PAID
                } else {
                    PARTIALLY_PAID
                };

                let updated_order: OrderEntity = diesel::update(orders::table.find(order.id))
                    .set((
                        orders::paid_amount.eq(register.paid()),
                        orders::status.eq(new_status),
                        orders::updated_at.eq(diesel::dsl::now),
                    ))
                    .returning(OrderEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to update order")?;

                Ok::<(PaymentEntity, OrderEntity), AppError>((payment, updated_order))
            })
        })
        .await?;

    let balance = balance_of(&updated_order);

    Ok(StdResponse {
        data: Some(AddPaymentRes {
            payment,
            updated_order,
            balance,
        }),
        message: Some("Recorded payment successfully"),
    })
}

#[derive(Deserialize, IntoParams)]
struct QuickFillQuery {
    /// Share of the outstanding balance to cover, 1..=100.
    percent: u32,
}

#[derive(Serialize, ToSchema)]
struct QuickFillRes {
    amount: Decimal,
    balance: Decimal,
}

/// Compute the amount covering a percentage of the outstanding balance.
#[utoipa::path(
    get,
    path = "/{id}/quick-fill",
    tags = ["Payments"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to quote"),
        QuickFillQuery
    ),
    responses(
        (status = 200, description = "Computed quick-fill amount", body = StdResponse<QuickFillRes, String>)
    )
)]
async fn quick_fill(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Query(query): Query<QuickFillQuery>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("payments", "read")?;

    if query.percent == 0 || query.percent > 100 {
        return Err(AppError::BadRequest(
            "Percent must be between 1 and 100".into(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: OrderEntity = orders::table
        .find(id)
        .filter(orders::tenant_id.eq(staff.tenant_id))
        .filter(orders::deleted_at.is_null())
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    let register = SplitRegister::with_paid(order.total, order.paid_amount);

    Ok(StdResponse {
        data: Some(QuickFillRes {
            amount: register.quick_fill(query.percent),
            balance: register.balance(),
        }),
        message: Some("Computed quick-fill amount"),
    })
}
