use std::collections::HashMap;

use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{self, AuthStaff},
    models::{
        CreateOrderEntity, CreateOrderItemEntity, CreateTreatmentPlanEntity,
        CreateTreatmentPlanItemEntity, OrderEntity, OrderItemEntity, ProcedureEntity,
        TreatmentPlanEntity, TreatmentPlanItemEntity,
    },
    pos::round_money,
    schema::{order_items, orders, pets, procedures, treatment_plan_items, treatment_plans},
};

pub const DRAFT: &str = "DRAFT";
pub const PRESENTED: &str = "PRESENTED";
pub const ACCEPTED: &str = "ACCEPTED";
pub const DECLINED: &str = "DECLINED";
pub const INVOICED: &str = "INVOICED";

/// Plan lifecycle reachable through the transition endpoint. The
/// ACCEPTED -> INVOICED move happens only through checkout.
pub fn can_transition(from: &str, to: &str) -> bool {
    matches!(
        (from, to),
        (DRAFT, PRESENTED) | (PRESENTED, ACCEPTED) | (PRESENTED, DECLINED)
    )
}

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/treatment-plans",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_plans))
            .routes(utoipa_axum::routes!(get_plan))
            .routes(utoipa_axum::routes!(create_plan))
            .routes(utoipa_axum::routes!(replace_plan_items))
            .routes(utoipa_axum::routes!(transition_plan))
            .routes(utoipa_axum::routes!(checkout_plan))
            .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
    )
}

fn plan_total(items: &[TreatmentPlanItemEntity]) -> Decimal {
    round_money(
        items
            .iter()
            .map(|item| item.unit_price * Decimal::from(item.quantity))
            .sum(),
    )
}

#[derive(Serialize, ToSchema)]
struct GetPlanRes {
    plan: TreatmentPlanEntity,
    items: Vec<TreatmentPlanItemEntity>,
    total: Decimal,
}

#[derive(Deserialize, IntoParams)]
struct PlanListQuery {
    pet_id: Option<i32>,
    status: Option<String>,
}

/// Fetch treatment plans with items and computed totals embedded.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Treatment Plans"],
    security(("bearerAuth" = [])),
    params(PlanListQuery),
    responses(
        (status = 200, description = "List treatment plans", body = StdResponse<Vec<GetPlanRes>, String>)
    )
)]
async fn get_plans(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Query(query): Query<PlanListQuery>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("treatment_plans", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mut statement = treatment_plans::table
        .filter(treatment_plans::tenant_id.eq(staff.tenant_id))
        .order_by(treatment_plans::updated_at.desc())
        .into_boxed();

    if let Some(pet_id) = query.pet_id {
        statement = statement.filter(treatment_plans::pet_id.eq(pet_id));
    }
    if let Some(status) = query.status {
        statement = statement.filter(treatment_plans::status.eq(status.to_ascii_uppercase()));
    }

    let plans: Vec<TreatmentPlanEntity> = statement
        .get_results(conn)
        .await
        .context("Failed to get treatment plans")?;

    let plan_ids: Vec<i32> = plans.iter().map(|plan| plan.id).collect();
    let items: Vec<TreatmentPlanItemEntity> = treatment_plan_items::table
        .filter(treatment_plan_items::plan_id.eq_any(&plan_ids))
        .get_results(conn)
        .await
        .context("Failed to get plan items")?;

    let mut group: HashMap<i32, Vec<TreatmentPlanItemEntity>> = HashMap::new();
    for item in items {
        group.entry(item.plan_id).or_default().push(item);
    }

    let plans_with_items: Vec<GetPlanRes> = plans
        .into_iter()
        .map(|plan| {
            let items = group.remove(&plan.id).unwrap_or_default();
            let total = plan_total(&items);
            GetPlanRes { plan, items, total }
        })
        .collect();

    Ok(StdResponse {
        data: Some(plans_with_items),
        message: Some("Get treatment plans successfully"),
    })
}

/// Fetch a treatment plan with items and its computed total.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Treatment Plans"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Treatment plan ID to fetch")
    ),
    responses(
        (status = 200, description = "Get treatment plan successfully", body = StdResponse<GetPlanRes, String>)
    )
)]
async fn get_plan(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("treatment_plans", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let plan: TreatmentPlanEntity = treatment_plans::table
        .find(id)
        .filter(treatment_plans::tenant_id.eq(staff.tenant_id))
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    let items: Vec<TreatmentPlanItemEntity> = treatment_plan_items::table
        .filter(treatment_plan_items::plan_id.eq(plan.id))
        .get_results(conn)
        .await
        .context("Failed to get plan items")?;

    let total = plan_total(&items);

    Ok(StdResponse {
        data: Some(GetPlanRes { plan, items, total }),
        message: Some("Get treatment plan successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct PlanItemReq {
    procedure_id: i32,
    quantity: i32,
    /// Overrides the procedure's current price when set.
    unit_price: Option<Decimal>,
}

#[derive(Deserialize, ToSchema)]
struct CreatePlanReq {
    pet_id: i32,
    title: String,
    notes: Option<String>,
    items: Vec<PlanItemReq>,
}

/// Resolves request items against the tenant's active procedures, freezing
/// unit prices at authoring time.
async fn resolve_plan_items(
    conn: &mut crate::db::DbConnection<'_>,
    tenant_id: i32,
    items: &[PlanItemReq],
) -> Result<Vec<(i32, i32, Decimal)>, AppError> {
    if items.is_empty() {
        return Err(AppError::BadRequest(
            "A treatment plan needs at least one item".into(),
        ));
    }
    if items.iter().any(|item| item.quantity <= 0) {
        return Err(AppError::BadRequest(
            "Item quantities must be positive".into(),
        ));
    }

    let procedure_ids: Vec<i32> = items.iter().map(|item| item.procedure_id).collect();
    let known: Vec<ProcedureEntity> = procedures::table
        .filter(procedures::tenant_id.eq(tenant_id))
        .filter(procedures::is_active.eq(true))
        .filter(procedures::id.eq_any(&procedure_ids))
        .get_results(conn)
        .await
        .context("Failed to get procedures")?;

    let prices: HashMap<i32, Decimal> = known.into_iter().map(|p| (p.id, p.price)).collect();

    items
        .iter()
        .map(|item| {
            let price = item.unit_price.or_else(|| prices.get(&item.procedure_id).copied());
            match price {
                Some(price) if price >= Decimal::ZERO && prices.contains_key(&item.procedure_id) => {
                    Ok((item.procedure_id, item.quantity, round_money(price)))
                }
                _ => Err(AppError::BadRequest(format!(
                    "Procedure {} is unknown or inactive",
                    item.procedure_id
                ))),
            }
        })
        .collect()
}

/// Author a treatment plan with its items in one transaction.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Treatment Plans"],
    security(("bearerAuth" = [])),
    request_body = CreatePlanReq,
    responses(
        (status = 200, description = "Created treatment plan successfully", body = StdResponse<GetPlanRes, String>)
    )
)]
async fn create_plan(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<CreatePlanReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("treatment_plans", "create")?;

    if body.title.trim().is_empty() {
        return Err(AppError::BadRequest("Plan title is required".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let pet_exists: i64 = pets::table
        .find(body.pet_id)
        .filter(pets::tenant_id.eq(staff.tenant_id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to check pet")?;
    if pet_exists == 0 {
        return Err(AppError::BadRequest("Pet does not exist".into()));
    }

    let resolved = resolve_plan_items(conn, staff.tenant_id, &body.items).await?;

    let (plan, items) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let plan: TreatmentPlanEntity = diesel::insert_into(treatment_plans::table)
                    .values(CreateTreatmentPlanEntity {
                        tenant_id: staff.tenant_id,
                        pet_id: body.pet_id,
                        staff_id: staff.staff_id,
                        title: body.title,
                        status: DRAFT.to_string(),
                        notes: body.notes,
                    })
                    .returning(TreatmentPlanEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create treatment plan")?;

                let rows: Vec<CreateTreatmentPlanItemEntity> = resolved
                    .into_iter()
                    .map(|(procedure_id, quantity, unit_price)| CreateTreatmentPlanItemEntity {
                        plan_id: plan.id,
                        procedure_id,
                        quantity,
                        unit_price,
                    })
                    .collect();

                let items: Vec<TreatmentPlanItemEntity> =
                    diesel::insert_into(treatment_plan_items::table)
                        .values(rows)
                        .returning(TreatmentPlanItemEntity::as_returning())
                        .get_results(conn)
                        .await
                        .context("Failed to create plan items")?;

                Ok::<(TreatmentPlanEntity, Vec<TreatmentPlanItemEntity>), anyhow::Error>((
                    plan, items,
                ))
            })
        })
        .await
        .context("Transaction failed")?;

    let total = plan_total(&items);

    Ok(StdResponse {
        data: Some(GetPlanRes { plan, items, total }),
        message: Some("Created treatment plan successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct ReplacePlanItemsReq {
    items: Vec<PlanItemReq>,
}

/// Replace a draft plan's items wholesale.
#[utoipa::path(
    put,
    path = "/{id}/items",
    tags = ["Treatment Plans"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Treatment plan ID to edit")
    ),
    request_body = ReplacePlanItemsReq,
    responses(
        (status = 200, description = "Replaced plan items successfully", body = StdResponse<GetPlanRes, String>)
    )
)]
async fn replace_plan_items(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<ReplacePlanItemsReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("treatment_plans", "update")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let plan: TreatmentPlanEntity = treatment_plans::table
        .find(id)
        .filter(treatment_plans::tenant_id.eq(staff.tenant_id))
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    if plan.status != DRAFT {
        return Err(AppError::BadRequest(
            "Only draft plans can be edited".into(),
        ));
    }

    let resolved = resolve_plan_items(conn, staff.tenant_id, &body.items).await?;

    let (plan, items) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                diesel::delete(
                    treatment_plan_items::table.filter(treatment_plan_items::plan_id.eq(id)),
                )
                .execute(conn)
                .await
                .context("Failed to clear plan items")?;

                let rows: Vec<CreateTreatmentPlanItemEntity> = resolved
                    .into_iter()
                    .map(|(procedure_id, quantity, unit_price)| CreateTreatmentPlanItemEntity {
                        plan_id: id,
                        procedure_id,
                        quantity,
                        unit_price,
                    })
                    .collect();

                let items: Vec<TreatmentPlanItemEntity> =
                    diesel::insert_into(treatment_plan_items::table)
                        .values(rows)
                        .returning(TreatmentPlanItemEntity::as_returning())
                        .get_results(conn)
                        .await
                        .context("Failed to create plan items")?;

                let plan: TreatmentPlanEntity =
                    diesel::update(treatment_plans::table.find(id))
                        .set(treatment_plans::updated_at.eq(diesel::dsl::now))
                        .returning(TreatmentPlanEntity::as_returning())
                        .get_result(conn)
                        .await
                        .context("Failed to touch plan")?;

                Ok::<(TreatmentPlanEntity, Vec<TreatmentPlanItemEntity>), anyhow::Error>((
                    plan, items,
                ))
            })
        })
        .await
        .context("Transaction failed")?;

    let total = plan_total(&items);

    Ok(StdResponse {
        data: Some(GetPlanRes { plan, items, total }),
        message: Some("Replaced plan items successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct TransitionPlanReq {
    status: String,
}

/// Move a plan between DRAFT, PRESENTED, ACCEPTED and DECLINED.
#[utoipa::path(
    post,
    path = "/{id}/transition",
    tags = ["Treatment Plans"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Treatment plan ID to transition")
    ),
    request_body = TransitionPlanReq,
    responses(
        (status = 200, description = "Transitioned plan successfully", body = StdResponse<TreatmentPlanEntity, String>)
    )
)]
async fn transition_plan(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<TransitionPlanReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("treatment_plans", "transition")?;

    let to = body.status.to_ascii_uppercase();

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let current: TreatmentPlanEntity = treatment_plans::table
        .find(id)
        .filter(treatment_plans::tenant_id.eq(staff.tenant_id))
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    if !can_transition(&current.status, &to) {
        return Err(AppError::BadRequest(format!(
            "Cannot transition plan from {} to {}",
            current.status, to
        )));
    }

    let plan: TreatmentPlanEntity = diesel::update(
        treatment_plans::table
            .find(id)
            .filter(treatment_plans::status.eq(&current.status)),
    )
    .set((
        treatment_plans::status.eq(&to),
        treatment_plans::updated_at.eq(diesel::dsl::now),
    ))
    .returning(TreatmentPlanEntity::as_returning())
    .get_result(conn)
    .await
    .map_err(|_| AppError::BadRequest("Plan changed concurrently".into()))?;

    Ok(StdResponse {
        data: Some(plan),
        message: Some("Transitioned plan successfully"),
    })
}

#[derive(Serialize, ToSchema)]
struct CheckoutPlanRes {
    plan: TreatmentPlanEntity,
    order: OrderEntity,
    order_items: Vec<OrderItemEntity>,
}

/// Convert an accepted plan into an open POS order and mark it invoiced.
#[utoipa::path(
    post,
    path = "/{id}/checkout",
    tags = ["Treatment Plans"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Treatment plan ID to check out")
    ),
    responses(
        (status = 200, description = "Checked out plan successfully", body = StdResponse<CheckoutPlanRes, String>)
    )
)]
async fn checkout_plan(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("treatment_plans", "checkout")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let result = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let plan: TreatmentPlanEntity = treatment_plans::table
                    .find(id)
                    .filter(treatment_plans::tenant_id.eq(staff.tenant_id))
                    .get_result(conn)
                    .await
                    .map_err(|_| AppError::NotFound)?;

                if plan.status != ACCEPTED {
                    return Err(AppError::BadRequest(
                        "Only accepted plans can be checked out".into(),
                    ));
                }

                let items: Vec<TreatmentPlanItemEntity> = treatment_plan_items::table
                    .filter(treatment_plan_items::plan_id.eq(plan.id))
                    .get_results(conn)
                    .await
                    .context("Failed to get plan items")?;

                if items.is_empty() {
                    return Err(AppError::BadRequest("Plan has no items".into()));
                }

                let customer_id: i32 = pets::table
                    .find(plan.pet_id)
                    .select(pets::customer_id)
                    .get_result(conn)
                    .await
                    .context("Failed to get pet owner")?;

                let procedure_ids: Vec<i32> =
                    items.iter().map(|item| item.procedure_id).collect();
                let names: Vec<(i32, String)> = procedures::table
                    .filter(procedures::id.eq_any(&procedure_ids))
                    .select((procedures::id, procedures::name))
                    .get_results(conn)
                    .await
                    .context("Failed to get procedure names")?;
                let names: HashMap<i32, String> = names.into_iter().collect();

                let total = plan_total(&items);

                let order: OrderEntity = diesel::insert_into(orders::table)
                    .values(CreateOrderEntity {
                        tenant_id: staff.tenant_id,
                        customer_id: Some(customer_id),
                        staff_id: staff.staff_id,
                        status: super::orders::OPEN.to_string(),
                        total,
                        paid_amount: Decimal::ZERO,
                        notes: Some(format!("Treatment plan: {}", plan.title)),
                    })
                    .returning(OrderEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create order")?;

                let rows: Vec<CreateOrderItemEntity> = items
                    .iter()
                    .map(|item| CreateOrderItemEntity {
                        order_id: order.id,
                        product_id: None,
                        procedure_id: Some(item.procedure_id),
                        description: names
                            .get(&item.procedure_id)
                            .cloned()
                            .unwrap_or_else(|| format!("Procedure #{}", item.procedure_id)),
                        quantity: item.quantity,
                        unit_price: item.unit_price,
                        line_total: round_money(
                            item.unit_price * Decimal::from(item.quantity),
                        ),
                    })
                    .collect();

                let order_items: Vec<OrderItemEntity> =
                    diesel::insert_into(order_items::table)
                        .values(rows)
                        .returning(OrderItemEntity::as_returning())
                        .get_results(conn)
                        .await
                        .context("Failed to create order items")?;

                let plan: TreatmentPlanEntity = diesel::update(
                    treatment_plans::table
                        .find(plan.id)
                        .filter(treatment_plans::status.eq(ACCEPTED)),
                )
                .set((
                    treatment_plans::status.eq(INVOICED),
                    treatment_plans::updated_at.eq(diesel::dsl::now),
                ))
                .returning(TreatmentPlanEntity::as_returning())
                .get_result(conn)
                .await
                .context("Failed to invoice plan")?;

                Ok::<CheckoutPlanRes, AppError>(CheckoutPlanRes {
                    plan,
                    order,
                    order_items,
                })
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(result),
        message: Some("Checked out plan successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_flow_through_presentation() {
        assert!(can_transition(DRAFT, PRESENTED));
        assert!(can_transition(PRESENTED, ACCEPTED));
        assert!(can_transition(PRESENTED, DECLINED));
    }

    #[test]
    fn test_invoicing_is_not_reachable_via_transition() {
        assert!(!can_transition(ACCEPTED, INVOICED));
        assert!(!can_transition(DRAFT, INVOICED));
    }

    #[test]
    fn test_terminal_plans_stay_terminal() {
        for terminal in [DECLINED, INVOICED] {
            for to in [DRAFT, PRESENTED, ACCEPTED, DECLINED, INVOICED] {
                assert!(!can_transition(terminal, to), "{terminal} -> {to}");
            }
        }
    }

    #[test]
    fn test_no_skipping_presentation() {
        assert!(!can_transition(DRAFT, ACCEPTED));
        assert!(!can_transition(DRAFT, DECLINED));
    }
}
