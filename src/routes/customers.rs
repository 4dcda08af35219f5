use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, PgTextExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use validator::Validate;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{self, AuthStaff},
    models::{CreateCustomerEntity, CustomerEntity, PetEntity, UpdateCustomerEntity},
    schema::{customers, orders, pets},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/customers",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_customers))
            .routes(utoipa_axum::routes!(get_customer))
            .routes(utoipa_axum::routes!(create_customer))
            .routes(utoipa_axum::routes!(update_customer))
            .routes(utoipa_axum::routes!(delete_customer))
            .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
    )
}

#[derive(Deserialize, IntoParams)]
struct CustomerListQuery {
    /// Case-insensitive substring match on the customer name.
    q: Option<String>,
}

/// Fetch all active customers of the tenant.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Customers"],
    security(("bearerAuth" = [])),
    params(CustomerListQuery),
    responses(
        (status = 200, description = "List customers", body = StdResponse<Vec<CustomerEntity>, String>)
    )
)]
async fn get_customers(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Query(query): Query<CustomerListQuery>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("customers", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mut statement = customers::table
        .filter(customers::tenant_id.eq(staff.tenant_id))
        .filter(customers::deleted_at.is_null())
        .order_by(customers::full_name.asc())
        .into_boxed();

    if let Some(q) = query.q.filter(|q| !q.trim().is_empty()) {
        statement = statement.filter(customers::full_name.ilike(format!("%{}%", q.trim())));
    }

    let customers: Vec<CustomerEntity> = statement
        .get_results(conn)
        .await
        .context("Failed to get customers")?;

    Ok(StdResponse {
        data: Some(customers),
        message: Some("Get customers successfully"),
    })
}

#[derive(Serialize, ToSchema)]
struct GetCustomerRes {
    customer: CustomerEntity,
    pets: Vec<PetEntity>,
}

/// Fetch a customer with their pets.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Customers"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Customer ID to fetch")
    ),
    responses(
        (status = 200, description = "Get customer successfully", body = StdResponse<GetCustomerRes, String>)
    )
)]
async fn get_customer(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("customers", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let customer: QueryResult<CustomerEntity> = customers::table
        .find(id)
        .filter(customers::tenant_id.eq(staff.tenant_id))
        .filter(customers::deleted_at.is_null())
        .get_result(conn)
        .await;

    let customer = match customer {
        Ok(customer) => customer,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    let pets: Vec<PetEntity> = pets::table
        .filter(pets::customer_id.eq(customer.id))
        .order_by(pets::name.asc())
        .get_results(conn)
        .await
        .context("Failed to get pets")?;

    Ok(StdResponse {
        data: Some(GetCustomerRes { customer, pets }),
        message: Some("Get customer successfully"),
    })
}

#[derive(Deserialize, Validate, ToSchema)]
struct CreateCustomerReq {
    #[validate(length(min = 1, message = "full_name is required"))]
    full_name: String,
    #[validate(email(message = "email is not valid"))]
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    notes: Option<String>,
}

/// Create a customer for the tenant.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Customers"],
    security(("bearerAuth" = [])),
    request_body = CreateCustomerReq,
    responses(
        (status = 200, description = "Created customer successfully", body = StdResponse<CustomerEntity, String>)
    )
)]
async fn create_customer(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<CreateCustomerReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("customers", "create")?;
    body.validate()
        .map_err(|err| AppError::BadRequest(err.to_string()))?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let customer: CustomerEntity = diesel::insert_into(customers::table)
        .values(CreateCustomerEntity {
            tenant_id: staff.tenant_id,
            full_name: body.full_name,
            email: body.email,
            phone: body.phone,
            address: body.address,
            notes: body.notes,
        })
        .returning(CustomerEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create customer")?;

    Ok(StdResponse {
        data: Some(customer),
        message: Some("Created customer successfully"),
    })
}

/// Update a customer.
#[utoipa::path(
    patch,
    path = "/{id}",
    tags = ["Customers"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Customer ID to update")
    ),
    request_body = UpdateCustomerEntity,
    responses(
        (status = 200, description = "Updated customer successfully", body = StdResponse<CustomerEntity, String>)
    )
)]
async fn update_customer(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<UpdateCustomerEntity>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("customers", "update")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let customer: QueryResult<CustomerEntity> = diesel::update(
        customers::table
            .find(id)
            .filter(customers::tenant_id.eq(staff.tenant_id))
            .filter(customers::deleted_at.is_null()),
    )
    .set((body, customers::updated_at.eq(diesel::dsl::now)))
    .returning(CustomerEntity::as_returning())
    .get_result(conn)
    .await;

    match customer {
        Ok(customer) => Ok(StdResponse {
            data: Some(customer),
            message: Some("Updated customer successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// Soft-delete a customer. Rejected while the customer still has open orders.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Customers"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Customer ID to delete")
    ),
    responses(
        (status = 200, description = "Deleted customer successfully", body = StdResponse<CustomerEntity, String>)
    )
)]
async fn delete_customer(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("customers", "delete")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let open_orders: i64 = orders::table
        .filter(orders::tenant_id.eq(staff.tenant_id))
        .filter(orders::customer_id.eq(id))
        .filter(orders::deleted_at.is_null())
        .filter(orders::status.eq_any(["OPEN", "PARTIALLY_PAID"]))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count open orders")?;

    if open_orders > 0 {
        return Err(AppError::BadRequest(
            "Customer still has open orders".into(),
        ));
    }

    let customer: QueryResult<CustomerEntity> = diesel::update(
        customers::table
            .find(id)
            .filter(customers::tenant_id.eq(staff.tenant_id))
            .filter(customers::deleted_at.is_null()),
    )
    .set(customers::deleted_at.eq(diesel::dsl::now))
    .returning(CustomerEntity::as_returning())
    .get_result(conn)
    .await;

    match customer {
        Ok(customer) => Ok(StdResponse {
            data: Some(customer),
            message: Some("Deleted customer successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}
