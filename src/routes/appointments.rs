use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{self, AuthStaff},
    models::{AppointmentEntity, CreateAppointmentEntity, UpdateAppointmentEntity},
    schema::{appointments, pets},
};

pub const SCHEDULED: &str = "SCHEDULED";
pub const CONFIRMED: &str = "CONFIRMED";
pub const IN_PROGRESS: &str = "IN_PROGRESS";
pub const COMPLETED: &str = "COMPLETED";
pub const CANCELLED: &str = "CANCELLED";
pub const NO_SHOW: &str = "NO_SHOW";

/// Statuses that do not block a staff member's calendar slot.
const NON_BLOCKING: [&str; 2] = [CANCELLED, NO_SHOW];

/// The appointment lifecycle. Terminal states reject every move.
pub fn can_transition(from: &str, to: &str) -> bool {
    matches!(
        (from, to),
        (SCHEDULED, CONFIRMED)
            | (SCHEDULED, CANCELLED)
            | (CONFIRMED, IN_PROGRESS)
            | (CONFIRMED, CANCELLED)
            | (CONFIRMED, NO_SHOW)
            | (IN_PROGRESS, COMPLETED)
    )
}

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/appointments",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_appointments))
            .routes(utoipa_axum::routes!(get_appointment))
            .routes(utoipa_axum::routes!(create_appointment))
            .routes(utoipa_axum::routes!(update_appointment))
            .routes(utoipa_axum::routes!(transition_appointment))
            .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
    )
}

#[derive(Deserialize, IntoParams)]
struct AppointmentListQuery {
    /// Only appointments starting at or after this instant.
    from: Option<DateTime<Utc>>,
    /// Only appointments starting before this instant.
    to: Option<DateTime<Utc>>,
    staff_id: Option<i32>,
}

/// Fetch appointments in a date window, optionally for one staff member.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Appointments"],
    security(("bearerAuth" = [])),
    params(AppointmentListQuery),
    responses(
        (status = 200, description = "List appointments", body = StdResponse<Vec<AppointmentEntity>, String>)
    )
)]
async fn get_appointments(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("appointments", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mut statement = appointments::table
        .filter(appointments::tenant_id.eq(staff.tenant_id))
        .order_by(appointments::starts_at.asc())
        .into_boxed();

    if let Some(from) = query.from {
        statement = statement.filter(appointments::starts_at.ge(from));
    }
    if let Some(to) = query.to {
        statement = statement.filter(appointments::starts_at.lt(to));
    }
    if let Some(staff_id) = query.staff_id {
        statement = statement.filter(appointments::staff_id.eq(staff_id));
    }

    let appointments: Vec<AppointmentEntity> = statement
        .get_results(conn)
        .await
        .context("Failed to get appointments")?;

    Ok(StdResponse {
        data: Some(appointments),
        message: Some("Get appointments successfully"),
    })
}

/// Fetch a single appointment.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Appointments"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Appointment ID to fetch")
    ),
    responses(
        (status = 200, description = "Get appointment successfully", body = StdResponse<AppointmentEntity, String>)
    )
)]
async fn get_appointment(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("appointments", "read")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let appointment: QueryResult<AppointmentEntity> = appointments::table
        .find(id)
        .filter(appointments::tenant_id.eq(staff.tenant_id))
        .get_result(conn)
        .await;

    match appointment {
        Ok(appointment) => Ok(StdResponse {
            data: Some(appointment),
            message: Some("Get appointment successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

async fn assert_slot_is_free(
    conn: &mut crate::db::DbConnection<'_>,
    tenant_id: i32,
    staff_id: i32,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    exclude_id: Option<i32>,
) -> Result<(), AppError> {
    let mut statement = appointments::table
        .filter(appointments::tenant_id.eq(tenant_id))
        .filter(appointments::staff_id.eq(staff_id))
        .filter(appointments::status.ne_all(NON_BLOCKING))
        .filter(appointments::starts_at.lt(ends_at))
        .filter(appointments::ends_at.gt(starts_at))
        .into_boxed();

    if let Some(exclude_id) = exclude_id {
        statement = statement.filter(appointments::id.ne(exclude_id));
    }

    let overlapping: i64 = statement
        .count()
        .get_result(conn)
        .await
        .context("Failed to check for overlapping appointments")?;

    if overlapping > 0 {
        return Err(AppError::BadRequest(
            "Staff member already has an appointment in this slot".into(),
        ));
    }

    Ok(())
}

#[derive(Deserialize, ToSchema)]
struct CreateAppointmentReq {
    pet_id: i32,
    staff_id: i32,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    reason: String,
    notes: Option<String>,
}

/// Book an appointment. Rejects empty slots and double-booked staff.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Appointments"],
    security(("bearerAuth" = [])),
    request_body = CreateAppointmentReq,
    responses(
        (status = 200, description = "Created appointment successfully", body = StdResponse<AppointmentEntity, String>)
    )
)]
async fn create_appointment(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<CreateAppointmentReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("appointments", "create")?;

    if body.ends_at <= body.starts_at {
        return Err(AppError::BadRequest(
            "Appointment must end after it starts".into(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    // The pet also pins down the customer the slot is billed to.
    let customer_id: i32 = pets::table
        .find(body.pet_id)
        .filter(pets::tenant_id.eq(staff.tenant_id))
        .select(pets::customer_id)
        .get_result(conn)
        .await
        .map_err(|_| AppError::BadRequest("Pet does not exist".into()))?;

    assert_slot_is_free(
        conn,
        staff.tenant_id,
        body.staff_id,
        body.starts_at,
        body.ends_at,
        None,
    )
    .await?;

    let appointment: AppointmentEntity = diesel::insert_into(appointments::table)
        .values(CreateAppointmentEntity {
            tenant_id: staff.tenant_id,
            pet_id: body.pet_id,
            customer_id,
            staff_id: body.staff_id,
            starts_at: body.starts_at,
            ends_at: body.ends_at,
            reason: body.reason,
            status: SCHEDULED.to_string(),
            notes: body.notes,
        })
        .returning(AppointmentEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create appointment")?;

    Ok(StdResponse {
        data: Some(appointment),
        message: Some("Created appointment successfully"),
    })
}

/// Reschedule or edit an appointment. Re-runs the double-booking check when
/// the slot or the assignee changes.
#[utoipa::path(
    patch,
    path = "/{id}",
    tags = ["Appointments"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Appointment ID to update")
    ),
    request_body = UpdateAppointmentEntity,
    responses(
        (status = 200, description = "Updated appointment successfully", body = StdResponse<AppointmentEntity, String>)
    )
)]
async fn update_appointment(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<UpdateAppointmentEntity>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("appointments", "update")?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let current: AppointmentEntity = appointments::table
        .find(id)
        .filter(appointments::tenant_id.eq(staff.tenant_id))
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    let starts_at = body.starts_at.unwrap_or(current.starts_at);
    let ends_at = body.ends_at.unwrap_or(current.ends_at);
    let staff_id = body.staff_id.unwrap_or(current.staff_id);

    if ends_at <= starts_at {
        return Err(AppError::BadRequest(
            "Appointment must end after it starts".into(),
        ));
    }

    if starts_at != current.starts_at || ends_at != current.ends_at || staff_id != current.staff_id
    {
        assert_slot_is_free(conn, staff.tenant_id, staff_id, starts_at, ends_at, Some(id)).await?;
    }

    let appointment: AppointmentEntity = diesel::update(
        appointments::table
            .find(id)
            .filter(appointments::tenant_id.eq(staff.tenant_id)),
    )
    .set((body, appointments::updated_at.eq(diesel::dsl::now)))
    .returning(AppointmentEntity::as_returning())
    .get_result(conn)
    .await
    .context("Failed to update appointment")?;

    Ok(StdResponse {
        data: Some(appointment),
        message: Some("Updated appointment successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct TransitionAppointmentReq {
    status: String,
}

/// Move an appointment through its lifecycle.
#[utoipa::path(
    post,
    path = "/{id}/transition",
    tags = ["Appointments"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Appointment ID to transition")
    ),
    request_body = TransitionAppointmentReq,
    responses(
        (status = 200, description = "Transitioned appointment successfully", body = StdResponse<AppointmentEntity, String>)
    )
)]
async fn transition_appointment(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(staff): Extension<AuthStaff>,
    Json(body): Json<TransitionAppointmentReq>,
) -> Result<impl IntoResponse, AppError> {
    staff.require("appointments", "transition")?;

    let to = body.status.to_ascii_uppercase();

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let current: AppointmentEntity = appointments::table
        .find(id)
        .filter(appointments::tenant_id.eq(staff.tenant_id))
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    if !can_transition(&current.status, &to) {
        return Err(AppError::BadRequest(format!(
            "Cannot transition appointment from {} to {}",
            current.status, to
        )));
    }

    let appointment: AppointmentEntity = diesel::update(
        appointments::table
            .find(id)
            .filter(appointments::status.eq(&current.status)),
    )
    .set((
        appointments::status.eq(&to),
        appointments::updated_at.eq(diesel::dsl::now),
    ))
    .returning(AppointmentEntity::as_returning())
    .get_result(conn)
    .await
    .map_err(|_| AppError::BadRequest("Appointment changed concurrently".into()))?;

    Ok(StdResponse {
        data: Some(appointment),
        message: Some("Transitioned appointment successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduled_can_confirm_or_cancel() {
        assert!(can_transition(SCHEDULED, CONFIRMED));
        assert!(can_transition(SCHEDULED, CANCELLED));
        assert!(!can_transition(SCHEDULED, IN_PROGRESS));
        assert!(!can_transition(SCHEDULED, COMPLETED));
    }

    #[test]
    fn test_confirmed_branches() {
        assert!(can_transition(CONFIRMED, IN_PROGRESS));
        assert!(can_transition(CONFIRMED, CANCELLED));
        assert!(can_transition(CONFIRMED, NO_SHOW));
        assert!(!can_transition(CONFIRMED, COMPLETED));
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for terminal in [COMPLETED, CANCELLED, NO_SHOW] {
            for to in [SCHEDULED, CONFIRMED, IN_PROGRESS, COMPLETED, CANCELLED] {
                assert!(!can_transition(terminal, to), "{terminal} -> {to}");
            }
        }
    }

    #[test]
    fn test_no_self_transitions() {
        for status in [SCHEDULED, CONFIRMED, IN_PROGRESS] {
            assert!(!can_transition(status, status));
        }
    }
}
