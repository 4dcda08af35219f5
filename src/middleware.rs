use axum::{
    extract::Request, http::header::AUTHORIZATION, middleware::Next, response::Response,
};

use crate::{app_error::AppError, config, jwt, rbac::Role};

/// Authenticated staff context injected by [`staff_authorization`].
#[derive(Debug, Clone, Copy)]
pub struct AuthStaff {
    pub staff_id: i32,
    pub tenant_id: i32,
    pub role: Role,
}

impl AuthStaff {
    /// Rejects with 403 unless the staff role holds `resource:action`.
    pub fn require(&self, resource: &str, action: &str) -> Result<(), AppError> {
        if self.role.allows(resource, action) {
            Ok(())
        } else {
            Err(AppError::ForbiddenResource(format!(
                "Role {} is missing permission {resource}:{action}",
                self.role.as_str()
            )))
        }
    }
}

/// Verifies the Bearer token and injects [`AuthStaff`] for downstream handlers.
pub async fn staff_authorization(mut req: Request, next: Next) -> Result<Response, AppError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

    let token = jwt::extract_from_header(header)
        .ok_or_else(|| AppError::Unauthorized("Expected a Bearer token".into()))?;

    let config = config::load()?;
    let claims = jwt::verify(token, &config.auth.jwt_secret)
        .map_err(|err| AppError::Unauthorized(err.to_string()))?;

    let role = Role::parse(&claims.role)
        .ok_or_else(|| AppError::Unauthorized(format!("Unknown role {}", claims.role)))?;

    req.extensions_mut().insert(AuthStaff {
        staff_id: claims.sub,
        tenant_id: claims.tenant_id,
        role,
    });

    Ok(next.run(req).await)
}
