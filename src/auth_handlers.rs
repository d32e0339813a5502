// src/auth_handlers.rs - Session and profile handlers

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use std::sync::Arc;
use strum::IntoEnumIterator;
use validator::Validate;

use crate::audit::{client_ip, AuditQuery};
use crate::auth::{
    get_current_user, require_permission, AuthContext, AuthService, Permission, Role, SessionRequest,
    SessionResponse, User,
};
use crate::error::ApiResult;
use crate::handlers::{ApiResponse, PaginatedResponse, PaginationQuery};
use crate::AppState;

/// Opens a session for a demo user. There are no passwords; the username picks the role.
pub async fn open_session(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<SessionRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;

    let user = app_state.users.find_by_username(&request.username)?.clone();
    let token = auth_service.generate_token(&user)?;

    let ctx = AuthContext {
        user_id: user.id.clone(),
        username: user.username.clone(),
        role: user.role,
    };
    app_state
        .audit
        .record(
            Some(&ctx),
            "login",
            "session",
            None,
            Some(format!("Session opened as {}", user.role)),
            None,
            client_ip(&http_request),
        )
        .await;
    log::info!("Session opened for {} ({})", user.username, user.role);

    let response = SessionResponse {
        token,
        expires_in: auth_service.token_ttl_seconds(),
        permissions: user.role.permissions(),
        user,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        response,
        "Session opened".to_string(),
    )))
}

/// Demo accounts available for the role switcher.
pub async fn list_demo_users(app_state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    let users: Vec<User> = app_state.users.all().into_iter().cloned().collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(users)))
}

pub async fn get_profile(http_request: HttpRequest) -> ApiResult<HttpResponse> {
    let ctx = get_current_user(&http_request)?;

    #[derive(Serialize)]
    struct ProfileResponse {
        #[serde(flatten)]
        user: AuthContext,
        role_name: &'static str,
        permissions: Vec<Permission>,
    }

    let response = ProfileResponse {
        role_name: ctx.role.display_name(),
        permissions: ctx.role.permissions(),
        user: ctx,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

pub async fn get_roles(http_request: HttpRequest) -> ApiResult<HttpResponse> {
    get_current_user(&http_request)?;

    #[derive(Serialize)]
    struct RoleInfo {
        id: Role,
        name: &'static str,
        description: &'static str,
        permissions: Vec<Permission>,
    }

    let roles: Vec<RoleInfo> = Role::iter()
        .map(|role| RoleInfo {
            id: role,
            name: role.display_name(),
            description: role.description(),
            permissions: role.permissions(),
        })
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(roles)))
}

// ======== AUDIT LOG ========

#[derive(Debug, serde::Deserialize)]
pub struct AuditLogQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub action: Option<String>,
    pub username: Option<String>,
}

pub async fn get_audit_log(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<AuditLogQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Permission::ViewAuditLog)?;

    let (page, per_page, _offset) = PaginationQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .normalize();

    let query = query.into_inner();
    let filter = AuditQuery {
        entity_type: query.entity_type,
        entity_id: query.entity_id,
        action: query.action,
        username: query.username,
    };
    let entries = app_state.audit.list(&filter).await;
    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse::from_items(
        entries, page, per_page,
    ))))
}
