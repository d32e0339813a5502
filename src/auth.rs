use actix_web::web;
use actix_web::HttpMessage;
use actix_web::{dev::ServiceRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use validator::Validate;

use crate::error::{ApiError, ApiResult};

// ======== ROLES ========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Procurement,
    Warehouse,
    ProductionPlanning,
    Accounting,
    Sales,
    QualityControl,
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Admin => "Administrator",
            Role::Procurement => "Procurement",
            Role::Warehouse => "Warehouse",
            Role::ProductionPlanning => "Production planning",
            Role::Accounting => "Accounting",
            Role::Sales => "Sales",
            Role::QualityControl => "Quality control",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Role::Admin => "Full access to all modules including the audit log",
            Role::Procurement => "Purchase requests and approval checks",
            Role::Warehouse => "Goods receipt, batch maintenance and stock-out",
            Role::ProductionPlanning => "Allocation previews and production costing",
            Role::Accounting => "Costing, approval checks and transaction history",
            Role::Sales => "Stock visibility and allocation previews for orders",
            Role::QualityControl => "Batch status changes such as recalls",
        }
    }

    pub fn can(&self, permission: Permission) -> bool {
        permission.allowed_roles().contains(self)
    }

    pub fn permissions(&self) -> Vec<Permission> {
        Permission::iter().filter(|p| self.can(*p)).collect()
    }
}

// ======== PERMISSIONS ========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumIter, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewInventory,
    ManageBatches,
    DeleteBatches,
    ChangeBatchStatus,
    PreviewAllocation,
    CommitStockOut,
    ViewTransactions,
    CheckApproval,
    ViewCosting,
    ExportData,
    ViewAuditLog,
}

impl Permission {
    pub fn allowed_roles(&self) -> &'static [Role] {
        use Role::*;
        match self {
            Permission::ViewInventory => &[
                Admin,
                Procurement,
                Warehouse,
                ProductionPlanning,
                Accounting,
                Sales,
                QualityControl,
            ],
            Permission::ManageBatches => &[Admin, Warehouse],
            Permission::DeleteBatches => &[Admin],
            Permission::ChangeBatchStatus => &[Admin, QualityControl],
            Permission::PreviewAllocation => &[Admin, Warehouse, ProductionPlanning, Sales],
            Permission::CommitStockOut => &[Admin, Warehouse],
            Permission::ViewTransactions => &[Admin, Warehouse, Accounting, ProductionPlanning],
            Permission::CheckApproval => &[Admin, Procurement, Accounting],
            Permission::ViewCosting => &[Admin, Accounting, ProductionPlanning],
            Permission::ExportData => &[Admin, Warehouse, Accounting],
            Permission::ViewAuditLog => &[Admin],
        }
    }
}

// ======== USERS ========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub department: String,
    pub role: Role,
}

/// Demo user accounts, looked up by username when a session is opened.
pub struct UserDirectory {
    users: HashMap<String, User>,
}

impl UserDirectory {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.username.to_lowercase(), u)).collect(),
        }
    }

    pub fn find_by_username(&self, username: &str) -> ApiResult<&User> {
        self.users
            .get(&username.trim().to_lowercase())
            .ok_or_else(|| ApiError::user_not_found(username))
    }

    pub fn all(&self) -> Vec<&User> {
        let mut users: Vec<&User> = self.users.values().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }
}

// ======== REQUEST/RESPONSE STRUCTS ========

#[derive(Debug, Deserialize, Validate)]
pub struct SessionRequest {
    #[validate(length(min = 1, max = 50, message = "Username is required"))]
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: User,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub username: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

/// Who is acting. Built from verified claims and passed into service calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthContext {
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

impl AuthContext {
    pub fn require(&self, permission: Permission) -> ApiResult<()> {
        if self.role.can(permission) {
            Ok(())
        } else {
            log::warn!("{} ({}) denied {}", self.username, self.role, permission);
            Err(ApiError::permission_denied())
        }
    }
}

impl From<Claims> for AuthContext {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
            role: claims.role,
        }
    }
}

// ======== AUTH SERVICE ========

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl_hours: i64,
}

impl AuthService {
    pub fn new(jwt_secret: &str, token_ttl_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_ttl_hours,
        }
    }

    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_hours * 3600
    }

    pub fn generate_token(&self, user: &User) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.token_ttl_hours);

        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| ApiError::AuthError("Failed to generate token".to_string()))
    }

    pub fn verify_token(&self, token: &str) -> ApiResult<Claims> {
        let validation = Validation::default();
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::AuthError("Token expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    ApiError::AuthError("Invalid token".to_string())
                }
                _ => ApiError::AuthError("Token verification failed".to_string()),
            })
    }
}

// ======== HELPER FUNCTIONS ========

pub fn get_current_user(req: &HttpRequest) -> ApiResult<AuthContext> {
    req.extensions()
        .get::<Claims>()
        .cloned()
        .map(AuthContext::from)
        .ok_or_else(|| ApiError::Unauthorized("No user information found".to_string()))
}

/// Current user, provided their role grants `permission`.
pub fn require_permission(req: &HttpRequest, permission: Permission) -> ApiResult<AuthContext> {
    let ctx = get_current_user(req)?;
    ctx.require(permission)?;
    Ok(ctx)
}

// ======== JWT MIDDLEWARE ========

pub async fn jwt_middleware(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (actix_web::Error, ServiceRequest)> {
    let token = credentials.token();

    let auth_service = match req.app_data::<web::Data<Arc<AuthService>>>() {
        Some(svc) => svc,
        None => {
            log::error!("AuthService not found in app data");
            return Err((
                ApiError::InternalServerError("Auth service not available".to_string()).into(),
                req,
            ));
        }
    };

    match auth_service.verify_token(token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(req)
        }
        Err(err) => {
            log::warn!("JWT verification failed: {}", err);
            Err((err.into(), req))
        }
    }
}
