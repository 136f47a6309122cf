use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::order::LineItem;

/// Actor roles carried in the token. `supper-customer` is the wholesale
/// buyer tier, kept under its historical wire name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Role {
    Customer,
    #[serde(rename = "supper-customer")]
    #[strum(serialize = "supper-customer")]
    SuperCustomer,
    ShopUser,
    Admin,
}

impl Role {
    pub fn is_buyer(&self) -> bool {
        matches!(self, Role::Customer | Role::SuperCustomer)
    }
}

/// JWT claims
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: Uuid,
    pub name: String,
    pub role: Role,
    /// Present only for shop users.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop_id: Option<Uuid>,
    /// Expiration (unix timestamp)
    pub exp: i64,
    /// Issued at (unix timestamp)
    pub iat: i64,
}

/// Authenticated actor, inserted as a request extension by the auth
/// middleware and read back by the `AuthUser` extractor.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub shop_id: Option<Uuid>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether this actor may decide or fulfill the given line item. Admins
    /// act on anything; shop users only on items their shop owns.
    pub fn can_act_on_line_item(&self, item: &LineItem) -> bool {
        match self.role {
            Role::Admin => true,
            Role::ShopUser => self.shop_id == Some(item.shop.id),
            _ => false,
        }
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            name: claims.name,
            role: claims.role,
            shop_id: claims.shop_id,
        }
    }
}

/// Issues and verifies the HS256 tokens the API accepts.
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: Duration,
}

impl AuthService {
    pub fn new(secret: &str, expiry_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry: Duration::seconds(expiry_secs),
        }
    }

    pub fn issue(
        &self,
        user_id: Uuid,
        name: &str,
        role: Role,
        shop_id: Option<Uuid>,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            name: name.to_string(),
            role,
            shop_id,
            exp: (now + self.expiry).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::InternalError(format!("Failed to sign token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| ServiceError::Unauthorized(format!("Invalid token: {e}")))
    }
}

/// Middleware requiring a valid bearer token; on success the decoded
/// `AuthUser` is attached to the request.
pub async fn require_auth(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ServiceError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = auth.verify(token)?;
    request.extensions_mut().insert(AuthUser::from(claims));
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ServiceError::Unauthorized("Not authenticated".to_string()))
    }
}
