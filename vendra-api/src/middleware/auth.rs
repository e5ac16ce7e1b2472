use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vendra_core::identity::{Actor, ActorRole};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: ActorRole,
    pub exp: usize,
}

/// Validate the bearer token and inject the verified actor into request
/// extensions. Role-based rules (who may ship, cancel, release) are
/// enforced by the orchestrator; this layer only establishes identity.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let actor_id = Uuid::parse_str(&token_data.claims.sub).map_err(|_| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut()
        .insert(Actor::new(actor_id, token_data.claims.role));

    Ok(next.run(req).await)
}

/// Mint a token for an actor. Used by the auth service in front of this
/// core and by integration tooling.
pub fn issue_token(
    secret: &str,
    actor_id: Uuid,
    role: ActorRole,
    expiration_seconds: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: actor_id.to_string(),
        role,
        exp: (chrono::Utc::now().timestamp() as usize) + expiration_seconds as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
