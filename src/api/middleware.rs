use axum::{
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Claims issued by the managed backend (HS256, shared secret).
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AuthenticatedCaller {
    pub user_id: Uuid,
}

/// Attach the diagnostic headers every response carries.
pub async fn diagnostics_middleware(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let started = Instant::now();

    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        headers.insert("x-quelle-request-id", value);
    }
    if let Ok(value) = HeaderValue::from_str(&started.elapsed().as_millis().to_string()) {
        headers.insert("x-quelle-processing-ms", value);
    }

    response
}

/// Verify a bearer token when the shared secret is configured and the
/// caller sent one. Valid tokens attach an [`AuthenticatedCaller`]
/// extension; invalid tokens are rejected; anonymous requests pass
/// through, since capability routes do not require an identity.
pub async fn bearer_identity_middleware(
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(secret) = crate::config::JWT_SECRET.clone() else {
        return Ok(next.run(req).await);
    };

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let Some(token) = token else {
        return Ok(next.run(req).await);
    };

    let key = DecodingKey::from_secret(secret.as_ref());
    let validation = Validation::new(Algorithm::HS256);

    match decode::<Claims>(token, &key, &validation) {
        Ok(token_data) => {
            if let Ok(user_id) = Uuid::parse_str(&token_data.claims.sub) {
                req.extensions_mut().insert(AuthenticatedCaller { user_id });
            }
            Ok(next.run(req).await)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}
