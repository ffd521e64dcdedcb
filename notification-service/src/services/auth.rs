/// Bearer-token authentication for the HTTP surface (A1). Validates against
/// whichever of the configured signing keys (primary, then previous) matches,
/// supporting key rotation without forcing every outstanding token to be
/// rejected the moment a new key is cut. A separate internal-service token
/// covers service-to-service calls that don't carry a user JWT at all.
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use nova_cache::{CacheOperations, NovaCache};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct UserId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
    jti: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JwtKeys {
    pub primary: String,
    pub previous: Option<String>,
}

fn decode_with_key(token: &str, key: &str) -> Option<Claims> {
    let decoding_key = DecodingKey::from_secret(key.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(token, &decoding_key, &validation)
        .ok()
        .map(|data| data.claims)
}

fn decode_any(token: &str, keys: &JwtKeys) -> Option<Claims> {
    decode_with_key(token, &keys.primary).or_else(|| {
        keys.previous
            .as_deref()
            .and_then(|prev| decode_with_key(token, prev))
    })
}

fn revocation_key(jti: &str) -> String {
    format!("v1:jwt:revoked:{jti}")
}

#[derive(Clone)]
pub struct JwtAuthMiddleware {
    keys: Arc<JwtKeys>,
    cache: Option<Arc<NovaCache>>,
}

impl JwtAuthMiddleware {
    pub fn new(keys: JwtKeys) -> Self {
        Self {
            keys: Arc::new(keys),
            cache: None,
        }
    }

    pub fn with_cache(keys: JwtKeys, cache: Arc<NovaCache>) -> Self {
        Self {
            keys: Arc::new(keys),
            cache: Some(cache),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
            keys: self.keys.clone(),
            cache: self.cache.clone(),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
    keys: Arc<JwtKeys>,
    cache: Option<Arc<NovaCache>>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let keys = self.keys.clone();
        let cache = self.cache.clone();

        Box::pin(async move {
            let auth_header = req
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .ok_or_else(|| actix_web::error::ErrorUnauthorized("missing Authorization header"))?;

            let token = auth_header
                .strip_prefix("Bearer ")
                .ok_or_else(|| actix_web::error::ErrorUnauthorized("expected a Bearer token"))?;

            let claims = decode_any(token, &keys)
                .ok_or_else(|| actix_web::error::ErrorUnauthorized("invalid or expired token"))?;

            if let (Some(jti), Some(cache)) = (&claims.jti, &cache) {
                if cache.exists(&revocation_key(jti)).await.unwrap_or(false) {
                    return Err(actix_web::error::ErrorUnauthorized("token has been revoked"));
                }
            }

            let user_id = Uuid::parse_str(&claims.sub)
                .map_err(|_| actix_web::error::ErrorUnauthorized("malformed subject claim"))?;

            req.extensions_mut().insert(UserId(user_id));
            service.call(req).await
        })
    }
}

impl actix_web::FromRequest for UserId {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &actix_web::HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        match req.extensions().get::<UserId>() {
            Some(user_id) => ready(Ok(*user_id)),
            None => ready(Err(actix_web::error::ErrorUnauthorized("request is not authenticated"))),
        }
    }
}

/// Checks the `Authorization: Bearer <token>` header against the
/// internal-service token, for machine-to-machine calls that carry no user
/// JWT (used by the `/internal/*` surface, if any is exposed).
pub fn is_internal_service_request(req: &actix_web::HttpRequest, internal_token: &str) -> bool {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|token| token == internal_token)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(key: &str, sub: &str, exp_secs_from_now: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + exp_secs_from_now) as usize,
            jti: Some("test-jti".to_string()),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(key.as_bytes())).unwrap()
    }

    #[test]
    fn decodes_with_primary_key() {
        let keys = JwtKeys {
            primary: "primary-secret".to_string(),
            previous: None,
        };
        let token = make_token("primary-secret", "00000000-0000-0000-0000-000000000001", 3600);
        let claims = decode_any(&token, &keys).expect("should decode");
        assert_eq!(claims.sub, "00000000-0000-0000-0000-000000000001");
    }

    #[test]
    fn falls_back_to_previous_key() {
        let keys = JwtKeys {
            primary: "new-secret".to_string(),
            previous: Some("old-secret".to_string()),
        };
        let token = make_token("old-secret", "00000000-0000-0000-0000-000000000002", 3600);
        assert!(decode_any(&token, &keys).is_some());
    }

    #[test]
    fn rejects_unknown_key() {
        let keys = JwtKeys {
            primary: "new-secret".to_string(),
            previous: None,
        };
        let token = make_token("attacker-secret", "00000000-0000-0000-0000-000000000003", 3600);
        assert!(decode_any(&token, &keys).is_none());
    }

    #[test]
    fn rejects_expired_token() {
        let keys = JwtKeys {
            primary: "primary-secret".to_string(),
            previous: None,
        };
        let token = make_token("primary-secret", "00000000-0000-0000-0000-000000000004", -3600);
        assert!(decode_any(&token, &keys).is_none());
    }
}
