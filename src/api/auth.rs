// Static bearer-token guard in front of the sync admin scope

use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::sync::Arc;

use crate::api::models::ApiResponse;

/// Paths reachable without a token (liveness checks).
const OPEN_PATHS: [&str; 2] = ["/health", "/"];

fn is_open(path: &str) -> bool {
    OPEN_PATHS.contains(&path)
}

/// Token from an `Authorization: Bearer <token>` header. The scheme is
/// case-insensitive.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Rejects every non-open request whose bearer token differs from `API_SECRET`.
/// An empty secret rejects everything.
#[derive(Clone)]
pub struct BearerAuth {
    secret: Arc<str>,
}

impl BearerAuth {
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn accepts(&self, req: &ServiceRequest) -> bool {
        if self.secret.is_empty() {
            return false;
        }
        req.headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(bearer_token)
            .is_some_and(|token| token == &*self.secret)
    }
}

impl<S, B> Transform<S, ServiceRequest> for BearerAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type InitError = ();
    type Transform = BearerAuthService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(BearerAuthService {
            inner: service,
            guard: self.clone(),
        }))
    }
}

pub struct BearerAuthService<S> {
    inner: S,
    guard: BearerAuth,
}

impl<S, B> Service<ServiceRequest> for BearerAuthService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(inner);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if is_open(req.path()) || self.guard.accepts(&req) {
            let fut = self.inner.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
        }

        tracing::warn!(method = %req.method(), path = %req.path(), "admin request rejected");
        let body = ApiResponse::<()>::error("Invalid or missing authentication token");
        let response = HttpResponse::Unauthorized().json(body).map_into_right_body();
        Box::pin(ready(Ok(req.into_response(response))))
    }
}
