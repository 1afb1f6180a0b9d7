//! Session resolution middleware
//!
//! Runs before handler dispatch: pulls the token off the request (bearer
//! header first, then the `token` query parameter), hands it to a
//! [`SessionResolver`] and stores the resolved session in the request
//! extensions. The middleware itself never rejects a request; deciding what a
//! guest or a rejected token may do is left to the handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    web, Error, HttpMessage,
};
use async_trait::async_trait;
use futures::future::{ready, Ready};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

/// Turns an optional raw token into the application's session value.
///
/// Resolution must not fail: every outcome, including backend errors, is
/// expressed in `Self::Session`.
#[async_trait(?Send)]
pub trait SessionResolver: 'static {
    type Session: Clone + 'static;

    async fn resolve(&self, token: Option<&str>) -> Self::Session;
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Extract the request token.
///
/// `Authorization: Bearer <token>` wins over `?token=<token>`. Blank values are
/// treated as absent.
pub fn extract_token(headers: &HeaderMap, query_string: &str) -> Option<String> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| {
            s.strip_prefix("Bearer ")
                .or_else(|| s.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    web::Query::<TokenQuery>::from_query(query_string)
        .ok()
        .and_then(|q| q.into_inner().token)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Session Middleware
pub struct SessionMiddleware<R> {
    resolver: Arc<R>,
}

impl<R> SessionMiddleware<R> {
    pub fn new(resolver: Arc<R>) -> Self {
        Self { resolver }
    }
}

impl<S, B, R> Transform<S, ServiceRequest> for SessionMiddleware<R>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    R: SessionResolver,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = SessionMiddlewareService<S, R>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SessionMiddlewareService {
            service: Rc::new(service),
            resolver: self.resolver.clone(),
        }))
    }
}

pub struct SessionMiddlewareService<S, R> {
    service: Rc<S>,
    resolver: Arc<R>,
}

impl<S, B, R> Service<ServiceRequest> for SessionMiddlewareService<S, R>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    R: SessionResolver,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let resolver = self.resolver.clone();

        Box::pin(async move {
            let token = extract_token(req.headers(), req.query_string());

            if let Some(token) = token.as_deref() {
                let fingerprint = crypto_core::hash::sha256_hex(token);
                tracing::debug!(
                    path = %req.path(),
                    token_fingerprint = %&fingerprint[..12],
                    "Resolving request session"
                );
            }

            let session = resolver.resolve(token.as_deref()).await;

            req.extensions_mut().insert(session);

            service.call(req).await
        })
    }
}
