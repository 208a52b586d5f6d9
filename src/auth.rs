use std::future::Future;
use std::pin::Pin;

use actix_web::dev::Payload;
use actix_web::web;
use actix_web::FromRequest;
use actix_web::HttpRequest;

use crate::error::AuthError;
use crate::error::OutboxError;
use crate::repos::ApiKey;
use crate::repos::ApiKeyRepo;

const API_KEY_HEADER: &str = "X-API-Key";

/// Extractor that authenticates a request via the `X-API-Key` header (spec
/// §6.1). Any route taking `AuthenticatedKey` as an argument requires a valid,
/// enabled key; unauthenticated routes simply omit it.
///
/// Grounded on `original_source/src/outbox/blueprints/api.py::api_key_required`,
/// adapted to the teacher's `authentication/middleware.rs` extractor shape.
pub struct AuthenticatedKey(pub ApiKey);

impl FromRequest for AuthenticatedKey {
    type Error = OutboxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let repo = req.app_data::<web::Data<ApiKeyRepo>>().cloned();
        let raw_key =
            req.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok()).map(|s| s.to_string());

        Box::pin(async move {
            let repo = repo.expect("ApiKeyRepo must be registered as app_data");
            let raw_key = raw_key.ok_or(AuthError::MissingKey)?;
            let key = repo.verify(&raw_key).await?.ok_or(AuthError::InvalidKey)?;
            Ok(AuthenticatedKey(key))
        })
    }
}
