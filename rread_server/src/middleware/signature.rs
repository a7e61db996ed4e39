//! Webhook signature middleware for Actix Web.
//!
//! The payment gateway signs every notification with the shared webhook secret (`RR_WEBHOOK_SECRET`). The signature
//! arrives in the `x-signature` header (`ts=<unix>,v1=<hex>`) and covers the `data.id` query parameter, the
//! `x-request-id` header and the timestamp. See [`crate::helpers::verify_webhook_signature`].
//!
//! Requests that fail verification are answered with `401 Unauthorized` and never reach the handler, so they are
//! never enqueued.
use std::{
    collections::HashMap,
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use rread_common::Secret;

use crate::{errors::ServerError, helpers::verify_webhook_signature};

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const DATA_ID_PARAM: &str = "data.id";

pub struct SignatureMiddlewareFactory {
    secret: Secret<String>,
    // If false, then the middleware will not check the signature and always allow the call
    enabled: bool,
}

impl SignatureMiddlewareFactory {
    pub fn new(secret: Secret<String>, enabled: bool) -> Self {
        SignatureMiddlewareFactory { secret, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SignatureMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<EitherBody<B>>;
    type Transform = SignatureMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SignatureMiddlewareService {
            secret: self.secret.clone(),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct SignatureMiddlewareService<S> {
    secret: Secret<String>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for SignatureMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<EitherBody<B>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        trace!("🔐️ Checking webhook signature");
        if !self.enabled {
            trace!("🔐️ Signature checks are disabled. Allowing request.");
            return Box::pin(async move { service.call(req).await.map(ServiceResponse::map_into_left_body) });
        }
        let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok()).map(String::from);
        let x_signature = header(SIGNATURE_HEADER);
        let x_request_id = header(REQUEST_ID_HEADER);
        let data_id = web::Query::<HashMap<String, String>>::from_query(req.query_string())
            .ok()
            .and_then(|q| q.get(DATA_ID_PARAM).cloned());
        let valid = verify_webhook_signature(
            self.secret.reveal(),
            x_signature.as_deref(),
            x_request_id.as_deref(),
            data_id.as_deref(),
        );
        if valid {
            trace!("🔐️ Signature check for request ✅️");
            Box::pin(async move { service.call(req).await.map(ServiceResponse::map_into_left_body) })
        } else {
            warn!(
                "🔐️ Invalid webhook signature (request id {}). Denying access.",
                x_request_id.as_deref().unwrap_or("none")
            );
            let res = req.error_response(ServerError::InvalidSignature).map_into_right_body();
            Box::pin(async move { Ok(res) })
        }
    }
}
