//! Requester identity
//!
//! Authentication happens at the edge; by the time a request reaches a Nova
//! service the gateway has replaced any client-supplied identity headers with
//! verified ones. This middleware lifts them into request extensions so
//! handlers can take [`UserId`] and [`RequesterRoles`] as extractors.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use error_types::ProblemDetails;
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use uuid::Uuid;

use crate::problem::ProblemResponse;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLES_HEADER: &str = "x-user-roles";

const CURATOR_ROLE: &str = "curator";

/// Verified requester id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

/// Roles granted to the requester by the edge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequesterRoles(Vec<String>);

impl RequesterRoles {
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(|r| r.trim().to_ascii_lowercase())
                .filter(|r| !r.is_empty())
                .collect(),
        )
    }

    pub fn has(&self, role: &str) -> bool {
        self.0.iter().any(|r| r == role)
    }

    pub fn is_curator(&self) -> bool {
        self.has(CURATOR_ROLE)
    }
}

/// Identity middleware.
///
/// `required()` rejects requests without a valid `X-User-Id` with 401;
/// `optional()` lets anonymous requests through without a [`UserId`].
#[derive(Clone, Copy)]
pub struct RequesterIdentity {
    required: bool,
}

impl RequesterIdentity {
    pub fn required() -> Self {
        Self { required: true }
    }

    pub fn optional() -> Self {
        Self { required: false }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequesterIdentity
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RequesterIdentityService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequesterIdentityService {
            service: Rc::new(service),
            required: self.required,
        }))
    }
}

pub struct RequesterIdentityService<S> {
    service: Rc<S>,
    required: bool,
}

impl<S, B> Service<ServiceRequest> for RequesterIdentityService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let required = self.required;

        Box::pin(async move {
            let user_id = match parse_user_id(&req) {
                Ok(user_id) => user_id,
                Err(detail) => {
                    tracing::debug!(path = %req.path(), "Rejected request: {}", detail);
                    if required {
                        let problem = ProblemDetails::unauthorized(detail).with_instance(req.path());
                        let response = req.error_response(ProblemResponse::new(problem));
                        return Ok(response.map_into_right_body());
                    }
                    None
                }
            };

            if let Some(user_id) = user_id {
                let roles = req
                    .headers()
                    .get(USER_ROLES_HEADER)
                    .and_then(|h| h.to_str().ok())
                    .map(RequesterRoles::parse)
                    .unwrap_or_default();
                req.extensions_mut().insert(UserId(user_id));
                req.extensions_mut().insert(roles);
            }

            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

/// Whether the request carries a well-formed `X-User-Id`.
pub(crate) fn has_valid_identity(req: &ServiceRequest) -> bool {
    matches!(parse_user_id(req), Ok(Some(_)))
}

/// `Ok(None)` when the header is absent, `Err` when present but malformed.
fn parse_user_id(req: &ServiceRequest) -> Result<Option<Uuid>, &'static str> {
    let Some(value) = req.headers().get(USER_ID_HEADER) else {
        return Err("Missing requester identity");
    };
    let raw = value
        .to_str()
        .map_err(|_| "Requester identity is not valid ASCII")?;
    Uuid::parse_str(raw.trim())
        .map(Some)
        .map_err(|_| "Requester identity is not a UUID")
}

impl actix_web::FromRequest for UserId {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<UserId>() {
            Some(user_id) => ready(Ok(*user_id)),
            None => ready(Err(ProblemResponse::new(ProblemDetails::unauthorized(
                "User not authenticated",
            ))
            .into())),
        }
    }
}

impl actix_web::FromRequest for RequesterRoles {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        ready(Ok(req
            .extensions()
            .get::<RequesterRoles>()
            .cloned()
            .unwrap_or_default()))
    }
}
