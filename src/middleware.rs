use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{self, Service, ServiceRequest, ServiceResponse, Transform},
    http::{Method, header},
};
use futures_util::future::LocalBoxFuture;
use std::future::{Ready, ready};
use std::rc::Rc;
use url::Url;

use crate::domain::HostPattern;

/// Rejects requests whose `Host` is not on the allow-list with `400 Bad Request`.
pub struct AllowedHosts {
    patterns: Rc<[HostPattern]>,
}

impl AllowedHosts {
    pub fn new(patterns: &[HostPattern]) -> Self {
        Self {
            patterns: patterns.into(),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AllowedHosts
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AllowedHostsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AllowedHostsMiddleware {
            service,
            patterns: Rc::clone(&self.patterns),
        }))
    }
}

pub struct AllowedHostsMiddleware<S> {
    service: S,
    patterns: Rc<[HostPattern]>,
}

/// Raw `Host` header, or the request authority when the header is missing.
fn request_host(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .or_else(|| req.uri().authority().map(|a| a.as_str().to_owned()))
}

impl<S> AllowedHostsMiddleware<S> {
    fn is_allowed(&self, req: &ServiceRequest) -> bool {
        match request_host(req) {
            Some(host) => self.patterns.iter().any(|pattern| pattern.matches(&host)),
            None => false,
        }
    }
}

impl<S, B> Service<ServiceRequest> for AllowedHostsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if !self.is_allowed(&req) {
            log::warn!(
                "Rejected request for disallowed host {:?}",
                req.headers().get(header::HOST)
            );
            let response = HttpResponse::BadRequest()
                .body("Invalid HTTP_HOST header")
                .map_into_right_body();
            return Box::pin(async move { Ok(req.into_response(response)) });
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_left_body())
        })
    }
}

/// Rejects state-changing requests from another origin with `403 Forbidden`.
///
/// `POST`, `PUT`, `PATCH` and `DELETE` must carry an `Origin` (or, failing
/// that, a `Referer`) whose host and port equal the request's `Host`.
pub struct CsrfOriginCheck;

impl<S, B> Transform<S, ServiceRequest> for CsrfOriginCheck
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = CsrfOriginCheckMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CsrfOriginCheckMiddleware { service }))
    }
}

pub struct CsrfOriginCheckMiddleware<S> {
    service: S,
}

fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Whether `source` (an origin or referer URL) points at `host`.
fn same_origin(source: &str, host: &str) -> bool {
    let Ok(source) = Url::parse(source) else {
        return false;
    };
    let Ok(expected) = Url::parse(&format!("{}://{}", source.scheme(), host)) else {
        return false;
    };
    source.host_str().is_some()
        && source.host_str() == expected.host_str()
        && source.port_or_known_default() == expected.port_or_known_default()
}

fn has_trusted_origin(req: &ServiceRequest) -> bool {
    let Some(host) = request_host(req) else {
        return false;
    };
    let source = req
        .headers()
        .get(header::ORIGIN)
        .or_else(|| req.headers().get(header::REFERER))
        .and_then(|value| value.to_str().ok());

    match source {
        Some(source) => same_origin(source, &host),
        None => false,
    }
}

impl<S, B> Service<ServiceRequest> for CsrfOriginCheckMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if !is_safe_method(req.method()) && !has_trusted_origin(&req) {
            log::warn!(
                "Rejected cross-origin {} {} (origin {:?})",
                req.method(),
                req.path(),
                req.headers().get(header::ORIGIN)
            );
            let response = HttpResponse::Forbidden()
                .body("CSRF verification failed")
                .map_into_right_body();
            return Box::pin(async move { Ok(req.into_response(response)) });
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_left_body())
        })
    }
}
