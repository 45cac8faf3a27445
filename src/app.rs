//! 路由装配：HTTP 接口、追踪与共享服务注入。

use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::access::AccessController;
use crate::credentials::CredentialStore;
use crate::http::{add_security_headers, extract_forwarded_ip};
use crate::storage::LocalObjectStore;
use crate::token::TokenIssuer;
use crate::{auth, files, version};

/// 以 Extension 注入每个请求的共享服务。
#[derive(Clone)]
pub struct Services {
    pub credentials: Arc<CredentialStore>,
    pub issuer: Arc<TokenIssuer>,
    pub access: Arc<AccessController>,
    pub objects: Arc<LocalObjectStore>,
    pub upload_max_size: usize,
}

pub fn build_router(services: Services) -> Router {
    Router::new()
        .route("/user/register", post(auth::register))
        .route("/user/login", post(auth::login))
        .route("/user/logout", post(auth::logout))
        .route("/home", get(files::home))
        .route(
            "/upload",
            post(files::upload).layer(DefaultBodyLimit::max(services.upload_max_size)),
        )
        .route("/download/{path}", get(files::download))
        .route("/objects/{key}", get(files::serve_object))
        .route("/api/version", get(version::get_version_info))
        .layer(middleware::from_fn(add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let client_ip = extract_forwarded_ip(request.headers())
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "direct".to_string());
                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(services.credentials))
        .layer(Extension(services.issuer))
        .layer(Extension(services.access))
        .layer(Extension(services.objects))
}
