//! File vault server binary.
//!
//! Wires the credential store, session tokens, file ownership registry and
//! object storage into an Axum router, then starts the HTTP listener and,
//! when a certificate is supplied, an HTTPS listener next to it.

mod access;
mod app;
mod atomic;
mod auth;
mod config;
mod credentials;
mod error;
mod files;
mod http;
mod logging;
mod password;
mod registry;
mod storage;
mod store;
mod tls;
mod token;
mod validation;
mod version;

use axum::extract::Extension;
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use crate::access::AccessController;
use crate::app::Services;
use crate::config::Args;
use crate::credentials::CredentialStore;
use crate::http::{RequestScheme, build_cors_layer};
use crate::password::{HashCost, PasswordHasher};
use crate::registry::FileRegistry;
use crate::storage::LocalObjectStore;
use crate::store::JsonStore;
use crate::token::TokenIssuer;

shadow!(build);

/// Starts the vault server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), io::Error> {
    logging::init_logging();

    let args = Args::parse();
    info!(config = ?args, "starting file vault");

    let store = Arc::new(
        JsonStore::connect(&args.database)
            .await
            .map_err(io::Error::other)?,
    );
    let hasher = PasswordHasher::new(HashCost {
        iterations: args.hash_iterations,
        memory_kib: args.hash_memory_kib,
    })
    .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;
    let token_ttl = (args.token_ttl_secs > 0).then(|| Duration::from_secs(args.token_ttl_secs));
    if token_ttl.is_none() {
        warn!("session tokens never expire; set --token-ttl-secs to bound them");
    }
    let issuer = Arc::new(TokenIssuer::new(args.jwt_secret.as_bytes(), token_ttl));

    let objects = Arc::new(LocalObjectStore::new(
        &args.storage_dir,
        &args.bucket,
        &args.public_url,
        args.storage_secret.as_bytes(),
    ));
    objects.ensure_root().await?;

    let credentials = Arc::new(CredentialStore::new(store.clone(), hasher));
    let access = Arc::new(AccessController::new(
        FileRegistry::new(store),
        objects.clone(),
    ));

    let mut app = app::build_router(Services {
        credentials,
        issuer,
        access,
        objects,
        upload_max_size: args.upload_max_size,
    });
    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;
    let http_addr = SocketAddr::new(host, args.port);
    let tls_config = tls::load_rustls_config(&args).await?;
    let handle = Handle::new();

    info!("🚀 Starting HTTP server at {}", http_addr);
    let http_app = app.clone().layer(Extension(RequestScheme::Http));
    let http_server = axum_server::bind(http_addr)
        .handle(handle.clone())
        .serve(http_app.into_make_service_with_connect_info::<SocketAddr>());

    match tls_config {
        Some(tls_config) => {
            let https_addr = SocketAddr::new(host, args.https_port);
            info!("🔒 Starting HTTPS server at {}", https_addr);
            let https_app = app.layer(Extension(RequestScheme::Https));
            let https_server = axum_server::bind_rustls(https_addr, tls_config)
                .handle(handle.clone())
                .serve(https_app.into_make_service_with_connect_info::<SocketAddr>());
            tokio::select! {
                result = http_server => result?,
                result = https_server => result?,
                _ = shutdown_signal(handle) => {}
            }
        }
        None => {
            tokio::select! {
                result = http_server => result?,
                _ = shutdown_signal(handle) => {}
            }
        }
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
