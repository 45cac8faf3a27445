//! CLI arguments and server configuration defaults.

use clap::Parser;
use shadow_rs::formatcp;
use std::fmt;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const TOKEN_COOKIE_NAME: &str = "token";
pub const DOWNLOAD_URL_TTL_SECS: i64 = 15 * 60;
pub const MEMORY_DATABASE: &str = "memory:";
pub const DEFAULT_DATABASE: &str = ".vault/db.json";
pub const DEFAULT_STORAGE_DIR: &str = ".vault/objects";
pub const DEFAULT_BUCKET: &str = "vault";
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";
/// 会话令牌有效期上限（10 年）。
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;
pub const DEFAULT_HASH_ITERATIONS: u32 = 2;
pub const DEFAULT_HASH_MEMORY_KIB: u32 = 19 * 1024;
pub const DEFAULT_UPLOAD_MAX_SIZE: usize = 100 * 1024 * 1024;
pub const MIN_USERNAME_LEN: usize = 8;
pub const MIN_EMAIL_LEN: usize = 12;
pub const MIN_PASSWORD_LEN: usize = 8;

/// CLI arguments and environment configuration for the server.
#[derive(Parser)]
#[command(name = "file-vault", version = VERSION_INFO, about = "Multi-user file vault")]
pub struct Args {
    #[arg(
        short = 'b',
        long,
        env = "VAULT_BIND",
        default_value = "0.0.0.0",
        help = "Bind address for HTTP/HTTPS"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "VAULT_PORT",
        default_value_t = 3000,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        short = 'P',
        long,
        env = "VAULT_HTTPS_PORT",
        default_value_t = 3443,
        help = "HTTPS port (only used with --tls-cert and --tls-key)"
    )]
    pub https_port: u16,
    #[arg(short = 'c', long, env = "VAULT_TLS_CERT", help = "TLS cert path")]
    pub tls_cert: Option<String>,
    #[arg(short = 'k', long, env = "VAULT_TLS_KEY", help = "TLS key path")]
    pub tls_key: Option<String>,
    #[arg(
        short = 'd',
        long,
        env = "VAULT_DATABASE",
        default_value = DEFAULT_DATABASE,
        help = "Database snapshot path, or `memory:` for a non-durable store"
    )]
    pub database: String,
    #[arg(long, env = "VAULT_JWT_SECRET", help = "Session token signing secret")]
    pub jwt_secret: String,
    #[arg(
        long,
        env = "VAULT_TOKEN_TTL_SECS",
        default_value_t = 0,
        value_parser = clap::value_parser!(u64).range(0..=MAX_TOKEN_TTL_SECS),
        help = "Session token lifetime in seconds (0 to disable expiry)"
    )]
    pub token_ttl_secs: u64,
    #[arg(
        long,
        env = "VAULT_HASH_ITERATIONS",
        default_value_t = DEFAULT_HASH_ITERATIONS,
        help = "Password hashing time cost"
    )]
    pub hash_iterations: u32,
    #[arg(
        long,
        env = "VAULT_HASH_MEMORY_KIB",
        default_value_t = DEFAULT_HASH_MEMORY_KIB,
        help = "Password hashing memory cost in KiB"
    )]
    pub hash_memory_kib: u32,
    #[arg(
        short = 's',
        long,
        env = "VAULT_STORAGE_DIR",
        default_value = DEFAULT_STORAGE_DIR,
        help = "Object storage root directory"
    )]
    pub storage_dir: String,
    #[arg(
        long,
        env = "VAULT_BUCKET",
        default_value = DEFAULT_BUCKET,
        help = "Object storage bucket name"
    )]
    pub bucket: String,
    #[arg(
        long,
        env = "VAULT_STORAGE_SECRET",
        help = "Object storage credential used to sign read URLs"
    )]
    pub storage_secret: String,
    #[arg(
        long,
        env = "VAULT_PUBLIC_URL",
        default_value = DEFAULT_PUBLIC_URL,
        help = "Externally reachable base URL used in signed links"
    )]
    pub public_url: String,
    #[arg(
        long,
        env = "VAULT_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max upload request size in bytes"
    )]
    pub upload_max_size: usize,
    #[arg(long, env = "VAULT_CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("https_port", &self.https_port)
            .field("tls_cert", &self.tls_cert)
            .field("tls_key", &self.tls_key)
            .field("database", &self.database)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("hash_iterations", &self.hash_iterations)
            .field("hash_memory_kib", &self.hash_memory_kib)
            .field("storage_dir", &self.storage_dir)
            .field("bucket", &self.bucket)
            .field("storage_secret", &"<redacted>")
            .field("public_url", &self.public_url)
            .field("upload_max_size", &self.upload_max_size)
            .field("cors_origins", &self.cors_origins)
            .finish()
    }
}
