//! 认证：会话令牌校验（`Identity` 提取器）与注册/登录/登出接口。

use axum::extract::{Extension, Form, FromRequest, FromRequestParts, Json, Request};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Json as JsonResponse;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use cookie::time::Duration as CookieDuration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::config::TOKEN_COOKIE_NAME;
use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::http::{RequestScheme, is_https_request};
use crate::store::{User, UserId};
use crate::token::{Claims, TokenIssuer};

/// 已验证的调用者身份；受保护的处理器以参数形式显式接收。
///
/// 仅凭签名解析，不回查用户记录。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
    pub username: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email,
            username: claims.username,
        }
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let issuer = parts
            .extensions
            .get::<Arc<TokenIssuer>>()
            .cloned()
            .ok_or_else(|| ApiError::Internal("token issuer not configured".into()))?;
        let jar = CookieJar::from_headers(&parts.headers);
        authenticate(&jar, &issuer)
    }
}

/// 无令牌 → 401；令牌无效 → 400；有效 → 身份。
pub fn authenticate(jar: &CookieJar, issuer: &TokenIssuer) -> Result<Identity, ApiError> {
    let token = match jar.get(TOKEN_COOKIE_NAME) {
        Some(cookie) if !cookie.value().is_empty() => cookie.value(),
        _ => return Err(ApiError::Unauthorized),
    };
    match issuer.verify(token) {
        Ok(claims) => Ok(claims.into()),
        Err(err) => {
            warn!(error = %err, "session token rejected");
            Err(err.into())
        }
    }
}

/// 请求体：HTML 表单（`application/x-www-form-urlencoded`）或 JSON。
pub struct JsonOrForm<T>(pub T);

impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| {
                value
                    .trim_start()
                    .to_ascii_lowercase()
                    .starts_with("application/x-www-form-urlencoded")
            });
        if is_form {
            let Form(value) = Form::<T>::from_request(request, state).await?;
            Ok(Self(value))
        } else {
            let Json(value) = Json::<T>::from_request(request, state).await?;
            Ok(Self(value))
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct RegisterRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// 对外的用户视图（不含密码哈希）。
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

/// 注册接口。
pub async fn register(
    Extension(credentials): Extension<Arc<CredentialStore>>,
    JsonOrForm(payload): JsonOrForm<RegisterRequest>,
) -> Result<JsonResponse<UserView>, ApiError> {
    let user = credentials
        .register(&payload.username, &payload.email, &payload.password)
        .await?;
    Ok(JsonResponse(user.into()))
}

/// 登录接口：签发令牌并写入 `token` Cookie。
pub async fn login(
    Extension(credentials): Extension<Arc<CredentialStore>>,
    Extension(issuer): Extension<Arc<TokenIssuer>>,
    Extension(scheme): Extension<RequestScheme>,
    headers: HeaderMap,
    jar: CookieJar,
    JsonOrForm(payload): JsonOrForm<LoginRequest>,
) -> Result<(CookieJar, (StatusCode, &'static str)), ApiError> {
    let user = credentials
        .authenticate(&payload.email, &payload.password)
        .await?;
    let token = issuer
        .issue(&Claims {
            user_id: user.id,
            email: user.email,
            username: user.username,
        })
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let mut cookie = Cookie::build((TOKEN_COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .secure(is_https_request(&headers, scheme))
        .same_site(SameSite::Lax);
    if let Some(ttl) = issuer.ttl() {
        cookie = cookie.max_age(CookieDuration::seconds(
            i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
        ));
    }
    Ok((jar.add(cookie), (StatusCode::OK, "Login Successful")))
}

/// 登出接口：令牌无状态，仅删除客户端 Cookie。
pub async fn logout(jar: CookieJar) -> (CookieJar, StatusCode) {
    (
        jar.remove(Cookie::build(TOKEN_COOKIE_NAME).path("/")),
        StatusCode::NO_CONTENT,
    )
}
