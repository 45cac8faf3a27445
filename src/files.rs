//! 文件列表、上传、下载跳转与签名对象读取处理器。

use axum::body::{Body as AxumBody, Bytes};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, Multipart, Path, Query};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use chrono::Utc;
use httpdate::fmt_http_date;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::access::AccessController;
use crate::auth::Identity;
use crate::error::{ApiError, LINK_REJECTED};
use crate::storage::{LocalObjectStore, display_name};
use crate::store::FileRecord;

const FILE_FIELD: &str = "file";
const OWNER_FIELD: &str = "userId";

/// 列出当前用户的文件记录。
pub async fn home(
    identity: Identity,
    Extension(access): Extension<Arc<AccessController>>,
) -> Result<JsonResponse<Vec<FileRecord>>, ApiError> {
    let files = access
        .registry()
        .list_by_owner(identity.user_id)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    info!(user_id = %identity.user_id, count = files.len(), "list files");
    Ok(JsonResponse(files))
}

/// 上传单个文件（multipart 字段 `file`），归属于当前身份。
///
/// 先读完全部字段再写入存储，请求体出错时不留下任何对象或记录。
pub async fn upload(
    identity: Identity,
    Extension(access): Extension<Arc<AccessController>>,
    mut multipart: Multipart,
) -> Result<JsonResponse<FileRecord>, ApiError> {
    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FILE_FIELD) if upload.is_none() => {
                let original_name = field
                    .file_name()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("file name is required".into()))?;
                let data = field.bytes().await?;
                upload = Some((original_name, data));
            }
            Some(OWNER_FIELD) => {
                let claimed = field.text().await?;
                if claimed.trim() != identity.user_id.to_string() {
                    warn!(
                        user_id = %identity.user_id,
                        "ignoring client-supplied owner id"
                    );
                }
            }
            _ => {}
        }
    }

    let (original_name, data) =
        upload.ok_or_else(|| ApiError::BadRequest("file is required".into()))?;
    let record = access.store_upload(&identity, &original_name, data).await?;
    info!(
        path = record.path,
        original_name = record.original_name,
        owner_id = %record.owner_id,
        "file uploaded"
    );
    Ok(JsonResponse(record))
}

/// 校验归属后 302 跳转到限时签名链接。
pub async fn download(
    identity: Identity,
    Extension(access): Extension<Arc<AccessController>>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let link = access.authorize_download(&identity, &path).await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, link.url)]).into_response())
}

#[derive(Deserialize)]
pub(crate) struct SignedQuery {
    expires: i64,
    signature: String,
}

/// 签名链接读取对象：链接本身即凭证，无需会话。
pub async fn serve_object(
    Extension(objects): Extension<Arc<LocalObjectStore>>,
    Path(key): Path<String>,
    query: Result<Query<SignedQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Ok(Query(query)) = query else {
        return Err(ApiError::Forbidden(LINK_REJECTED.into()));
    };
    if let Err(err) = objects.verify_read(&key, query.expires, &query.signature, Utc::now()) {
        warn!(key, error = %err, "signed url rejected");
        return Err(err.into());
    }

    let (file, metadata) = objects.open(&key).await?;
    let name = display_name(&key);
    let mime = mime_guess::from_path(name).first_or_octet_stream();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| ApiError::Internal("invalid mime type".into()))?,
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{name}\""))
            .map_err(|_| ApiError::Internal("invalid content disposition".into()))?,
    );
    if let Some(modified) = metadata.modified().ok().map(fmt_http_date) {
        headers.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&modified)
                .map_err(|_| ApiError::Internal("invalid last-modified".into()))?,
        );
    }

    info!(key, size = metadata.len(), "object served");
    Ok((
        StatusCode::OK,
        headers,
        AxumBody::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}
