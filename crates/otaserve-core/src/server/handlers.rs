//! 请求处理器
//!
//! 所有请求都进入同一个分发函数：`action=check` 在任何路径上都优先，
//! 其次是下载路径，其余返回 404。

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use log::{error, info};
use std::io;
use std::path::Path;
use std::sync::Arc;

use super::protocol::{
    DOWNLOAD_PATHS, HEADER_FIRMWARE_MD5, HEADER_FIRMWARE_VERSION, UpdateCheckResponse, UpdateQuery,
};
use crate::config::ServerConfig;
use crate::firmware::FirmwareImage;

/// 路由入口
pub async fn dispatch(
    State(config): State<Arc<ServerConfig>>,
    method: Method,
    uri: Uri,
) -> Response {
    match method {
        Method::GET => handle_get(&config, &uri).await,
        Method::OPTIONS => handle_preflight(),
        other => (
            StatusCode::NOT_IMPLEMENTED,
            format!("Unsupported method ({:?})", other.as_str()),
        )
            .into_response(),
    }
}

async fn handle_get(config: &ServerConfig, uri: &Uri) -> Response {
    // 无法解析的查询串按空处理
    let pairs = Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map(|Query(pairs)| pairs)
        .unwrap_or_default();
    let query = UpdateQuery::from_pairs(pairs);
    let path = uri.path();

    info!(
        "Request: {} | device_id={} | action={} | current_version={}",
        path,
        query.device_id.as_deref().unwrap_or("-"),
        query.action.as_deref().unwrap_or("-"),
        query.current_version
    );

    if query.is_check() {
        handle_check(config, &query).await
    } else if DOWNLOAD_PATHS.contains(&path) {
        handle_download(config, &query).await
    } else {
        (StatusCode::NOT_FOUND, "Not Found").into_response()
    }
}

/// 更新检查
async fn handle_check(config: &ServerConfig, query: &UpdateQuery) -> Response {
    let Some(path) = config.firmware.as_deref() else {
        return Json(UpdateCheckResponse::no_firmware()).into_response();
    };

    // 只读元数据，不读文件内容
    match tokio::fs::metadata(path).await {
        Ok(metadata) => {
            Json(UpdateCheckResponse::evaluate(query, &config.version, metadata.len()))
                .into_response()
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Json(UpdateCheckResponse::no_firmware()).into_response()
        }
        Err(e) => internal_error("Failed to stat firmware", path, e),
    }
}

/// 固件下载
async fn handle_download(config: &ServerConfig, query: &UpdateQuery) -> Response {
    let Some(path) = config.firmware.as_deref() else {
        return (StatusCode::NOT_FOUND, "Firmware not found").into_response();
    };

    let image = match FirmwareImage::load(path).await {
        Ok(image) => image,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return (StatusCode::NOT_FOUND, "Firmware not found").into_response();
        }
        Err(e) => return internal_error("Failed to serve firmware", path, e),
    };

    let headers = match download_headers(&config.version, &image) {
        Ok(headers) => headers,
        Err(e) => {
            error!("Failed to build download headers: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
        }
    };

    info!(
        "Firmware sent to device_id={} | size={} bytes | version={}",
        query.device_id.as_deref().unwrap_or("-"),
        image.len(),
        config.version
    );

    (StatusCode::OK, headers, image.data).into_response()
}

fn download_headers(
    version: &str,
    image: &FirmwareImage,
) -> Result<HeaderMap, header::InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(image.len()));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!(
            "attachment; filename=\"firmware_{}.bin\"",
            version
        ))?,
    );
    headers.insert(HEADER_FIRMWARE_VERSION, HeaderValue::from_str(version)?);
    headers.insert(HEADER_FIRMWARE_MD5, HeaderValue::from_str(&image.md5)?);
    Ok(headers)
}

/// CORS 预检，任意路径
fn handle_preflight() -> Response {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
        .into_response()
}

fn internal_error(context: &str, path: &Path, e: io::Error) -> Response {
    error!("{} {}: {}", context, path.display(), e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Internal error: {}", e),
    )
        .into_response()
}
