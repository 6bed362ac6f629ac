//! OTA HTTP 服务器
//!
//! # 接口
//!
//! - `GET /<任意路径>?action=check&device_id=..&current_version=..` 更新检查 (JSON)
//! - `GET /ota`、`GET /firmware.bin` 下载固件
//! - `OPTIONS *` CORS 预检
//!
//! 所有响应都带 `Access-Control-Allow-Origin: *`。

pub mod handlers;
pub mod protocol;

pub use protocol::{UpdateCheckResponse, UpdateQuery};

use axum::{
    Router,
    http::{HeaderValue, header},
    middleware::map_response,
    response::Response,
};
use log::{error, info, warn};
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::ServerConfig;
use crate::error::Result;

/// 构建路由
///
/// 检查请求不区分路径，因此所有 GET/OPTIONS 都走同一个 fallback 分发。
#[must_use]
pub fn router(config: Arc<ServerConfig>) -> Router {
    Router::new()
        .fallback(handlers::dispatch)
        .layer(map_response(allow_any_origin))
        .with_state(config)
}

/// 收到关闭信号后等待现有连接结束的最长时间
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// 在已绑定的监听器上运行，直到 `shutdown` 完成
pub async fn serve<F>(listener: TcpListener, config: ServerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    serve_with_grace(listener, config, shutdown, SHUTDOWN_GRACE).await
}

/// 同 [`serve`]，可指定关闭时的等待上限
///
/// 信号到达后立即停止接受新连接；仍未完成的连接（例如停在请求头中途的客户端）
/// 最多再等 `grace`，超时后直接返回，不保证其响应完成。
pub async fn serve_with_grace<F>(
    listener: TcpListener,
    config: ServerConfig,
    shutdown: F,
    grace: Duration,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(Arc::new(config));

    if let Ok(addr) = listener.local_addr() {
        info!("OTA server listening on {}", addr);
    }

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = stop_rx.changed().await;
        })
        .into_future();
    let mut server = std::pin::pin!(server);

    tokio::select! {
        res = &mut server => return finish(res),
        () = shutdown => {}
    }

    info!("Shutdown signal received, no longer accepting connections");
    let _ = stop_tx.send(true);

    match tokio::time::timeout(grace, server).await {
        Ok(res) => finish(res),
        Err(_) => {
            warn!(
                "Connections still open after {:?}, stopping without waiting",
                grace
            );
            Ok(())
        }
    }
}

fn finish(res: std::io::Result<()>) -> Result<()> {
    if let Err(e) = res {
        error!("Server error: {}", e);
        return Err(e.into());
    }
    info!("OTA server stopped");
    Ok(())
}

async fn allow_any_origin(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}
