//! otaserve Core Library
//!
//! 面向嵌入式设备的开发用 OTA 固件分发服务
//!
//! # 模块
//!
//! - **config**: 启动参数、设置文件和不可变的服务器配置
//! - **firmware**: 构建目录扫描和固件镜像加载
//! - **server**: HTTP 路由（更新检查、固件下载、CORS 预检）
//!
//! # 使用示例
//!
//! ```ignore
//! use otaserve_core::{ServerConfig, ServerOptions, server};
//!
//! // 1. 解析固件路径（显式指定或扫描 build 目录）
//! let config = ServerConfig::from_options(ServerOptions::default())?;
//!
//! // 2. 绑定端口并运行，直到收到关闭信号
//! let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
//! server::serve(listener, config, async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

pub mod config;
pub mod error;
pub mod firmware;
pub mod server;

pub use config::{ServerConfig, ServerOptions, Settings};
pub use error::{Error, Result};
pub use firmware::{FirmwareImage, FirmwareResolver};
pub use server::{UpdateCheckResponse, UpdateQuery, router, serve, serve_with_grace};
