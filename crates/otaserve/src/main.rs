//! otaserve
//!
//! 开发用 OTA 服务器：为 ESP32 等设备提供更新检查和固件下载

use anyhow::{Context, Result};
use clap::Parser;
use otaserve_core::{ServerConfig, Settings};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "otaserve",
    about = "开发用 OTA 固件服务器",
    disable_version_flag = true
)]
struct Cli {
    /// 服务器端口 (默认: 10234)
    #[arg(long)]
    port: Option<u16>,
    /// 固件 .bin 文件路径
    #[arg(long)]
    firmware: Option<PathBuf>,
    /// 上报给设备的固件版本 (默认: 1.0.0)
    #[arg(long)]
    version: Option<String>,
    /// 未指定 --firmware 时扫描的 build 目录 (默认: build)
    #[arg(long)]
    build_dir: Option<PathBuf>,
    /// 绑定地址 (默认: 0.0.0.0)
    #[arg(long)]
    host: Option<String>,
    /// 扫描时优先选择的文件名 (默认: satisfaction-hub.bin)
    #[arg(long)]
    preferred_name: Option<String>,
    /// TOML 设置文件，命令行参数优先
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn into_settings(self) -> Result<Settings> {
        let file = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        let cli = Settings {
            host: self.host,
            port: self.port,
            firmware: self.firmware,
            version: self.version,
            build_dir: self.build_dir,
            preferred_name: self.preferred_name,
        };
        Ok(cli.or(file))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // tracing-subscriber 默认启用 tracing-log，otaserve-core 的 log 记录会一并输出
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,otaserve_core=debug")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))?;

    run(Cli::parse()).await
}

/// 解析配置、绑定端口并运行；配置或固件错误在绑定之前返回，进程以状态 1 退出
async fn run(cli: Cli) -> Result<()> {
    let options = cli.into_settings()?.into_options();
    let config = ServerConfig::from_options(options)?;

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;

    print_banner(&config)?;

    otaserve_core::serve(listener, config, shutdown_signal()).await?;

    Ok(())
}

fn print_banner(config: &ServerConfig) -> Result<()> {
    if let Some(path) = &config.firmware {
        let size = std::fs::metadata(path)
            .with_context(|| format!("failed to read {}", path.display()))?
            .len();
        tracing::info!("Firmware: {}", path.display());
        tracing::info!("Size: {} bytes ({:.2} KB)", size, kilobytes(size));
        tracing::info!("Version: {}", config.version);
    }

    let base = config.base_url();
    tracing::info!("Server started at {}", base);
    tracing::info!(
        "Check endpoint: {}/ota?action=check&device_id=XXX&current_version=X.X.X",
        base
    );
    tracing::info!("Download endpoint: {}/ota?device_id=XXX", base);
    tracing::info!("Press Ctrl+C to stop");
    Ok(())
}

/// 仅用于展示，超过 2^53 字节的精度损失无关紧要
#[allow(clippy::cast_precision_loss)]
fn kilobytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Stopping server...");
}
