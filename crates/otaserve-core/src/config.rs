//! 服务器配置
//!
//! 命令行参数优先，其次是可选的 TOML 设置文件，最后是内置默认值。
//! 合并后的结果在启动时解析为 [`ServerConfig`]，此后在整个进程生命周期内只读。

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::firmware::FirmwareResolver;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 10234;
pub const DEFAULT_VERSION: &str = "1.0.0";
pub const DEFAULT_BUILD_DIR: &str = "build";
/// 扫描 build 目录时优先选择的镜像文件名
pub const DEFAULT_PREFERRED_NAME: &str = "satisfaction-hub.bin";

/// 设置文件内容
///
/// 所有字段可选；命令行参数也会转换成同样的结构再与文件合并。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub firmware: Option<PathBuf>,
    pub version: Option<String>,
    pub build_dir: Option<PathBuf>,
    pub preferred_name: Option<String>,
}

impl Settings {
    /// 从 TOML 文件加载设置
    ///
    /// 文件是显式指定的，因此读取或解析失败都视为错误，而不是回退到默认值。
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let settings = toml::from_str(&content).map_err(|e| Error::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// 以 `self` 为准，缺失的字段从 `fallback` 补齐
    #[must_use]
    pub fn or(self, fallback: Settings) -> Self {
        Self {
            host: self.host.or(fallback.host),
            port: self.port.or(fallback.port),
            firmware: self.firmware.or(fallback.firmware),
            version: self.version.or(fallback.version),
            build_dir: self.build_dir.or(fallback.build_dir),
            preferred_name: self.preferred_name.or(fallback.preferred_name),
        }
    }

    /// 填充默认值
    #[must_use]
    pub fn into_options(self) -> ServerOptions {
        let defaults = ServerOptions::default();
        ServerOptions {
            host: self.host.unwrap_or(defaults.host),
            port: self.port.unwrap_or(defaults.port),
            firmware: self.firmware,
            version: self.version.unwrap_or(defaults.version),
            build_dir: self.build_dir.unwrap_or(defaults.build_dir),
            preferred_name: self.preferred_name.unwrap_or(defaults.preferred_name),
        }
    }
}

/// 合并后的启动选项（固件尚未解析）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    /// 显式指定的固件文件
    pub firmware: Option<PathBuf>,
    pub version: String,
    /// 未指定 `firmware` 时扫描的目录
    pub build_dir: PathBuf,
    pub preferred_name: String,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            firmware: None,
            version: DEFAULT_VERSION.to_string(),
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            preferred_name: DEFAULT_PREFERRED_NAME.to_string(),
        }
    }
}

/// 服务器配置
///
/// 启动时创建一次，通过 `Arc` 只读共享给所有请求处理器。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 要分发的固件；`None` 表示没有可用固件，服务器仍然启动
    pub firmware: Option<PathBuf>,
    pub version: String,
}

impl ServerConfig {
    /// 校验版本号并解析固件路径
    pub fn from_options(options: ServerOptions) -> Result<Self> {
        validate_version(&options.version)?;

        let resolver = FirmwareResolver::new(&options.build_dir, &options.preferred_name);
        let firmware = resolver.resolve(options.firmware.as_deref())?;

        Ok(Self {
            host: options.host,
            port: options.port,
            firmware,
            version: options.version,
        })
    }

    /// 监听地址，可直接传给 `TcpListener::bind`
    #[must_use]
    pub fn bind_address(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }

    /// 用于日志展示的基础 URL
    #[must_use]
    pub fn base_url(&self) -> String {
        if self.host.contains(':') {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

/// 版本号会原样写入 `X-Firmware-Version` 和 `Content-Disposition` 响应头
fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() || axum::http::HeaderValue::from_str(version).is_err() {
        return Err(Error::InvalidVersion(version.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = Settings::default().into_options();
        assert_eq!(options.host, "0.0.0.0");
        assert_eq!(options.port, 10234);
        assert_eq!(options.version, "1.0.0");
        assert_eq!(options.build_dir, PathBuf::from("build"));
        assert_eq!(options.preferred_name, "satisfaction-hub.bin");
        assert!(options.firmware.is_none());
    }

    #[test]
    fn test_cli_overrides_settings_file() {
        let cli = Settings {
            port: Some(8080),
            ..Default::default()
        };
        let file = Settings {
            port: Some(9000),
            version: Some("2.0.0".to_string()),
            ..Default::default()
        };

        let options = cli.or(file).into_options();
        assert_eq!(options.port, 8080);
        assert_eq!(options.version, "2.0.0");
        assert_eq!(options.host, DEFAULT_HOST);
    }

    #[test]
    fn test_load_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("otaserve.toml");
        fs::write(
            &path,
            "port = 12000\nversion = \"3.1.4\"\npreferred_name = \"app.bin\"\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.port, Some(12000));
        assert_eq!(settings.version.as_deref(), Some("3.1.4"));
        assert_eq!(settings.preferred_name.as_deref(), Some("app.bin"));
        assert!(settings.host.is_none());
    }

    #[test]
    fn test_load_settings_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("otaserve.toml");
        fs::write(&path, "prot = 1\n").unwrap();

        assert!(matches!(
            Settings::load(&path),
            Err(Error::Settings { .. })
        ));
    }

    #[test]
    fn test_missing_settings_file() {
        let err = Settings::load(Path::new("/nonexistent/otaserve.toml")).unwrap_err();
        assert!(matches!(err, Error::Settings { .. }));
    }

    #[test]
    fn test_explicit_firmware_must_exist() {
        let options = ServerOptions {
            firmware: Some(PathBuf::from("/nonexistent/fw.bin")),
            ..Default::default()
        };
        assert!(matches!(
            ServerConfig::from_options(options),
            Err(Error::FirmwareNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_version_rejected() {
        let options = ServerOptions {
            version: "1.0\n".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ServerConfig::from_options(options),
            Err(Error::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_missing_build_dir_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = ServerOptions {
            build_dir: dir.path().join("missing"),
            ..Default::default()
        };

        let config = ServerConfig::from_options(options).unwrap();
        assert!(config.firmware.is_none());
    }

    #[test]
    fn test_base_url() {
        let mut config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 10234,
            firmware: None,
            version: DEFAULT_VERSION.to_string(),
        };
        assert_eq!(config.base_url(), "http://127.0.0.1:10234");

        config.host = "::".to_string();
        assert_eq!(config.base_url(), "http://[::]:10234");
    }
}
