//! 设备请求参数与响应格式
//!
//! 设备通过查询参数 `device_id`、`action`、`current_version` 描述请求，
//! 更新检查返回 JSON。

use serde::{Deserialize, Serialize};

/// 未提供 `current_version` 时假定的设备版本
pub const DEFAULT_CURRENT_VERSION: &str = "0.0.0";

/// 触发更新检查的 `action` 值
pub const ACTION_CHECK: &str = "check";

/// 没有可用固件时的提示
pub const NO_FIRMWARE_MESSAGE: &str = "No firmware available";

/// 下载路径
pub const DOWNLOAD_PATHS: [&str; 2] = ["/ota", "/firmware.bin"];

/// 自定义响应头
pub const HEADER_FIRMWARE_VERSION: &str = "x-firmware-version";
pub const HEADER_FIRMWARE_MD5: &str = "x-firmware-md5";

/// 设备请求参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateQuery {
    pub device_id: Option<String>,
    pub action: Option<String>,
    pub current_version: String,
}

impl Default for UpdateQuery {
    fn default() -> Self {
        Self {
            device_id: None,
            action: None,
            current_version: DEFAULT_CURRENT_VERSION.to_string(),
        }
    }
}

impl UpdateQuery {
    /// 从解码后的查询参数对构造
    ///
    /// 重复的键取第一个值；值为空的参数视为未提供。
    #[must_use]
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut device_id = None;
        let mut action = None;
        let mut current_version = None;

        for (key, value) in pairs {
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_str() {
                "device_id" => &mut device_id,
                "action" => &mut action,
                "current_version" => &mut current_version,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }

        Self {
            device_id,
            action,
            current_version: current_version
                .unwrap_or_else(|| DEFAULT_CURRENT_VERSION.to_string()),
        }
    }

    #[must_use]
    pub fn is_check(&self) -> bool {
        self.action.as_deref() == Some(ACTION_CHECK)
    }
}

/// 更新检查响应
///
/// 两种形态字段不同，按原样序列化（不带标签）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpdateCheckResponse {
    Available {
        update_available: bool,
        version: String,
        current_version: String,
        device_id: Option<String>,
        firmware_size: u64,
    },
    NoFirmware {
        update_available: bool,
        message: String,
    },
}

impl UpdateCheckResponse {
    #[must_use]
    pub fn no_firmware() -> Self {
        Self::NoFirmware {
            update_available: false,
            message: NO_FIRMWARE_MESSAGE.to_string(),
        }
    }

    /// 与服务器版本做精确字符串比较：只要不同就有更新，不做语义版本排序
    #[must_use]
    pub fn evaluate(query: &UpdateQuery, version: &str, firmware_size: u64) -> Self {
        Self::Available {
            update_available: query.current_version != version,
            version: version.to_string(),
            current_version: query.current_version.clone(),
            device_id: query.device_id.clone(),
            firmware_size,
        }
    }

    #[must_use]
    pub fn update_available(&self) -> bool {
        match self {
            Self::Available {
                update_available, ..
            }
            | Self::NoFirmware {
                update_available, ..
            } => *update_available,
        }
    }
}
