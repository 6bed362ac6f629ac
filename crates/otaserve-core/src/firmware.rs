//! 固件解析与加载
//!
//! 启动时确定要分发的固件文件：显式路径必须存在；否则递归扫描 build 目录，
//! 跳过 bootloader 和分区表镜像，优先选择文件名包含首选名称的镜像。

use log::{debug, error, info, warn};
use md5::{Digest, Md5};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// 固件镜像扩展名
pub const IMAGE_EXTENSION: &str = ".bin";

/// 文件名包含这些子串的镜像不是应用固件
const EXCLUDED_MARKERS: [&str; 2] = ["bootloader", "partition"];

/// 判断文件名是否为候选应用镜像（区分大小写）
#[must_use]
pub fn is_candidate(file_name: &str) -> bool {
    file_name.ends_with(IMAGE_EXTENSION)
        && !EXCLUDED_MARKERS
            .iter()
            .any(|marker| file_name.contains(marker))
}

/// 固件路径解析器
pub struct FirmwareResolver {
    build_dir: PathBuf,
    preferred_name: String,
}

impl FirmwareResolver {
    #[must_use]
    pub fn new(build_dir: impl Into<PathBuf>, preferred_name: impl Into<String>) -> Self {
        Self {
            build_dir: build_dir.into(),
            preferred_name: preferred_name.into(),
        }
    }

    /// 解析要分发的固件
    ///
    /// - 显式路径不存在时返回 [`Error::FirmwareNotFound`]
    /// - 扫描不到任何候选时返回 `Ok(None)`
    pub fn resolve(&self, explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.exists() {
                error!("Firmware file not found: {}", path.display());
                return Err(Error::FirmwareNotFound(path.to_path_buf()));
            }
            return Ok(Some(path.to_path_buf()));
        }

        match self.discover() {
            Some(path) => {
                info!("Firmware found automatically: {}", path.display());
                Ok(Some(path))
            }
            None => {
                warn!("No firmware found. Use --firmware to specify one.");
                Ok(None)
            }
        }
    }

    /// 扫描 build 目录
    #[must_use]
    pub fn discover(&self) -> Option<PathBuf> {
        if !self.build_dir.exists() {
            debug!("Build directory {:?} does not exist", self.build_dir);
            return None;
        }

        let mut candidates = Vec::new();
        collect_candidates(&self.build_dir, &mut candidates);
        debug!(
            "Found {} candidate image(s) under {:?}",
            candidates.len(),
            self.build_dir
        );

        let preferred = candidates.iter().position(|path| {
            path.file_name()
                .is_some_and(|name| name.to_string_lossy().contains(&self.preferred_name))
        });

        match preferred {
            Some(index) => Some(candidates.swap_remove(index)),
            None => candidates.into_iter().next(),
        }
    }
}

/// 自顶向下遍历：先收集当前目录的文件，再按名称顺序进入子目录。
/// 目录项按名称排序以保证结果确定；不跟随指向目录的符号链接。
fn collect_candidates(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Skipping unreadable directory {:?}: {}", dir, e);
            return;
        }
    };

    let mut entries: Vec<_> = entries.filter_map(|entry| entry.ok()).collect();
    entries.sort_by_key(|entry| entry.file_name());

    let mut subdirs = Vec::new();
    for entry in entries {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        let is_file = if file_type.is_symlink() {
            fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false)
        } else if file_type.is_dir() {
            subdirs.push(path);
            continue;
        } else {
            file_type.is_file()
        };

        if is_file && is_candidate(&entry.file_name().to_string_lossy()) {
            out.push(path);
        }
    }

    for subdir in subdirs {
        collect_candidates(&subdir, out);
    }
}

/// 加载到内存中的固件内容
///
/// 每次下载请求都重新读取，不做缓存。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    pub data: Vec<u8>,
    /// 小写十六进制 MD5，仅供客户端做完整性校验
    pub md5: String,
}

impl FirmwareImage {
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let md5 = format!("{:x}", Md5::digest(&data));
        Self { data, md5 }
    }

    pub async fn load(path: &Path) -> io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(data))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"image").unwrap();
    }

    #[test]
    fn test_is_candidate() {
        assert!(is_candidate("app.bin"));
        assert!(!is_candidate("app.elf"));
        assert!(!is_candidate("bootloader.bin"));
        assert!(!is_candidate("partition-table.bin"));
        // 区分大小写
        assert!(is_candidate("Bootloader.bin"));
        assert!(!is_candidate("app.BIN"));
    }

    #[test]
    fn test_excluded_even_when_only_candidate() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("bootloader/bootloader.bin"));
        touch(&dir.path().join("partition_table/partition-table.bin"));

        let resolver = FirmwareResolver::new(dir.path(), "satisfaction-hub.bin");
        assert_eq!(resolver.discover(), None);
    }

    #[test]
    fn test_preferred_name_wins_regardless_of_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("aaa.bin"));
        touch(&dir.path().join("zzz/nested/satisfaction-hub.bin"));

        let resolver = FirmwareResolver::new(dir.path(), "satisfaction-hub.bin");
        assert_eq!(
            resolver.discover(),
            Some(dir.path().join("zzz/nested/satisfaction-hub.bin"))
        );
    }

    #[test]
    fn test_first_candidate_without_preferred() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("sub/other.bin"));
        touch(&dir.path().join("top.bin"));
        touch(&dir.path().join("bootloader.bin"));

        let resolver = FirmwareResolver::new(dir.path(), "satisfaction-hub.bin");
        // 当前目录的文件先于子目录
        assert_eq!(resolver.discover(), Some(dir.path().join("top.bin")));
    }

    #[test]
    fn test_preferred_name_is_configurable() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.bin"));
        touch(&dir.path().join("my-device.bin"));

        let resolver = FirmwareResolver::new(dir.path(), "my-device");
        assert_eq!(resolver.discover(), Some(dir.path().join("my-device.bin")));
    }

    #[test]
    fn test_missing_build_dir() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FirmwareResolver::new(dir.path().join("build"), "x.bin");
        assert_eq!(resolver.resolve(None).unwrap(), None);
    }

    #[test]
    fn test_explicit_path_bypasses_scan() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("custom.img");
        touch(&explicit);

        let resolver = FirmwareResolver::new(dir.path().join("missing"), "x.bin");
        assert_eq!(
            resolver.resolve(Some(&explicit)).unwrap(),
            Some(explicit.clone())
        );
    }

    #[test]
    fn test_image_md5() {
        let image = FirmwareImage::from_bytes(b"hello".to_vec());
        assert_eq!(image.md5, "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(image.len(), 5);

        let empty = FirmwareImage::from_bytes(Vec::new());
        assert_eq!(empty.md5, "d41d8cd98f00b204e9800998ecf8427e");
        assert!(empty.is_empty());
    }
}
