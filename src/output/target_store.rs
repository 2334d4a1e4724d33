// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/target_store.rs - 目标图像持久化
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::frame::RgbFrame;

pub const DEFAULT_CAPTURE_DIR: &str = "target_capture";

#[derive(Error, Debug)]
pub enum StorageError {
  #[error("无法创建抓拍目录 {path}: {source}")]
  CreateDir {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("无法保存目标图像 {path}: {source}")]
  Save {
    path: PathBuf,
    source: image::ImageError,
  },
}

/// 目标图像目录，文件名为 `target_<unix 秒>.jpg`。
/// 同一秒内的多次抓拍会覆盖同名文件。
#[derive(Debug, Clone)]
pub struct TargetStore {
  directory: PathBuf,
}

impl TargetStore {
  /// 打开抓拍目录，不存在时创建
  pub fn open(directory: impl Into<PathBuf>) -> Result<Self, StorageError> {
    let directory = directory.into();
    std::fs::create_dir_all(&directory).map_err(|source| StorageError::CreateDir {
      path: directory.clone(),
      source,
    })?;
    Ok(Self { directory })
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn path_for(&self, stamp: DateTime<Utc>) -> PathBuf {
    self
      .directory
      .join(format!("target_{}.jpg", stamp.timestamp()))
  }

  pub fn save(&self, image: &RgbFrame, stamp: DateTime<Utc>) -> Result<PathBuf, StorageError> {
    let path = self.path_for(stamp);
    image
      .to_rgb_image()
      .save(&path)
      .map_err(|source| StorageError::Save {
        path: path.clone(),
        source,
      })?;
    info!("目标图像已保存到 {}", path.display());
    Ok(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn creates_directory_and_names_by_unix_seconds() {
    let dir = tempfile::tempdir().unwrap();
    let store = TargetStore::open(dir.path().join("nested/target_capture")).unwrap();
    assert!(store.directory().is_dir());

    let stamp = DateTime::from_timestamp(1_700_000_123, 500_000_000).unwrap();
    let path = store.save(&RgbFrame::with_shape(16, 16), stamp).unwrap();
    assert_eq!(path.file_name().unwrap(), "target_1700000123.jpg");
    let saved = image::open(&path).unwrap();
    assert_eq!((saved.width(), saved.height()), (16, 16));
  }

  #[test]
  fn surfaces_save_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = TargetStore::open(dir.path()).unwrap();
    let stamp = DateTime::from_timestamp(42, 0).unwrap();
    // 用同名目录占住目标路径
    std::fs::create_dir(store.path_for(stamp)).unwrap();

    let err = store.save(&RgbFrame::with_shape(4, 4), stamp).unwrap_err();
    assert!(matches!(err, StorageError::Save { .. }));
  }

  #[test]
  fn open_fails_when_path_is_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("occupied");
    std::fs::write(&file, b"x").unwrap();
    assert!(matches!(
      TargetStore::open(&file),
      Err(StorageError::CreateDir { .. })
    ));
  }
}
