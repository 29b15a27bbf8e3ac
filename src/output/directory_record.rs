// 该文件是 Toukui （头盔） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::{
  path::PathBuf,
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::Render,
  reference::{ImageReference, ReferenceError, extension_for_mime},
  selection::SelectedImage,
  workflow::DetectionResult,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无法取回结果图像: {0}")]
  ReferenceError(#[from] ReferenceError),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
struct Record<'a> {
  source: &'a str,
  summary: &'a str,
  image: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  remote: Option<&'a str>,
  created_at: String,
}

/// 按日期归档结果图像和检测摘要
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: AtomicU16,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      frame_counter: AtomicU16::new(0),
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  // <dir>/YYYY/MM/DD/HH-MM-SS-XXXX
  fn frame_stem(&self, now: &DateTime<Utc>) -> Result<PathBuf, std::io::Error> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<SelectedImage, DetectionResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    input: &SelectedImage,
    result: &DetectionResult,
  ) -> Result<(), Self::Error> {
    let now = Utc::now();
    let stem = self.frame_stem(&now)?;

    let fetched = result.image.fetch()?;
    let image_path = stem.with_extension(extension_for_mime(&fetched.mime));
    std::fs::write(&image_path, &fetched.bytes)?;

    let image_name = image_path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    let remote = match &result.image {
      ImageReference::Remote(url) => Some(url.as_str()),
      _ => None,
    };
    let record = Record {
      source: input.filename(),
      summary: &result.summary,
      image: &image_name,
      remote,
      created_at: now.to_rfc3339(),
    };
    std::fs::write(stem.with_extension("json"), serde_json::to_vec_pretty(&record)?)?;

    info!("记录检测结果: {}", image_path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::Value;

  fn find_files(root: &std::path::Path, extension: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
          found.push(path);
        }
      }
    }
    found
  }

  #[test]
  fn writes_image_and_record() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    let input = SelectedImage::new("bike.jpg", "image/jpeg", vec![0u8]);
    let result = DetectionResult {
      image: ImageReference::DataUri("data:image/png;base64,AAEC".to_string()),
      summary: "2 riders, 1 without helmet".to_string(),
    };
    output.render_result(&input, &result).unwrap();
    output.render_result(&input, &result).unwrap();

    let images = find_files(dir.path(), "png");
    assert_eq!(images.len(), 2);
    assert_eq!(std::fs::read(&images[0]).unwrap(), vec![0, 1, 2]);

    let records = find_files(dir.path(), "json");
    assert_eq!(records.len(), 2);
    let record: Value = serde_json::from_slice(&std::fs::read(&records[0]).unwrap()).unwrap();
    assert_eq!(record["source"], "bike.jpg");
    assert_eq!(record["summary"], "2 riders, 1 without helmet");
    assert!(record.get("remote").is_none());
  }
}
