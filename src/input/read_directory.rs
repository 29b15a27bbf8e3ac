// 该文件是 Toukui （头盔） 项目的一部分。
// src/input/read_directory.rs - 目录图像输入
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

use std::{collections::VecDeque, path::PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{accepted_image_mime, load_selected_image},
  selection::SelectedImage,
};

#[derive(Error, Debug)]
pub enum DirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按文件名顺序逐个产出目录中的图像
pub struct DirectoryInput {
  pending: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryInput {
  type Error = DirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DirectoryInputError::SchemeMismatch);
    }

    let mut paths = std::fs::read_dir(url.path())?
      .filter_map(|entry| entry.ok().map(|entry| entry.path()))
      .filter(|path| path.is_file() && accepted_image_mime(path).is_some())
      .collect::<Vec<_>>();
    paths.sort();
    info!("目录 {} 中共有 {} 张图像", url.path(), paths.len());

    Ok(DirectoryInput {
      pending: paths.into(),
    })
  }
}

impl Iterator for DirectoryInput {
  type Item = SelectedImage;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.pending.pop_front() {
      match load_selected_image(&path) {
        Ok(Some(image)) => return Some(image),
        Ok(None) => warn!("跳过非图像文件: {}", path.display()),
        Err(e) => error!("读取 {} 失败: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yields_images_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.jpg"), [2u8]).unwrap();
    std::fs::write(dir.path().join("a.png"), [1u8]).unwrap();
    std::fs::write(dir.path().join("readme.md"), "skip").unwrap();
    std::fs::create_dir(dir.path().join("nested.png")).unwrap();

    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let names = DirectoryInput::from_url(&url)
      .unwrap()
      .map(|image| image.filename().to_string())
      .collect::<Vec<_>>();
    assert_eq!(names, vec!["a.png", "b.jpg"]);
  }

  #[test]
  fn missing_directory_is_io_error() {
    let url = Url::parse("folder:///definitely/not/here").unwrap();
    assert!(matches!(
      DirectoryInput::from_url(&url),
      Err(DirectoryInputError::IoError(_))
    ));
  }
}
