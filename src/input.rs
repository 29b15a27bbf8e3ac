// 该文件是 Toukui （头盔） 项目的一部分。
// src/input.rs - 图像输入
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

use std::path::Path;

use thiserror::Error;

#[cfg(any(feature = "read_image_file", feature = "read_directory"))]
use crate::FromUrlWithScheme;
use crate::{FromUrl, reference::mime_for_extension, selection::SelectedImage};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "read_directory")]
mod read_directory;
#[cfg(feature = "read_directory")]
pub use self::read_directory::{DirectoryInput, DirectoryInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "read_directory")]
  #[error("Directory input error: {0}")]
  DirectoryInputError(#[from] DirectoryInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

/// 选择过滤：只接受常见图像扩展名，返回对应的 MIME 类型
pub fn accepted_image_mime(path: &Path) -> Option<&'static str> {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .and_then(mime_for_extension)
}

/// 读取图像文件为所选图像
pub fn load_selected_image(path: &Path) -> std::io::Result<Option<SelectedImage>> {
  let Some(mime) = accepted_image_mime(path) else {
    return Ok(None);
  };
  let bytes = std::fs::read(path)?;
  let filename = path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default();
  Ok(Some(SelectedImage::new(filename, mime, bytes)))
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "read_directory")]
  ReadDirectory(DirectoryInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "read_image_file")]
      ImageFileInput::SCHEME => {
        Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?))
      }
      #[cfg(feature = "read_directory")]
      DirectoryInput::SCHEME => {
        Ok(InputWrapper::ReadDirectory(DirectoryInput::from_url(url)?))
      }
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = SelectedImage;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next(),
      #[cfg(feature = "read_directory")]
      InputWrapper::ReadDirectory(input) => input.next(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn filter_accepts_images_only() {
    assert_eq!(accepted_image_mime(Path::new("a/bike.JPG")), Some("image/jpeg"));
    assert_eq!(accepted_image_mime(Path::new("a/bike.webp")), Some("image/webp"));
    assert_eq!(accepted_image_mime(Path::new("notes.txt")), None);
    assert_eq!(accepted_image_mime(Path::new("no_extension")), None);
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = url::Url::parse("rtsp://camera/stream").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch)
    ));
  }
}
