// 该文件是 Toukui （头盔） 项目的一部分。
// src/reference.rs - 可显示的图像引用
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
  fmt,
  io::{self, Write},
  path::Path,
};

use base64::{Engine, engine::general_purpose::STANDARD};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_IMAGE_MIME: &str = "image/png";
const DATA_URI_PREFIX: &str = "data:";
const LOCAL_OBJECT_PREFIX: &str = "toukui-";

const MIME_EXTENSIONS: [(&str, &str); 6] = [
  ("image/jpeg", "jpg"),
  ("image/png", "png"),
  ("image/bmp", "bmp"),
  ("image/gif", "gif"),
  ("image/webp", "webp"),
  ("image/jpeg", "jpeg"),
];

/// 根据文件扩展名推断图像 MIME 类型
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
  let extension = extension.to_ascii_lowercase();
  MIME_EXTENSIONS
    .iter()
    .find(|(_, ext)| *ext == extension)
    .map(|(mime, _)| *mime)
}

pub fn extension_for_mime(mime: &str) -> &'static str {
  MIME_EXTENSIONS
    .iter()
    .find(|(m, _)| m.eq_ignore_ascii_case(mime))
    .map(|(_, ext)| *ext)
    .unwrap_or("bin")
}

#[derive(Error, Debug)]
pub enum ReferenceError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] io::Error),
  #[error("无效的 data URI")]
  InvalidDataUri,
  #[error("base64 解码错误: {0}")]
  Base64Error(#[from] base64::DecodeError),
  #[error("下载远程图像失败: {0}")]
  HttpError(#[from] reqwest::Error),
  #[error("无法解析的图像地址: {0}")]
  UnresolvedLink(String),
}

/// 本地可解析的对象，生命周期结束时临时文件随之删除
#[derive(Debug)]
pub struct LocalObject {
  file: NamedTempFile,
  url: Url,
  mime: String,
}

impl LocalObject {
  pub fn create(bytes: &[u8], mime: &str) -> io::Result<Self> {
    let suffix = format!(".{}", extension_for_mime(mime));
    let mut file = tempfile::Builder::new()
      .prefix(LOCAL_OBJECT_PREFIX)
      .suffix(&suffix)
      .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;

    let url = Url::from_file_path(file.path())
      .map_err(|_| io::Error::other(format!("无法将路径转换为 URL: {}", file.path().display())))?;
    debug!("创建本地对象: {}", url);

    Ok(Self {
      file,
      url,
      mime: mime.to_string(),
    })
  }

  pub fn path(&self) -> &Path {
    self.file.path()
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  pub fn mime(&self) -> &str {
    &self.mime
  }
}

/// 取回的图像数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBytes {
  pub mime: String,
  pub bytes: Vec<u8>,
}

/// 可显示的图像引用
#[derive(Debug)]
pub enum ImageReference {
  /// `data:image/...;base64,...` 内联数据
  DataUri(String),
  /// 远程地址
  Remote(Url),
  /// 端点给出但无法解析为绝对地址的链接，原样保留
  Link(String),
  /// 本地临时对象
  Local(LocalObject),
}

impl ImageReference {
  pub fn as_str(&self) -> &str {
    match self {
      ImageReference::DataUri(uri) => uri,
      ImageReference::Remote(url) => url.as_str(),
      ImageReference::Link(link) => link,
      ImageReference::Local(object) => object.url().as_str(),
    }
  }

  /// 取回引用指向的图像数据
  pub fn fetch(&self) -> Result<ImageBytes, ReferenceError> {
    match self {
      ImageReference::DataUri(uri) => decode_data_uri(uri),
      ImageReference::Link(link) => Err(ReferenceError::UnresolvedLink(link.clone())),
      ImageReference::Local(object) => Ok(ImageBytes {
        mime: object.mime().to_string(),
        bytes: std::fs::read(object.path())?,
      }),
      ImageReference::Remote(url) => {
        debug!("下载远程图像: {}", url);
        let response = reqwest::blocking::get(url.clone())?.error_for_status()?;
        let mime = response
          .headers()
          .get(reqwest::header::CONTENT_TYPE)
          .and_then(|v| v.to_str().ok())
          .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
          .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());
        let bytes = response.bytes()?.to_vec();
        Ok(ImageBytes { mime, bytes })
      }
    }
  }
}

impl fmt::Display for ImageReference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

pub fn is_image_data_uri(value: &str) -> bool {
  value.starts_with("data:image")
}

/// 为裸 base64 数据补上默认的 data URI 前缀
pub fn base64_data_uri(payload: &str) -> String {
  format!("{}{};base64,{}", DATA_URI_PREFIX, DEFAULT_IMAGE_MIME, payload)
}

pub fn decode_data_uri(uri: &str) -> Result<ImageBytes, ReferenceError> {
  let rest = uri
    .strip_prefix(DATA_URI_PREFIX)
    .ok_or(ReferenceError::InvalidDataUri)?;
  let (header, payload) = rest.split_once(',').ok_or(ReferenceError::InvalidDataUri)?;
  let mime = header
    .strip_suffix(";base64")
    .ok_or(ReferenceError::InvalidDataUri)?;
  let mime = if mime.is_empty() {
    DEFAULT_IMAGE_MIME
  } else {
    mime
  };

  Ok(ImageBytes {
    mime: mime.to_string(),
    bytes: STANDARD.decode(payload.trim())?,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mime_lookup_both_ways() {
    assert_eq!(mime_for_extension("JPG"), Some("image/jpeg"));
    assert_eq!(mime_for_extension("jpeg"), Some("image/jpeg"));
    assert_eq!(mime_for_extension("txt"), None);
    assert_eq!(extension_for_mime("image/png"), "png");
    assert_eq!(extension_for_mime("application/octet-stream"), "bin");
  }

  #[test]
  fn decodes_base64_data_uri() {
    let decoded = decode_data_uri("data:image/jpeg;base64,AAEC").unwrap();
    assert_eq!(decoded.mime, "image/jpeg");
    assert_eq!(decoded.bytes, vec![0, 1, 2]);

    assert!(matches!(
      decode_data_uri("data:image/png,AAEC"),
      Err(ReferenceError::InvalidDataUri)
    ));
    assert!(matches!(
      decode_data_uri("data:image/png;base64,@@@"),
      Err(ReferenceError::Base64Error(_))
    ));
  }

  #[test]
  fn local_object_is_released_on_drop() {
    let object = LocalObject::create(&[1, 2, 3], "image/png").unwrap();
    let path = object.path().to_path_buf();
    assert!(path.exists());
    assert_eq!(object.url().scheme(), "file");
    assert!(object.url().as_str().ends_with(".png"));

    let reference = ImageReference::Local(object);
    assert_eq!(reference.fetch().unwrap().bytes, vec![1, 2, 3]);

    drop(reference);
    assert!(!path.exists());
  }
}
