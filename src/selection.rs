// 该文件是 Toukui （头盔） 项目的一部分。
// src/selection.rs - 用户选择的图像及其预览
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

use std::{io, path::Path, sync::Arc};

use url::Url;

use crate::reference::LocalObject;

pub const UPLOAD_LABEL_PLACEHOLDER: &str = "Click to upload an image";
const UPLOAD_LABEL_MAX_CHARS: usize = 16;

/// 用户选择的图像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
  filename: String,
  mime: String,
  bytes: Arc<[u8]>,
}

impl SelectedImage {
  pub fn new(filename: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
    Self {
      filename: filename.into(),
      mime: mime.into(),
      bytes: bytes.into(),
    }
  }

  pub fn filename(&self) -> &str {
    &self.filename
  }

  pub fn mime(&self) -> &str {
    &self.mime
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  /// 上传框显示的文件名，超过 16 个字符时截断
  pub fn label(&self) -> String {
    if self.filename.chars().count() > UPLOAD_LABEL_MAX_CHARS {
      let head: String = self.filename.chars().take(UPLOAD_LABEL_MAX_CHARS).collect();
      format!("{}...", head)
    } else {
      self.filename.clone()
    }
  }
}

/// 所选图像的本地预览
#[derive(Debug)]
pub struct PreviewHandle {
  object: LocalObject,
}

impl PreviewHandle {
  pub fn create(image: &SelectedImage) -> io::Result<Self> {
    Ok(Self {
      object: LocalObject::create(image.bytes(), image.mime())?,
    })
  }

  pub fn url(&self) -> &Url {
    self.object.url()
  }

  pub fn path(&self) -> &Path {
    self.object.path()
  }
}
