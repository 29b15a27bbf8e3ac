// 该文件是 Toukui （头盔） 项目的一部分。
// src/output/console.rs - 终端输出
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

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::Render,
  reference::ImageReference,
  selection::SelectedImage,
  workflow::DetectionResult,
};

const DATA_URI_PREVIEW_CHARS: usize = 48;

#[derive(Error, Debug)]
pub enum ConsoleOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 把检测摘要打印到标准输出
pub struct ConsoleOutput {
  full: bool,
}

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "console";
}

impl FromUrl for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ConsoleOutputError::SchemeMismatch);
    }
    let full = url.query_pairs().any(|(k, _)| k == "full");
    Ok(ConsoleOutput { full })
  }
}

impl ConsoleOutput {
  fn describe_reference(&self, reference: &ImageReference) -> String {
    match reference {
      ImageReference::DataUri(uri) if !self.full && uri.chars().count() > DATA_URI_PREVIEW_CHARS => {
        let head: String = uri.chars().take(DATA_URI_PREVIEW_CHARS).collect();
        format!("{}... ({} 字符)", head, uri.len())
      }
      other => other.as_str().to_string(),
    }
  }

  pub fn format_result(&self, input: &SelectedImage, result: &DetectionResult) -> String {
    format!(
      "{}\n  Detected {}\n  结果图像: {}",
      input.filename(),
      result.summary,
      self.describe_reference(&result.image)
    )
  }
}

impl Render<SelectedImage, DetectionResult> for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn render_result(
    &self,
    input: &SelectedImage,
    result: &DetectionResult,
  ) -> Result<(), Self::Error> {
    println!("{}", self.format_result(input, result));
    Ok(())
  }
}
