// 该文件是 Toukui （头盔） 项目的一部分。
// src/normalize.rs - 端点输出归一化
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

use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  endpoint::{PredictResponse, RawOutput},
  reference::{ImageReference, LocalObject, base64_data_uri, is_image_data_uri},
  workflow::DetectionResult,
};

pub const FALLBACK_SUMMARY: &str = "No detections found.";

const ANNOTATED_IMAGE_INDEX: usize = 0;
const DETECTION_METADATA_INDEX: usize = 1;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("无法识别的输出格式: {0}")]
  UnrecognizedOutput(String),
  #[error("端点未返回标注图像")]
  MissingOutput,
  #[error("无法创建本地图像引用: {0}")]
  LocalObjectError(#[from] std::io::Error),
}

/// 标注图像输出可能的形态
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotatedImageOutput {
  DataUri(String),
  Base64(String),
  Blob { mime: String, bytes: Vec<u8> },
  Url(String),
}

impl AnnotatedImageOutput {
  pub fn classify(raw: &RawOutput) -> Result<Self, DecodeError> {
    match raw {
      RawOutput::Json(Value::String(s)) if is_image_data_uri(s) => {
        Ok(AnnotatedImageOutput::DataUri(s.clone()))
      }
      RawOutput::Json(Value::String(s)) => Ok(AnnotatedImageOutput::Base64(s.clone())),
      RawOutput::Blob { mime, bytes } => Ok(AnnotatedImageOutput::Blob {
        mime: mime.clone(),
        bytes: bytes.clone(),
      }),
      RawOutput::Json(Value::Object(map)) => match map.get("url") {
        Some(Value::String(url)) if !url.is_empty() => Ok(AnnotatedImageOutput::Url(url.clone())),
        _ => Err(DecodeError::UnrecognizedOutput(
          "对象缺少 url 字段".to_string(),
        )),
      },
      RawOutput::Json(other) => Err(DecodeError::UnrecognizedOutput(describe(other).to_string())),
    }
  }

  /// 转为可显示的引用；相对地址按 `base` 解析，无法解析时原样保留
  pub fn into_reference(self, base: Option<&Url>) -> Result<ImageReference, DecodeError> {
    Ok(match self {
      AnnotatedImageOutput::DataUri(uri) => ImageReference::DataUri(uri),
      AnnotatedImageOutput::Base64(payload) => ImageReference::DataUri(base64_data_uri(&payload)),
      AnnotatedImageOutput::Blob { mime, bytes } => {
        ImageReference::Local(LocalObject::create(&bytes, &mime)?)
      }
      AnnotatedImageOutput::Url(link) => resolve_link(link, base),
    })
  }
}

fn resolve_link(link: String, base: Option<&Url>) -> ImageReference {
  match Url::parse(&link) {
    Ok(url) => ImageReference::Remote(url),
    Err(url::ParseError::RelativeUrlWithoutBase) => match base.map(|base| base.join(&link)) {
      Some(Ok(url)) => ImageReference::Remote(url),
      _ => ImageReference::Link(link),
    },
    Err(e) => {
      debug!("url 字段不是有效地址 '{}': {}", link, e);
      ImageReference::Link(link)
    }
  }
}

fn describe(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "布尔值",
    Value::Number(_) => "数字",
    Value::String(_) => "字符串",
    Value::Array(_) => "数组",
    Value::Object(_) => "对象",
  }
}

/// 从检测元数据中取出摘要，缺失时使用固定的回退文本
pub fn extract_summary(metadata: Option<&RawOutput>) -> String {
  match metadata {
    Some(RawOutput::Json(Value::Object(map))) => match map.get("summary") {
      Some(Value::String(summary)) if !summary.is_empty() => summary.clone(),
      _ => FALLBACK_SUMMARY.to_string(),
    },
    _ => FALLBACK_SUMMARY.to_string(),
  }
}

/// 将端点原始输出归一化为检测结果
pub fn normalize_response(response: &PredictResponse) -> Result<DetectionResult, DecodeError> {
  let raw = response
    .get(ANNOTATED_IMAGE_INDEX)
    .ok_or(DecodeError::MissingOutput)?;
  let output = AnnotatedImageOutput::classify(raw)?;
  debug!(
    "标注图像输出形态: {}",
    match &output {
      AnnotatedImageOutput::DataUri(_) => "data-uri",
      AnnotatedImageOutput::Base64(_) => "base64",
      AnnotatedImageOutput::Blob { .. } => "blob",
      AnnotatedImageOutput::Url(_) => "url",
    }
  );
  let image = output.into_reference(response.base.as_ref())?;
  let summary = extract_summary(response.get(DETECTION_METADATA_INDEX));

  Ok(DetectionResult { image, summary })
}
