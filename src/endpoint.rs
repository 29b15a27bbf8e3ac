// 该文件是 Toukui （头盔） 项目的一部分。
// src/endpoint.rs - 远程推理端点
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
use url::Url;

use crate::selection::SelectedImage;

/// 远程推理端点，只暴露一个 `predict` 操作
pub trait InferenceEndpoint {
  fn predict(&self, image: &SelectedImage) -> Result<PredictResponse, TransportError>;
}

impl<T: InferenceEndpoint + ?Sized> InferenceEndpoint for &T {
  fn predict(&self, image: &SelectedImage) -> Result<PredictResponse, TransportError> {
    (**self).predict(image)
  }
}

impl<T: InferenceEndpoint + ?Sized> InferenceEndpoint for Box<T> {
  fn predict(&self, image: &SelectedImage) -> Result<PredictResponse, TransportError> {
    (**self).predict(image)
  }
}

/// 端点原始输出中的一项
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
  Json(Value),
  Blob { mime: String, bytes: Vec<u8> },
}

/// 端点原始输出：`[annotated_image, detection_metadata]`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PredictResponse {
  pub data: Vec<RawOutput>,
  /// 解析输出中相对地址所用的端点根地址
  pub base: Option<Url>,
}

impl PredictResponse {
  pub fn new(data: Vec<RawOutput>) -> Self {
    Self { data, base: None }
  }

  pub fn from_json(values: Vec<Value>) -> Self {
    Self::new(values.into_iter().map(RawOutput::Json).collect())
  }

  pub fn with_base(mut self, base: Url) -> Self {
    self.base = Some(base);
    self
  }

  pub fn get(&self, index: usize) -> Option<&RawOutput> {
    self.data.get(index)
  }
}

#[derive(Error, Debug)]
pub enum TransportError {
  #[error("无效的端点地址: {0}")]
  InvalidAddress(#[from] url::ParseError),
  #[error("HTTP 错误: {0}")]
  HttpError(#[from] reqwest::Error),
  #[error("端点返回错误: {0}")]
  Endpoint(String),
  #[error("端点响应格式错误: {0}")]
  MalformedResponse(String),
}

mod gradio;
pub use self::gradio::GradioEndpoint;
