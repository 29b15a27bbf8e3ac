// 该文件是 Toukui （头盔） 项目的一部分。
// src/workflow.rs - 检测会话状态机
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
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  endpoint::{InferenceEndpoint, PredictResponse, TransportError},
  normalize::{DecodeError, normalize_response},
  reference::ImageReference,
  selection::{PreviewHandle, SelectedImage, UPLOAD_LABEL_PLACEHOLDER},
};

pub const NO_IMAGE_MESSAGE: &str = "Please upload an image first.";
pub const PREDICTION_FAILED_MESSAGE: &str =
  "Prediction failed. Try again or try with a smaller image.";
pub const STATUS_RUNNING: &str = "Running the model...Please wait...";
pub const STATUS_NO_RESULT: &str = "No result yet, Run the model";

/// 请求状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
  #[default]
  Idle,
  InFlight,
  Succeeded,
  Failed,
}

/// 检测结果
#[derive(Debug)]
pub struct DetectionResult {
  pub image: ImageReference,
  pub summary: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
  #[error("未选择图像")]
  NoImageSelected,
  #[error("已有请求正在进行")]
  RequestInFlight,
  #[error("请求已过期，结果被丢弃")]
  StaleRequest,
}

#[derive(Error, Debug)]
pub enum WorkflowError {
  #[error("校验错误: {0}")]
  Validation(#[from] ValidationError),
  #[error("传输错误: {0}")]
  Transport(#[from] TransportError),
  #[error("解码错误: {0}")]
  Decode(#[from] DecodeError),
}

impl WorkflowError {
  /// 面向用户的提示，不暴露底层细节
  pub fn user_message(&self) -> &'static str {
    match self {
      WorkflowError::Validation(ValidationError::NoImageSelected) => NO_IMAGE_MESSAGE,
      WorkflowError::Validation(ValidationError::RequestInFlight) => STATUS_RUNNING,
      WorkflowError::Validation(ValidationError::StaleRequest) => STATUS_NO_RESULT,
      WorkflowError::Transport(_) | WorkflowError::Decode(_) => PREDICTION_FAILED_MESSAGE,
    }
  }
}

/// 已开始但尚未完成的请求
#[derive(Debug)]
pub struct PendingRequest {
  ticket: u64,
  image: SelectedImage,
}

impl PendingRequest {
  pub fn image(&self) -> &SelectedImage {
    &self.image
  }

  pub fn dispatch<E: InferenceEndpoint + ?Sized>(
    &self,
    endpoint: &E,
  ) -> Result<PredictResponse, TransportError> {
    info!("发送图像 {} 到推理端点", self.image.filename());
    endpoint.predict(&self.image)
  }
}

/// 单个用户会话的检测工作流
///
/// 同一时刻至多一个请求在进行；检测结果与错误信息互斥。
#[derive(Debug, Default)]
pub struct DetectionSession {
  selected: Option<SelectedImage>,
  preview: Option<PreviewHandle>,
  state: RequestState,
  result: Option<DetectionResult>,
  error: Option<String>,
  ticket: u64,
}

impl DetectionSession {
  pub fn new() -> Self {
    Self::default()
  }

  /// 选择图像；空选择不做任何事
  pub fn select_image(&mut self, image: Option<SelectedImage>) {
    let Some(image) = image else {
      debug!("空选择，忽略");
      return;
    };

    // 旧预览在此处释放
    self.preview = match PreviewHandle::create(&image) {
      Ok(preview) => Some(preview),
      Err(e) => {
        warn!("无法创建预览: {}", e);
        None
      }
    };
    info!("已选择图像: {} ({})", image.filename(), image.mime());
    self.selected = Some(image);
    self.result = None;
    self.error = None;
    self.state = RequestState::Idle;
    self.ticket += 1;
  }

  /// 开始一次提交：校验前置条件并进入 InFlight
  pub fn begin_submission(&mut self) -> Result<PendingRequest, ValidationError> {
    if self.state == RequestState::InFlight {
      debug!("请求进行中，忽略重复提交");
      return Err(ValidationError::RequestInFlight);
    }
    let Some(image) = self.selected.clone() else {
      warn!("未选择图像");
      self.error = Some(NO_IMAGE_MESSAGE.to_string());
      return Err(ValidationError::NoImageSelected);
    };

    self.state = RequestState::InFlight;
    self.error = None;
    self.result = None;
    self.ticket += 1;

    Ok(PendingRequest {
      ticket: self.ticket,
      image,
    })
  }

  /// 应用请求结果
  pub fn complete_submission(
    &mut self,
    pending: PendingRequest,
    outcome: Result<PredictResponse, TransportError>,
  ) -> Result<&DetectionResult, WorkflowError> {
    if pending.ticket != self.ticket || self.state != RequestState::InFlight {
      warn!("会话已变更，丢弃过期的请求结果");
      return Err(ValidationError::StaleRequest.into());
    }

    let normalized = outcome
      .map_err(WorkflowError::from)
      .and_then(|response| normalize_response(&response).map_err(WorkflowError::from));

    match normalized {
      Ok(result) => {
        info!("检测完成: {}", result.summary);
        self.state = RequestState::Succeeded;
        self.error = None;
        let result: &DetectionResult = self.result.insert(result);
        Ok(result)
      }
      Err(e) => {
        error!("Prediction error: {}", e);
        self.state = RequestState::Failed;
        self.result = None;
        self.error = Some(PREDICTION_FAILED_MESSAGE.to_string());
        Err(e)
      }
    }
  }

  /// 提交所选图像并等待端点返回
  pub fn submit_detection<E: InferenceEndpoint + ?Sized>(
    &mut self,
    endpoint: &E,
  ) -> Result<&DetectionResult, WorkflowError> {
    let pending = self.begin_submission()?;
    let outcome = pending.dispatch(endpoint);
    self.complete_submission(pending, outcome)
  }

  /// 回到初始状态
  pub fn reset(&mut self) {
    debug!("重置会话");
    self.selected = None;
    self.preview = None;
    self.result = None;
    self.error = None;
    self.state = RequestState::Idle;
    self.ticket += 1;
  }

  pub fn state(&self) -> RequestState {
    self.state
  }

  pub fn selected_image(&self) -> Option<&SelectedImage> {
    self.selected.as_ref()
  }

  pub fn preview_url(&self) -> Option<&Url> {
    self.preview.as_ref().map(PreviewHandle::url)
  }

  pub fn result(&self) -> Option<&DetectionResult> {
    self.result.as_ref()
  }

  pub fn error_message(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn upload_label(&self) -> String {
    self
      .selected
      .as_ref()
      .map(SelectedImage::label)
      .unwrap_or_else(|| UPLOAD_LABEL_PLACEHOLDER.to_string())
  }

  /// 结果区域的占位提示，有结果时为 None
  pub fn status_line(&self) -> Option<&'static str> {
    match (self.state, &self.result) {
      (RequestState::InFlight, _) => Some(STATUS_RUNNING),
      (_, None) => Some(STATUS_NO_RESULT),
      (_, Some(_)) => None,
    }
  }

  pub fn summary_line(&self) -> Option<String> {
    self
      .result
      .as_ref()
      .map(|result| format!("Detected {}", result.summary))
  }

  pub fn can_submit(&self) -> bool {
    self.state != RequestState::InFlight
  }

  /// 请求结束（成功或失败）后才可重置
  pub fn can_reset(&self) -> bool {
    matches!(self.state, RequestState::Succeeded | RequestState::Failed)
  }
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;

  use serde_json::{Value, json};

  use super::*;
  use crate::{endpoint::RawOutput, normalize::FALLBACK_SUMMARY};

  enum Script {
    Json(Vec<Value>),
    Blob,
    Fail,
  }

  struct ScriptedEndpoint {
    script: Script,
    calls: Cell<usize>,
  }

  impl ScriptedEndpoint {
    fn new(script: Script) -> Self {
      Self {
        script,
        calls: Cell::new(0),
      }
    }
  }

  impl InferenceEndpoint for ScriptedEndpoint {
    fn predict(&self, _image: &SelectedImage) -> Result<PredictResponse, TransportError> {
      self.calls.set(self.calls.get() + 1);
      match &self.script {
        Script::Json(values) => Ok(PredictResponse::from_json(values.clone())),
        Script::Blob => Ok(PredictResponse::new(vec![RawOutput::Blob {
          mime: "image/png".to_string(),
          bytes: vec![0x89, b'P', b'N', b'G'],
        }])),
        Script::Fail => Err(TransportError::Endpoint("connection refused".to_string())),
      }
    }
  }

  fn bike() -> SelectedImage {
    SelectedImage::new("bike.jpg", "image/jpeg", vec![0xffu8, 0xd8, 0xff, 0xe0])
  }

  fn assert_idle_defaults(session: &DetectionSession) {
    assert_eq!(session.state(), RequestState::Idle);
    assert!(session.selected_image().is_none());
    assert!(session.preview_url().is_none());
    assert!(session.result().is_none());
    assert!(session.error_message().is_none());
    assert_eq!(session.upload_label(), UPLOAD_LABEL_PLACEHOLDER);
  }

  #[test]
  fn bike_scenario_succeeds() {
    let endpoint = ScriptedEndpoint::new(Script::Json(vec![
      json!("data:image/png;base64,AAA="),
      json!({"summary": "2 riders, 1 without helmet"}),
    ]));
    let mut session = DetectionSession::new();
    session.select_image(Some(bike()));
    assert!(session.preview_url().is_some());

    let result = session.submit_detection(&endpoint).unwrap();
    assert_eq!(result.image.as_str(), "data:image/png;base64,AAA=");
    assert_eq!(result.summary, "2 riders, 1 without helmet");

    assert_eq!(session.state(), RequestState::Succeeded);
    assert!(session.error_message().is_none());
    assert_eq!(
      session.summary_line().as_deref(),
      Some("Detected 2 riders, 1 without helmet")
    );
    assert!(session.status_line().is_none());
    assert!(session.can_reset());
  }

  #[test]
  fn bare_base64_uses_fallback_summary() {
    let endpoint = ScriptedEndpoint::new(Script::Json(vec![json!("AAAA"), Value::Null]));
    let mut session = DetectionSession::new();
    session.select_image(Some(bike()));

    let result = session.submit_detection(&endpoint).unwrap();
    assert_eq!(result.image.as_str(), "data:image/png;base64,AAAA");
    assert_eq!(result.summary, FALLBACK_SUMMARY);
  }

  #[test]
  fn blob_output_resolves_locally() {
    let endpoint = ScriptedEndpoint::new(Script::Blob);
    let mut session = DetectionSession::new();
    session.select_image(Some(bike()));

    let result = session.submit_detection(&endpoint).unwrap();
    assert!(result.image.as_str().starts_with("file://"));
    assert_eq!(result.image.fetch().unwrap().bytes, vec![0x89, b'P', b'N', b'G']);
  }

  #[test]
  fn transport_failure_sets_generic_message() {
    let endpoint = ScriptedEndpoint::new(Script::Fail);
    let mut session = DetectionSession::new();
    session.select_image(Some(bike()));

    let err = session.submit_detection(&endpoint).unwrap_err();
    assert!(matches!(err, WorkflowError::Transport(_)));
    assert_eq!(err.user_message(), PREDICTION_FAILED_MESSAGE);
    assert_eq!(session.state(), RequestState::Failed);
    assert_eq!(session.error_message(), Some(PREDICTION_FAILED_MESSAGE));
    assert!(session.result().is_none());
    assert!(session.can_reset());

    session.reset();
    assert_idle_defaults(&session);
    assert!(!session.can_reset());
  }

  #[test]
  fn unrecognized_output_fails_with_decode_error() {
    let endpoint = ScriptedEndpoint::new(Script::Json(vec![json!(17), json!({"summary": "x"})]));
    let mut session = DetectionSession::new();
    session.select_image(Some(bike()));

    let err = session.submit_detection(&endpoint).unwrap_err();
    assert!(matches!(err, WorkflowError::Decode(_)));
    assert_eq!(session.state(), RequestState::Failed);
    assert_eq!(session.error_message(), Some(PREDICTION_FAILED_MESSAGE));
  }

  #[test]
  fn submit_without_selection_keeps_state() {
    let endpoint = ScriptedEndpoint::new(Script::Json(vec![json!("AAAA")]));
    let mut session = DetectionSession::new();

    let err = session.submit_detection(&endpoint).unwrap_err();
    assert!(matches!(
      err,
      WorkflowError::Validation(ValidationError::NoImageSelected)
    ));
    assert_eq!(session.state(), RequestState::Idle);
    assert_eq!(session.error_message(), Some(NO_IMAGE_MESSAGE));
    assert_eq!(err.to_string(), "校验错误: 未选择图像");
    assert_eq!(ValidationError::NoImageSelected.to_string(), "未选择图像");
    assert_eq!(endpoint.calls.get(), 0);
    assert!(!session.can_reset());

    session.select_image(Some(bike()));
    assert!(!session.can_reset());
  }

  #[test]
  fn second_submit_while_in_flight_is_not_dispatched() {
    let endpoint = ScriptedEndpoint::new(Script::Json(vec![json!("AAAA")]));
    let mut session = DetectionSession::new();
    session.select_image(Some(bike()));

    let pending = session.begin_submission().unwrap();
    assert_eq!(session.state(), RequestState::InFlight);
    assert!(!session.can_submit());
    assert!(!session.can_reset());
    assert_eq!(session.status_line(), Some(STATUS_RUNNING));

    let err = session.submit_detection(&endpoint).unwrap_err();
    assert!(matches!(
      err,
      WorkflowError::Validation(ValidationError::RequestInFlight)
    ));
    assert_eq!(session.state(), RequestState::InFlight);
    assert!(session.error_message().is_none());
    assert_eq!(endpoint.calls.get(), 0);

    let outcome = pending.dispatch(&endpoint);
    session.complete_submission(pending, outcome).unwrap();
    assert_eq!(endpoint.calls.get(), 1);
    assert_eq!(session.state(), RequestState::Succeeded);
  }

  #[test]
  fn result_after_reset_is_discarded() {
    let endpoint = ScriptedEndpoint::new(Script::Json(vec![json!("AAAA")]));
    let mut session = DetectionSession::new();
    session.select_image(Some(bike()));

    let pending = session.begin_submission().unwrap();
    let outcome = pending.dispatch(&endpoint);
    session.reset();

    let err = session.complete_submission(pending, outcome).unwrap_err();
    assert!(matches!(
      err,
      WorkflowError::Validation(ValidationError::StaleRequest)
    ));
    assert_idle_defaults(&session);
  }

  #[test]
  fn reset_after_success_and_failure_returns_to_idle() {
    let ok = ScriptedEndpoint::new(Script::Json(vec![json!("AAAA")]));
    let mut session = DetectionSession::new();
    session.select_image(Some(bike()));
    session.submit_detection(&ok).unwrap();
    let preview_path = session.preview_url().and_then(|u| u.to_file_path().ok()).unwrap();
    assert!(preview_path.exists());
    session.reset();
    assert_idle_defaults(&session);
    assert!(!preview_path.exists());

    let fail = ScriptedEndpoint::new(Script::Fail);
    session.select_image(Some(bike()));
    let _ = session.submit_detection(&fail);
    session.reset();
    assert_idle_defaults(&session);
  }

  #[test]
  fn selecting_new_image_clears_previous_outcome() {
    let fail = ScriptedEndpoint::new(Script::Fail);
    let mut session = DetectionSession::new();
    session.select_image(Some(bike()));
    let _ = session.submit_detection(&fail);
    assert_eq!(session.state(), RequestState::Failed);

    session.select_image(Some(SelectedImage::new(
      "an-extremely-long-name.png",
      "image/png",
      vec![1u8],
    )));
    assert_eq!(session.state(), RequestState::Idle);
    assert!(session.error_message().is_none());
    assert!(session.result().is_none());
    assert_eq!(session.upload_label(), "an-extremely-lon...");
    assert_eq!(session.status_line(), Some(STATUS_NO_RESULT));
  }

  #[test]
  fn empty_selection_is_noop() {
    let ok = ScriptedEndpoint::new(Script::Json(vec![json!("AAAA")]));
    let mut session = DetectionSession::new();
    session.select_image(Some(bike()));
    session.submit_detection(&ok).unwrap();

    session.select_image(None);
    assert_eq!(session.state(), RequestState::Succeeded);
    assert!(session.result().is_some());
    assert_eq!(session.selected_image(), Some(&bike()));
  }
}
