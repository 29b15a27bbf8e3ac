// 该文件是 Toukui （头盔） 项目的一部分。
// src/endpoint/gradio.rs - Gradio 队列接口
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

use reqwest::blocking::{
  Client,
  multipart::{Form, Part},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
  config::EndpointConfig,
  endpoint::{InferenceEndpoint, PredictResponse, TransportError},
  selection::SelectedImage,
};

const UPLOAD_PATH: &str = "gradio_api/upload";
const CALL_PATH: &str = "gradio_api/call";
const FILE_DATA_TYPE: &str = "gradio.FileData";

#[derive(Debug, Serialize)]
struct FileMeta {
  #[serde(rename = "_type")]
  kind: &'static str,
}

#[derive(Debug, Serialize)]
struct FileData<'a> {
  path: &'a str,
  orig_name: &'a str,
  mime_type: &'a str,
  meta: FileMeta,
}

#[derive(Debug, Serialize)]
struct CallRequest<'a> {
  data: [FileData<'a>; 1],
}

#[derive(Debug, Deserialize)]
struct CallResponse {
  event_id: String,
}

/// 通过 Gradio 队列接口访问的推理端点
pub struct GradioEndpoint {
  config: EndpointConfig,
  client: Client,
}

impl GradioEndpoint {
  pub fn new(config: EndpointConfig) -> Result<Self, TransportError> {
    let mut builder = Client::builder();
    if let Some(timeout) = config.timeout() {
      builder = builder.timeout(timeout);
    }
    let client = builder.build()?;
    info!("推理端点: {} (/{})", config.base(), config.api_name());
    Ok(Self { config, client })
  }

  pub fn config(&self) -> &EndpointConfig {
    &self.config
  }

  fn upload(&self, image: &SelectedImage) -> Result<String, TransportError> {
    let url = self.config.join(UPLOAD_PATH)?;
    debug!("上传图像 {} ({} 字节) 到 {}", image.filename(), image.bytes().len(), url);

    let part = Part::bytes(image.bytes().to_vec())
      .file_name(image.filename().to_string())
      .mime_str(image.mime())?;
    let form = Form::new().part("files", part);

    let paths: Vec<String> = self
      .client
      .post(url)
      .multipart(form)
      .send()?
      .error_for_status()?
      .json()?;

    paths
      .into_iter()
      .next()
      .ok_or_else(|| TransportError::MalformedResponse("上传接口未返回文件路径".to_string()))
  }

  fn call(&self, path: &str, image: &SelectedImage) -> Result<String, TransportError> {
    let url = self
      .config
      .join(&format!("{}/{}", CALL_PATH, self.config.api_name()))?;
    let request = CallRequest {
      data: [FileData {
        path,
        orig_name: image.filename(),
        mime_type: image.mime(),
        meta: FileMeta {
          kind: FILE_DATA_TYPE,
        },
      }],
    };

    let response: CallResponse = self
      .client
      .post(url)
      .json(&request)
      .send()?
      .error_for_status()?
      .json()?;
    debug!("推理任务已排队: {}", response.event_id);
    Ok(response.event_id)
  }

  fn fetch_result(&self, event_id: &str) -> Result<Vec<Value>, TransportError> {
    let url = self.config.join(&format!(
      "{}/{}/{}",
      CALL_PATH,
      self.config.api_name(),
      event_id
    ))?;
    let body = self.client.get(url).send()?.error_for_status()?.text()?;
    parse_event_stream(&body)
  }
}

impl InferenceEndpoint for GradioEndpoint {
  fn predict(&self, image: &SelectedImage) -> Result<PredictResponse, TransportError> {
    let path = self.upload(image)?;
    let event_id = self.call(&path, image)?;
    let outputs = self.fetch_result(&event_id)?;
    Ok(PredictResponse::from_json(outputs).with_base(self.config.base().clone()))
  }
}

/// 解析 Gradio 结果事件流，取 `complete` 事件的数据
fn parse_event_stream(body: &str) -> Result<Vec<Value>, TransportError> {
  let mut event = "";
  for line in body.lines() {
    let line = line.trim_end_matches('\r');
    if let Some(name) = line.strip_prefix("event:") {
      event = name.trim();
    } else if let Some(data) = line.strip_prefix("data:") {
      let data = data.trim();
      match event {
        "complete" => {
          return serde_json::from_str(data)
            .map_err(|e| TransportError::MalformedResponse(format!("无法解析结果数据: {}", e)));
        }
        "error" => {
          let message = match serde_json::from_str::<Value>(data) {
            Ok(Value::String(message)) => message,
            Ok(Value::Null) => "未知错误".to_string(),
            Ok(other) => other.to_string(),
            Err(_) if data.is_empty() => "未知错误".to_string(),
            Err(_) => data.to_string(),
          };
          warn!("端点报告错误: {}", message);
          return Err(TransportError::Endpoint(message));
        }
        _ => {}
      }
    }
  }

  Err(TransportError::MalformedResponse(
    "事件流中没有 complete 事件".to_string(),
  ))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn picks_complete_event() {
    let body = "event: generating\ndata: null\n\nevent: heartbeat\ndata: null\n\nevent: complete\ndata: [\"AAAA\", {\"summary\": \"1 rider\"}]\n\n";
    let values = parse_event_stream(body).unwrap();
    assert_eq!(values, vec![json!("AAAA"), json!({"summary": "1 rider"})]);
  }

  #[test]
  fn handles_crlf_lines() {
    let body = "event: complete\r\ndata: [null]\r\n\r\n";
    assert_eq!(parse_event_stream(body).unwrap(), vec![Value::Null]);
  }

  #[test]
  fn error_event_is_endpoint_error() {
    let body = "event: error\ndata: \"GPU quota exceeded\"\n\n";
    match parse_event_stream(body) {
      Err(TransportError::Endpoint(message)) => assert_eq!(message, "GPU quota exceeded"),
      other => panic!("unexpected: {:?}", other),
    }

    let body = "event: error\ndata: null\n\n";
    match parse_event_stream(body) {
      Err(TransportError::Endpoint(message)) => assert_eq!(message, "未知错误"),
      other => panic!("unexpected: {:?}", other),
    }
  }

  #[test]
  fn missing_complete_is_malformed() {
    assert!(matches!(
      parse_event_stream("event: heartbeat\ndata: null\n"),
      Err(TransportError::MalformedResponse(_))
    ));
    assert!(matches!(
      parse_event_stream("event: complete\ndata: {not json}\n"),
      Err(TransportError::MalformedResponse(_))
    ));
  }

  #[test]
  fn file_data_payload_shape() {
    let request = CallRequest {
      data: [FileData {
        path: "/tmp/gradio/abc/bike.jpg",
        orig_name: "bike.jpg",
        mime_type: "image/jpeg",
        meta: FileMeta {
          kind: FILE_DATA_TYPE,
        },
      }],
    };
    assert_eq!(
      serde_json::to_value(&request).unwrap(),
      json!({"data": [{
        "path": "/tmp/gradio/abc/bike.jpg",
        "orig_name": "bike.jpg",
        "mime_type": "image/jpeg",
        "meta": {"_type": "gradio.FileData"}
      }]})
    );
  }
}
