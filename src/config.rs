// 该文件是 Toukui （头盔） 项目的一部分。
// src/config.rs - 推理端点配置
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

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

/// 未配置时前端模板中遗留的占位地址，必须拒绝
pub const PLACEHOLDER_SPACE: &str = "your-space-url-here";
pub const DEFAULT_API_NAME: &str = "predict";

const HF_SPACE_HOST_SUFFIX: &str = "hf.space";
const HF_HUB_HOST: &str = "huggingface.co";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
  #[error("未配置推理端点地址")]
  Missing,
  #[error("推理端点地址仍为占位符: {0}")]
  Placeholder(String),
  #[error("无效的推理端点地址 '{0}': {1}")]
  InvalidAddress(String, String),
  #[error("不支持的端点方案: {0}")]
  UnsupportedScheme(String),
}

/// 推理端点配置
#[derive(Debug, Clone)]
pub struct EndpointConfig {
  base: Url,
  api_name: String,
  timeout: Option<Duration>,
}

impl EndpointConfig {
  /// 解析端点地址，支持完整的 http(s) 地址或 `owner/name` 形式的 space 标识
  pub fn resolve(address: Option<&str>) -> Result<Self, ConfigError> {
    let address = address.map(str::trim).unwrap_or_default();
    if address.is_empty() {
      error!("推理端点地址为空");
      return Err(ConfigError::Missing);
    }
    if address == PLACEHOLDER_SPACE {
      error!("推理端点地址仍为占位符，拒绝继续");
      return Err(ConfigError::Placeholder(address.to_string()));
    }

    let base = if address.contains("://") {
      let url = Url::parse(address)
        .map_err(|e| ConfigError::InvalidAddress(address.to_string(), e.to_string()))?;
      match url.scheme() {
        "http" | "https" => space_from_hub_url(&url).unwrap_or(url),
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
      }
    } else {
      space_host_url(address)?
    };

    debug!("推理端点地址: {}", base);

    Ok(Self {
      base: with_trailing_slash(base),
      api_name: DEFAULT_API_NAME.to_string(),
      timeout: None,
    })
  }

  pub fn with_api_name(mut self, api_name: impl Into<String>) -> Self {
    let api_name: String = api_name.into();
    self.api_name = api_name.trim_matches('/').to_string();
    self
  }

  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn base(&self) -> &Url {
    &self.base
  }

  pub fn api_name(&self) -> &str {
    &self.api_name
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout
  }

  /// 基于端点根地址拼接相对路径
  pub fn join(&self, path: &str) -> Result<Url, url::ParseError> {
    self.base.join(path.trim_start_matches('/'))
  }
}

fn with_trailing_slash(mut url: Url) -> Url {
  if !url.path().ends_with('/') {
    let path = format!("{}/", url.path());
    url.set_path(&path);
  }
  url
}

fn valid_space_part(part: &str) -> bool {
  !part.is_empty()
    && part
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

// owner/name -> https://owner-name.hf.space/
fn space_host_url(space: &str) -> Result<Url, ConfigError> {
  let invalid = |reason: &str| ConfigError::InvalidAddress(space.to_string(), reason.to_string());

  let (owner, name) = space
    .split_once('/')
    .ok_or_else(|| invalid("期望 owner/name 形式的 space 标识"))?;
  if !valid_space_part(owner) || !valid_space_part(name) {
    return Err(invalid("space 标识包含非法字符"));
  }

  let subdomain = format!("{}-{}", owner, name)
    .to_lowercase()
    .replace(['_', '.'], "-");
  Url::parse(&format!("https://{}.{}/", subdomain, HF_SPACE_HOST_SUFFIX))
    .map_err(|e| invalid(&e.to_string()))
}

// https://huggingface.co/spaces/owner/name -> https://owner-name.hf.space/
fn space_from_hub_url(url: &Url) -> Option<Url> {
  if url.host_str() != Some(HF_HUB_HOST) {
    return None;
  }
  let mut segments = url.path_segments()?;
  if segments.next()? != "spaces" {
    return None;
  }
  let owner = segments.next()?;
  let name = segments.next()?;
  space_host_url(&format!("{}/{}", owner, name)).ok()
}
