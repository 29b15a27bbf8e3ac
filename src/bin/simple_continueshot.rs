// 该文件是 Toukui （头盔） 项目的一部分。
// src/bin/simple_continueshot.rs - 批量图像检测
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use toukui::{
  FromUrl,
  config::{DEFAULT_API_NAME, EndpointConfig},
  endpoint::GradioEndpoint,
  task::{ContinuousTask, Task},
};

/// Toukui 批量图像检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理端点地址（http(s) 地址或 owner/name 形式的 space 标识）
  #[arg(long, env = "SPACE_URL", value_name = "SPACE")]
  pub space: Option<String>,
  /// 端点 API 名称
  #[arg(long, default_value = DEFAULT_API_NAME, value_name = "NAME")]
  pub api_name: String,
  /// HTTP 超时（秒）
  #[arg(long, value_name = "SECONDS")]
  pub timeout: Option<u64>,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "console://")]
  pub output: Url,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = EndpointConfig::resolve(args.space.as_deref())?
    .with_api_name(args.api_name)
    .with_timeout(args.timeout.map(Duration::from_secs));

  let input = toukui::input::InputWrapper::from_url(&args.input)?;
  let endpoint = GradioEndpoint::new(config)?;
  let output = toukui::output::OutputWrapper::from_url(&args.output)?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .run_task(input, endpoint, output)?;

  Ok(())
}
