// 该文件是 Toukui （头盔） 项目的一部分。
// src/task.rs - 检测任务
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
  io::{BufRead, Write},
  path::Path,
  sync::mpsc,
  time::Instant,
};

use tracing::{error, info, warn};

use crate::{
  endpoint::InferenceEndpoint,
  input::load_selected_image,
  output::Render,
  selection::SelectedImage,
  workflow::{DetectionResult, DetectionSession, RequestState},
};

pub trait Task<I, E, O>: Sized {
  type Error;
  fn run_task(self, input: I, endpoint: E, output: O) -> Result<(), Self::Error>;
}

/// 提交会话中的图像，成功时交给输出渲染；返回是否成功
fn submit_and_render<E, O, RE>(
  session: &mut DetectionSession,
  endpoint: &E,
  output: &O,
) -> Result<bool, RE>
where
  E: InferenceEndpoint,
  O: Render<SelectedImage, DetectionResult, Error = RE>,
{
  let now = Instant::now();
  if session.submit_detection(endpoint).is_err() {
    warn!("检测失败，耗时: {:.2?}", now.elapsed());
    return Ok(false);
  }
  info!("检测完成，耗时: {:.2?}", now.elapsed());

  if let (Some(image), Some(result)) = (session.selected_image(), session.result()) {
    output.render_result(image, result)?;
  }
  Ok(true)
}

pub struct OneShotTask;

impl<
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = SelectedImage>,
  E: InferenceEndpoint,
  O: Render<SelectedImage, DetectionResult, Error = RE>,
> Task<I, E, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, endpoint: E, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    let mut session = DetectionSession::new();
    session.select_image(Some(image));

    if !submit_and_render(&mut session, &endpoint, &output)? {
      let message = session.error_message().unwrap_or_default().to_string();
      return Err(anyhow::anyhow!(message));
    }

    info!("任务完成");
    Ok(())
  }
}

/// 依次处理输入中的每张图像，单张失败不影响后续
#[derive(Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  handle_interrupt: bool,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      frame_number: None,
      handle_interrupt: true,
    }
  }
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn without_interrupt_handler(mut self) -> Self {
    self.handle_interrupt = false;
    self
  }
}

impl<
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = SelectedImage>,
  E: InferenceEndpoint,
  O: Render<SelectedImage, DetectionResult, Error = RE>,
> Task<I, E, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, endpoint: E, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = mpsc::channel();

    if self.handle_interrupt {
      // 只在两张图像之间退出，不打断进行中的请求
      ctrlc::set_handler(move || {
        info!("收到中断信号，当前图像处理完成后退出...");
        let _ = tx.send(());
      })?;
    }

    let mut session = DetectionSession::new();
    let (mut succeeded, mut failed) = (0usize, 0usize);
    for (index, image) in input.enumerate() {
      info!("处理第 {} 张图像: {}", index + 1, image.filename());
      session.select_image(Some(image));
      if submit_and_render(&mut session, &endpoint, &output)? {
        succeeded += 1;
      } else {
        failed += 1;
      }

      if self.frame_number.map(|n| index + 1 >= n).unwrap_or(false) {
        info!("达到指定图像数 {}, 退出任务循环", index + 1);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成: 成功 {} 张，失败 {} 张", succeeded, failed);
    Ok(())
  }
}

/// 行命令驱动的交互会话
pub struct InteractiveTask<R, W> {
  reader: R,
  writer: W,
}

impl<R: BufRead, W: Write> InteractiveTask<R, W> {
  pub fn new(reader: R, writer: W) -> Self {
    Self { reader, writer }
  }

  fn show(&mut self, session: &DetectionSession) -> std::io::Result<()> {
    writeln!(self.writer, "[{}] {}", state_name(session.state()), session.upload_label())?;
    if let Some(url) = session.preview_url() {
      writeln!(self.writer, "Input Image: {}", url)?;
    }
    if let Some(result) = session.result() {
      writeln!(self.writer, "Detection Results: {}", result.image)?;
    } else if session.selected_image().is_some()
      && let Some(status) = session.status_line()
    {
      writeln!(self.writer, "{}", status)?;
    }
    if let Some(summary) = session.summary_line() {
      writeln!(self.writer, "{}", summary)?;
    }
    if let Some(message) = session.error_message() {
      writeln!(self.writer, "{}", message)?;
    }
    Ok(())
  }
}

fn state_name(state: RequestState) -> &'static str {
  match state {
    RequestState::Idle => "idle",
    RequestState::InFlight => "running",
    RequestState::Succeeded => "done",
    RequestState::Failed => "failed",
  }
}

const INTERACTIVE_HELP: &str =
  "commands: select <path> | run | reset | status | help | quit";

impl<
  RE: std::error::Error + Sync + Send + 'static,
  R: BufRead,
  W: Write,
  I: Iterator<Item = SelectedImage>,
  E: InferenceEndpoint,
  O: Render<SelectedImage, DetectionResult, Error = RE>,
> Task<I, E, O> for InteractiveTask<R, W>
{
  type Error = anyhow::Error;

  fn run_task(mut self, mut input: I, endpoint: E, output: O) -> Result<(), Self::Error> {
    info!("开始交互会话...");
    let mut session = DetectionSession::new();
    session.select_image(input.next());
    writeln!(self.writer, "{}", INTERACTIVE_HELP)?;
    self.show(&session)?;

    let mut line = String::new();
    loop {
      write!(self.writer, "> ")?;
      self.writer.flush()?;
      line.clear();
      if self.reader.read_line(&mut line)? == 0 {
        break;
      }

      let (command, argument) = match line.trim().split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (line.trim(), ""),
      };
      match command {
        "" => continue,
        "select" => {
          if argument.is_empty() {
            continue;
          }
          match load_selected_image(Path::new(argument)) {
            Ok(Some(image)) => session.select_image(Some(image)),
            Ok(None) => writeln!(self.writer, "JPG, PNG accepted")?,
            Err(e) => {
              error!("读取 {} 失败: {}", argument, e);
              writeln!(self.writer, "cannot read {}", argument)?;
              continue;
            }
          }
        }
        "run" => {
          if !session.can_submit() {
            continue;
          }
          writeln!(self.writer, "Detecting...")?;
          submit_and_render(&mut session, &endpoint, &output)?;
        }
        "reset" => {
          if !session.can_reset() {
            writeln!(self.writer, "nothing to reset")?;
            continue;
          }
          session.reset();
        }
        "status" => {}
        "help" => {
          writeln!(self.writer, "{}", INTERACTIVE_HELP)?;
          continue;
        }
        "quit" | "exit" => break,
        other => {
          writeln!(self.writer, "unknown command: {}", other)?;
          continue;
        }
      }
      self.show(&session)?;
    }

    info!("交互会话结束");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::{
    cell::{Cell, RefCell},
    io::Cursor,
  };

  use serde_json::json;

  use super::*;
  use crate::endpoint::{PredictResponse, TransportError};

  struct CountingEndpoint {
    fail_on: Option<String>,
    calls: Cell<usize>,
  }

  impl CountingEndpoint {
    fn new(fail_on: Option<&str>) -> Self {
      Self {
        fail_on: fail_on.map(str::to_string),
        calls: Cell::new(0),
      }
    }
  }

  impl InferenceEndpoint for CountingEndpoint {
    fn predict(&self, image: &SelectedImage) -> Result<PredictResponse, TransportError> {
      self.calls.set(self.calls.get() + 1);
      if self.fail_on.as_deref() == Some(image.filename()) {
        return Err(TransportError::Endpoint("boom".to_string()));
      }
      Ok(PredictResponse::from_json(vec![
        json!("AAAA"),
        json!({"summary": format!("1 rider in {}", image.filename())}),
      ]))
    }
  }

  #[derive(Default)]
  struct Recorder {
    seen: RefCell<Vec<(String, String)>>,
  }

  impl Render<SelectedImage, DetectionResult> for &Recorder {
    type Error = std::io::Error;

    fn render_result(
      &self,
      input: &SelectedImage,
      result: &DetectionResult,
    ) -> Result<(), Self::Error> {
      self
        .seen
        .borrow_mut()
        .push((input.filename().to_string(), result.summary.clone()));
      Ok(())
    }
  }

  fn image(name: &str) -> SelectedImage {
    SelectedImage::new(name, "image/jpeg", vec![1u8, 2, 3])
  }

  #[test]
  fn one_shot_renders_first_image() {
    let endpoint = CountingEndpoint::new(None);
    let recorder = Recorder::default();
    OneShotTask
      .run_task(vec![image("bike.jpg"), image("other.jpg")].into_iter(), &endpoint, &recorder)
      .unwrap();
    assert_eq!(endpoint.calls.get(), 1);
    assert_eq!(
      recorder.seen.borrow().as_slice(),
      &[("bike.jpg".to_string(), "1 rider in bike.jpg".to_string())]
    );
  }

  #[test]
  fn one_shot_reports_generic_failure() {
    let endpoint = CountingEndpoint::new(Some("bike.jpg"));
    let recorder = Recorder::default();
    let err = OneShotTask
      .run_task(vec![image("bike.jpg")].into_iter(), &endpoint, &recorder)
      .unwrap_err();
    assert_eq!(
      err.to_string(),
      crate::workflow::PREDICTION_FAILED_MESSAGE
    );
    assert!(recorder.seen.borrow().is_empty());
  }

  #[test]
  fn one_shot_without_input_fails() {
    let endpoint = CountingEndpoint::new(None);
    let recorder = Recorder::default();
    assert!(
      OneShotTask
        .run_task(std::iter::empty(), &endpoint, &recorder)
        .is_err()
    );
    assert_eq!(endpoint.calls.get(), 0);
  }

  #[test]
  fn continuous_skips_failures_and_honours_limit() {
    let endpoint = CountingEndpoint::new(Some("b.jpg"));
    let recorder = Recorder::default();
    let images = vec![image("a.jpg"), image("b.jpg"), image("c.jpg"), image("d.jpg")];
    ContinuousTask::default()
      .without_interrupt_handler()
      .with_frame_number(Some(3))
      .run_task(images.into_iter(), &endpoint, &recorder)
      .unwrap();

    assert_eq!(endpoint.calls.get(), 3);
    let seen = recorder.seen.borrow();
    let names: Vec<_> = seen.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["a.jpg", "c.jpg"]);
  }

  #[test]
  fn interactive_session_runs_commands() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bike.jpg");
    std::fs::write(&path, [1u8, 2, 3]).unwrap();

    let script = format!(
      "reset\nrun\nselect {}\nrun\nrun\nreset\nselect notes.txt\nbogus\nquit\nrun\n",
      path.display()
    );
    let mut transcript = Vec::new();
    let endpoint = CountingEndpoint::new(None);
    let recorder = Recorder::default();
    InteractiveTask::new(Cursor::new(script), &mut transcript)
      .run_task(std::iter::empty(), &endpoint, &recorder)
      .unwrap();

    let transcript = String::from_utf8(transcript).unwrap();
    assert!(transcript.contains(crate::workflow::NO_IMAGE_MESSAGE));
    assert!(transcript.contains("Detected 1 rider in bike.jpg"));
    assert!(transcript.contains("Detection Results: data:image/png;base64,AAAA"));
    assert!(transcript.contains("JPG, PNG accepted"));
    assert!(transcript.contains("unknown command: bogus"));
    // 空闲时的 reset 被拒绝，成功后的 reset 回到空闲
    assert_eq!(transcript.matches("nothing to reset").count(), 1);
    assert!(transcript.contains("[idle] Click to upload an image"));
    // 两次 run 都会发出请求，quit 之后的命令不再执行
    assert_eq!(endpoint.calls.get(), 2);
    assert_eq!(recorder.seen.borrow().len(), 2);
  }
}
