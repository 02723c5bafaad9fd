//! ffmpeg-backed media transformer
//!
//! The style is turned into an [`EditPlan`] first. Optional assets that do not
//! exist on disk drop their step from the plan, so the previous output passes
//! through untouched. Each remaining step is one ffmpeg invocation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::TransformError;
use crate::media::{MediaTransformer, StyleConfig};
use crate::types::{ProcessedMedia, RawMedia};

const STDERR_TAIL: usize = 600;

#[derive(Debug, Clone, PartialEq)]
pub enum EditStep {
    /// Branding text near the bottom edge
    Overlay {
        text: String,
        font_size: u32,
        font_color: String,
        bottom_margin: u32,
    },
    /// Intro and/or outro clips around the main video
    Concat {
        intro: Option<PathBuf>,
        outro: Option<PathBuf>,
        width: u32,
        height: u32,
    },
    /// Looped background track mixed under the original audio
    MixAudio { music: PathBuf, volume: f32 },
}

impl EditStep {
    pub fn name(&self) -> &'static str {
        match self {
            EditStep::Overlay { .. } => "overlay",
            EditStep::Concat { .. } => "concat",
            EditStep::MixAudio { .. } => "mix_audio",
        }
    }

    /// ffmpeg arguments turning `input` into `output`
    pub fn ffmpeg_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = vec!["-hide_banner".to_string(), "-y".to_string()];

        match self {
            EditStep::Overlay {
                text,
                font_size,
                font_color,
                bottom_margin,
            } => {
                let filter = format!(
                    "drawtext=text={}:fontcolor={}:fontsize={}:x=(w-text_w)/2:y=h-{}",
                    escape_drawtext(text),
                    font_color,
                    font_size,
                    bottom_margin
                );
                args.extend(["-i".into(), path_arg(input), "-vf".into(), filter]);
                args.extend(["-c:v", "libx264", "-c:a", "aac"].map(String::from));
            }
            EditStep::Concat {
                intro,
                outro,
                width,
                height,
            } => {
                let inputs: Vec<&Path> = intro
                    .as_deref()
                    .into_iter()
                    .chain(std::iter::once(input))
                    .chain(outro.as_deref())
                    .collect();

                let mut filter = String::new();
                let mut concat_inputs = String::new();
                for (i, path) in inputs.iter().enumerate() {
                    args.extend(["-i".into(), path_arg(path)]);
                    filter.push_str(&format!(
                        "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
                         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1[v{i}];\
                         [{i}:a]aresample=44100[a{i}];",
                        i = i,
                        w = width,
                        h = height
                    ));
                    concat_inputs.push_str(&format!("[v{i}][a{i}]", i = i));
                }
                filter.push_str(&format!(
                    "{}concat=n={}:v=1:a=1[v][a]",
                    concat_inputs,
                    inputs.len()
                ));

                args.extend(["-filter_complex".into(), filter]);
                args.extend(["-map", "[v]", "-map", "[a]", "-c:v", "libx264", "-c:a", "aac"].map(String::from));
            }
            EditStep::MixAudio { music, volume } => {
                args.extend(["-i".into(), path_arg(input)]);
                args.extend(["-stream_loop".into(), "-1".into(), "-i".into(), path_arg(music)]);
                args.extend([
                    "-filter_complex".into(),
                    format!(
                        "[1:a]volume={:.2}[bg];[0:a][bg]amix=inputs=2:duration=first:dropout_transition=0[a]",
                        volume
                    ),
                ]);
                args.extend(
                    ["-map", "0:v", "-map", "[a]", "-c:v", "copy", "-c:a", "aac", "-shortest"]
                        .map(String::from),
                );
            }
        }

        args.push(path_arg(output));
        args
    }
}

/// Steps to run for a style, after dropping the disabled ones
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditPlan {
    steps: Vec<EditStep>,
}

impl EditPlan {
    pub fn from_style(style: &StyleConfig) -> Self {
        let mut steps = Vec::new();

        if !style.branding_text.trim().is_empty() {
            steps.push(EditStep::Overlay {
                text: style.branding_text.clone(),
                font_size: style.font_size,
                font_color: style.font_color.clone(),
                bottom_margin: style.bottom_margin,
            });
        }

        let intro = existing_asset("intro", style.intro.as_deref());
        let outro = existing_asset("outro", style.outro.as_deref());
        if intro.is_some() || outro.is_some() {
            steps.push(EditStep::Concat {
                intro,
                outro,
                width: style.width,
                height: style.height,
            });
        }

        if let Some(music) = existing_asset("music", style.music.as_deref()) {
            steps.push(EditStep::MixAudio {
                music,
                volume: style.music_volume,
            });
        }

        Self { steps }
    }

    pub fn steps(&self) -> &[EditStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn existing_asset(label: &str, path: Option<&Path>) -> Option<PathBuf> {
    let path = path?;
    if path.is_file() {
        Some(path.to_path_buf())
    } else {
        info!(asset = label, path = %path.display(), "Optional asset not found, skipping step");
        None
    }
}

pub struct FfmpegTransformer {
    binary: String,
}

impl FfmpegTransformer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run_step(&self, step: &EditStep, input: &Path, output: &Path) -> Result<(), TransformError> {
        let args = step.ffmpeg_args(input, output);
        debug!(step = step.name(), ?args, "Running ffmpeg");

        let result = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => TransformError::ToolMissing {
                    tool: self.binary.clone(),
                    reason: e.to_string(),
                },
                _ => TransformError::Io(e.to_string()),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail_start = stderr.len().saturating_sub(STDERR_TAIL);
            let tail_start = (tail_start..stderr.len())
                .find(|i| stderr.is_char_boundary(*i))
                .unwrap_or(stderr.len());
            return Err(TransformError::StepFailed {
                step: step.name().to_string(),
                status: result
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: stderr[tail_start..].trim().to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl MediaTransformer for FfmpegTransformer {
    async fn transform(
        &self,
        raw: &RawMedia,
        style: &StyleConfig,
        dest: &Path,
    ) -> Result<ProcessedMedia, TransformError> {
        let plan = EditPlan::from_style(style);
        if plan.is_empty() {
            info!(path = %raw.path.display(), "Nothing to edit, passing media through");
            return Ok(ProcessedMedia::new(raw.path.clone()));
        }

        let last = plan.steps().len() - 1;
        let mut input = raw.path.clone();
        let mut intermediates = Vec::new();
        let mut outcome = Ok(());

        for (i, step) in plan.steps().iter().enumerate() {
            let output = if i == last {
                dest.to_path_buf()
            } else {
                let path = PathBuf::from(format!("{}.{}.mp4", dest.display(), step.name()));
                // Tracked before running so a failed step's partial output is removed too.
                intermediates.push(path.clone());
                path
            };

            if let Err(e) = self.run_step(step, &input, &output).await {
                outcome = Err(e);
                break;
            }
            input = output;
        }

        for path in intermediates {
            tokio::fs::remove_file(&path).await.ok();
        }
        outcome?;

        info!(path = %dest.display(), steps = plan.steps().len(), "Edited media");
        Ok(ProcessedMedia::new(dest))
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Escape text for an unquoted drawtext option value
fn escape_drawtext(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '\'' | ':' | '%' | ',' | ';' | '[' | ']') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
