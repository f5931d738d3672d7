//! Streaming Encoder: wraps an ffmpeg subprocess fed PNG frames over stdin,
//! producing one segment's output file without staging frames to disk.

use crate::error::RenderError;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

const STDERR_RING_CAPACITY: usize = 64;

/// Encode settings derived from a job's `RenderOptions`.
#[derive(Debug, Clone, Copy)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Caller-facing 0-100 quality; mapped to CRF (CPU) or CQ (GPU).
    pub quality: u8,
}

impl EncodeSettings {
    fn crf(&self) -> u8 {
        // Higher `quality` means lower CRF (less compression artifacting).
        let q = self.quality.min(100) as f64;
        (51.0 - (q / 100.0) * 51.0).round().clamp(0.0, 51.0) as u8
    }
}

fn gpu_encoder_available(ffmpeg_path: &Path) -> bool {
    std::process::Command::new(ffmpeg_path)
        .args(["-hide_banner", "-encoders"])
        .output()
        .map(|out| {
            String::from_utf8_lossy(&out.stdout).contains("h264_nvenc")
        })
        .unwrap_or(false)
}

fn build_args(output_path: &Path, settings: &EncodeSettings, use_gpu: bool) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-f".into(),
        "image2pipe".into(),
        "-vcodec".into(),
        "png".into(),
        "-framerate".into(),
        settings.fps.to_string(),
        "-i".into(),
        "-".into(),
    ];

    if use_gpu {
        args.extend([
            "-c:v".into(),
            "h264_nvenc".into(),
            "-preset".into(),
            "p4".into(),
            "-rc".into(),
            "vbr".into(),
            "-cq".into(),
            settings.crf().to_string(),
            "-b:v".into(),
            "0".into(),
        ]);
    } else {
        args.extend([
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "faster".into(),
            "-crf".into(),
            settings.crf().to_string(),
            "-tune".into(),
            "zerolatency".into(),
        ]);
    }

    args.extend([
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-vf".into(),
        format!("scale={}:{}:flags=lanczos", settings.width, settings.height),
        "-movflags".into(),
        "+faststart".into(),
        "-f".into(),
        "mp4".into(),
        output_path.to_string_lossy().into_owned(),
    ]);

    args
}

/// One running ffmpeg subprocess, started against a specific output path.
pub struct StreamingEncoder {
    child: Child,
    output_path: PathBuf,
    stderr_tail: VecDeque<String>,
}

impl StreamingEncoder {
    /// Start ffmpeg for `output_path`, preferring GPU encoding when
    /// `use_gpu` is true and `h264_nvenc` is listed by the binary.
    pub async fn start(
        ffmpeg_path: &Path,
        output_path: &Path,
        settings: EncodeSettings,
        use_gpu: bool,
    ) -> Result<Self, RenderError> {
        let use_gpu = use_gpu && gpu_encoder_available(ffmpeg_path);
        let args = build_args(output_path, &settings, use_gpu);

        let child = Command::new(ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RenderError::EncodeFailure {
                exit_status: None,
                stderr_tail: format!("failed to spawn ffmpeg: {e}"),
            })?;

        Ok(Self {
            child,
            output_path: output_path.to_path_buf(),
            stderr_tail: VecDeque::with_capacity(STDERR_RING_CAPACITY),
        })
    }

    /// Write one PNG-encoded frame to ffmpeg's stdin.
    pub async fn write_frame(&mut self, frame_png: &[u8]) -> Result<(), RenderError> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| RenderError::EncodeFailure {
                exit_status: None,
                stderr_tail: "ffmpeg stdin unavailable".into(),
            })?;
        stdin.write_all(frame_png).await.map_err(|e| RenderError::EncodeFailure {
            exit_status: None,
            stderr_tail: format!("frame write failed: {e}"),
        })?;
        Ok(())
    }

    /// Close stdin and wait for ffmpeg to exit, draining stderr into a
    /// bounded ring buffer for error reporting.
    pub async fn finalize(mut self) -> Result<PathBuf, RenderError> {
        drop(self.child.stdin.take());

        if let Some(stderr) = self.child.stderr.take() {
            use tokio::io::{AsyncBufReadExt, BufReader};
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if self.stderr_tail.len() == STDERR_RING_CAPACITY {
                    self.stderr_tail.pop_front();
                }
                self.stderr_tail.push_back(line);
            }
        }

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| RenderError::EncodeFailure {
                exit_status: None,
                stderr_tail: format!("ffmpeg wait failed: {e}"),
            })?;

        if !status.success() {
            let tail: Vec<String> = self.stderr_tail.into_iter().collect();
            return Err(RenderError::EncodeFailure {
                exit_status: status.code(),
                stderr_tail: tail.join("\n"),
            });
        }

        Ok(self.output_path)
    }

    /// Kill the subprocess immediately (cancellation path).
    pub async fn abort(mut self) {
        let _ = self.child.kill().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EncodeSettings {
        EncodeSettings {
            width: 1920,
            height: 1080,
            fps: 30.0,
            quality: 80,
        }
    }

    #[test]
    fn crf_maps_quality_inversely() {
        let high_q = EncodeSettings { quality: 100, ..settings() };
        let low_q = EncodeSettings { quality: 0, ..settings() };
        assert!(high_q.crf() < low_q.crf());
    }

    #[test]
    fn crf_spans_the_full_0_to_51_range() {
        assert_eq!(EncodeSettings { quality: 100, ..settings() }.crf(), 0);
        assert_eq!(EncodeSettings { quality: 0, ..settings() }.crf(), 51);
        assert_eq!(EncodeSettings { quality: 50, ..settings() }.crf(), 26);
    }

    #[test]
    fn build_args_selects_gpu_encoder_when_requested() {
        let args = build_args(Path::new("/tmp/out.mp4"), &settings(), true);
        assert!(args.iter().any(|a| a == "h264_nvenc"));
    }

    #[test]
    fn build_args_selects_cpu_encoder_by_default() {
        let args = build_args(Path::new("/tmp/out.mp4"), &settings(), false);
        assert!(args.iter().any(|a| a == "libx264"));
    }

    #[test]
    fn build_args_scales_to_requested_resolution() {
        let args = build_args(Path::new("/tmp/out.mp4"), &settings(), false);
        assert!(args.iter().any(|a| a.contains("scale=1920:1080")));
    }
}
