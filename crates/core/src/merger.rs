//! Segment Merger: lossless concatenation of per-worker segment MP4s into
//! one final MP4, via ffmpeg's concat demuxer in stream-copy mode.

use crate::error::RenderError;
use crate::model::{Segment, SegmentStatus};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Result of a successful (possibly partial) merge.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub output_path: PathBuf,
    pub file_size: u64,
    pub segments_merged: usize,
    pub total_frames: u64,
    pub duration: f64,
    pub partial: bool,
}

/// Below this fraction of failed segments, a partial merge may be attempted
/// instead of failing the whole job.
const PARTIAL_MERGE_FAILURE_CEILING: f64 = 0.25;

/// Write the ffmpeg concat-demuxer manifest: one `file '<absolute-path>'`
/// line per segment, in index order.
fn write_concat_manifest(manifest_path: &Path, segments: &[&Segment]) -> Result<(), RenderError> {
    let mut body = String::new();
    for segment in segments {
        let output_path = segment
            .output_path
            .as_ref()
            .ok_or_else(|| RenderError::MergeFailure(format!("segment {} has no output file", segment.index)))?;
        if !output_path.exists() {
            return Err(RenderError::MergeFailure(format!(
                "segment file not found: {}",
                output_path.display()
            )));
        }
        let absolute = output_path
            .canonicalize()
            .map_err(|e| RenderError::MergeFailure(format!("resolving {}: {e}", output_path.display())))?;
        body.push_str(&format!("file '{}'\n", absolute.display()));
    }
    std::fs::write(manifest_path, body)
        .map_err(|e| RenderError::MergeFailure(format!("writing concat manifest: {e}")))
}

async fn run_concat(ffmpeg_path: &Path, manifest_path: &Path, output_path: &Path) -> Result<(), RenderError> {
    let output = Command::new(ffmpeg_path)
        .args([
            "-y",
            "-f",
            "concat",
            "-safe",
            "0",
            "-i",
        ])
        .arg(manifest_path)
        .args(["-c", "copy", "-movflags", "+faststart"])
        .arg(output_path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| RenderError::MergeFailure(format!("failed to spawn ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RenderError::MergeFailure(format!(
            "ffmpeg concat failed (exit {:?}): {}",
            output.status.code(),
            stderr.lines().rev().take(20).collect::<Vec<_>>().join("\n")
        )));
    }
    Ok(())
}

/// Merge `segments` (assumed already sorted by index) into `output_path`.
/// Fails unless every segment is completed with an existing output file,
/// unless `allow_partial` is set and the failure rate is under the ceiling.
pub async fn merge_segments(
    ffmpeg_path: &Path,
    segments: &[Segment],
    manifest_path: &Path,
    output_path: &Path,
    allow_partial: bool,
) -> Result<MergeResult, RenderError> {
    let total = segments.len();
    let completed: Vec<&Segment> = segments
        .iter()
        .filter(|s| s.status == SegmentStatus::Completed && s.output_path.is_some())
        .collect();
    let failed = total - completed.len();

    let partial = if failed == 0 {
        false
    } else if allow_partial && total > 0 && (failed as f64 / total as f64) < PARTIAL_MERGE_FAILURE_CEILING {
        true
    } else {
        return Err(RenderError::MergeFailure(format!(
            "{failed}/{total} segments failed, merge aborted"
        )));
    };

    if completed.is_empty() {
        return Err(RenderError::MergeFailure("no successful segments to merge".into()));
    }

    let mut ordered = completed;
    ordered.sort_by_key(|s| s.index);

    write_concat_manifest(manifest_path, &ordered)?;
    let merge_outcome = run_concat(ffmpeg_path, manifest_path, output_path).await;
    let _ = std::fs::remove_file(manifest_path);
    merge_outcome?;

    let file_size = std::fs::metadata(output_path)
        .map(|m| m.len())
        .unwrap_or(0);
    let total_frames = ordered.iter().map(|s| s.frames_processed).sum();
    let duration = ordered
        .iter()
        .map(|s| s.end)
        .fold(0.0_f64, f64::max);

    Ok(MergeResult {
        output_path: output_path.to_path_buf(),
        file_size,
        segments_merged: ordered.len(),
        total_frames,
        duration,
        partial,
    })
}

/// Best-effort removal of segment files after a successful merge; logs
/// failures rather than propagating them.
pub fn cleanup_segment_files(segments: &[Segment]) {
    for segment in segments {
        if let Some(path) = &segment.output_path {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "failed to delete segment file");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Segment;

    fn segment(index: usize, status: SegmentStatus, output_path: Option<PathBuf>) -> Segment {
        Segment {
            index,
            worker_id: index,
            start: index as f64 * 3.0,
            end: (index as f64 + 1.0) * 3.0,
            cues: vec![],
            estimated_frames: 90,
            complexity: 1.0,
            status,
            output_path,
            file_size: 0,
            frames_processed: 90,
        }
    }

    #[test]
    fn manifest_rejects_missing_segment_file() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("concat.txt");
        let segments = vec![segment(
            0,
            SegmentStatus::Completed,
            Some(dir.path().join("missing.mp4")),
        )];
        let refs: Vec<&Segment> = segments.iter().collect();
        let err = write_concat_manifest(&manifest, &refs).unwrap_err();
        assert!(matches!(err, RenderError::MergeFailure(_)));
    }

    #[test]
    fn manifest_writes_one_quoted_line_per_segment() {
        let dir = tempfile::tempdir().unwrap();
        let seg_file = dir.path().join("segment_0.mp4");
        std::fs::write(&seg_file, b"fake").unwrap();
        let manifest = dir.path().join("concat.txt");
        let segments = vec![segment(0, SegmentStatus::Completed, Some(seg_file))];
        let refs: Vec<&Segment> = segments.iter().collect();
        write_concat_manifest(&manifest, &refs).unwrap();
        let body = std::fs::read_to_string(&manifest).unwrap();
        assert!(body.starts_with("file '"));
        assert_eq!(body.lines().count(), 1);
    }

    #[tokio::test]
    async fn merge_fails_outright_when_failure_rate_exceeds_ceiling_and_partial_disallowed() {
        let dir = tempfile::tempdir().unwrap();
        let seg_file = dir.path().join("segment_0.mp4");
        std::fs::write(&seg_file, b"fake").unwrap();
        let segments = vec![
            segment(0, SegmentStatus::Completed, Some(seg_file)),
            segment(1, SegmentStatus::Failed, None),
        ];
        let err = merge_segments(
            Path::new("ffmpeg"),
            &segments,
            &dir.path().join("concat.txt"),
            &dir.path().join("final.mp4"),
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RenderError::MergeFailure(_)));
    }

    #[tokio::test]
    async fn merge_fails_when_no_segments_completed() {
        let dir = tempfile::tempdir().unwrap();
        let segments = vec![segment(0, SegmentStatus::Failed, None)];
        let err = merge_segments(
            Path::new("ffmpeg"),
            &segments,
            &dir.path().join("concat.txt"),
            &dir.path().join("final.mp4"),
            true,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RenderError::MergeFailure(_)));
    }
}
