//! Segment Planner: splits a scenario's time range into N segments balanced
//! by rendering complexity.

mod complexity;

pub use complexity::{animation_weight, complexity_curve};

use crate::model::{Cue, Scenario, Segment, SegmentStatus};

const MIN_SEGMENT_SECS: f64 = 5.0;
const MAX_SEGMENT_SECS: f64 = 60.0;
/// How far either side of the target accumulator to search for a local
/// minimum of `c(t)` (an ideal silence-based split point).
const SPLIT_SEARCH_RADIUS_SECS: usize = 3;

/// Plans `worker_count` segments covering `[0, duration)`, balanced by the
/// per-second complexity curve built from `scenario.cues`. `fps` is the
/// job's target frame rate, used only to estimate each segment's frame count
/// for progress reporting.
///
/// Edge cases: no cues yields an even split; a zero duration yields one
/// degenerate `[0, 0)` segment; a duration shorter than the minimum segment
/// length collapses to a single segment regardless of `worker_count`.
pub fn plan_segments(
    scenario: &Scenario,
    duration: f64,
    worker_count: usize,
    fps: f64,
) -> Vec<Segment> {
    let worker_count = worker_count.max(1);

    if duration <= 0.0 {
        return vec![make_segment(0, 0, 0.0, 0.0, &scenario.cues, 0.0, fps)];
    }

    if duration < MIN_SEGMENT_SECS {
        return vec![make_segment(0, 0, 0.0, duration, &scenario.cues, 0.0, fps)];
    }

    if scenario.cues.is_empty() {
        return even_split(scenario, duration, worker_count, fps);
    }

    let curve = complexity_curve(&scenario.cues, duration);
    let total: f64 = curve.iter().sum();
    if total <= 0.0 {
        return even_split(scenario, duration, worker_count, fps);
    }

    let mut bounds = weighted_split_bounds(&curve, duration, worker_count, total);
    while bounds.len() < worker_count + 1 {
        bisect_longest(&mut bounds);
    }

    segments_from_bounds(scenario, &curve, &bounds, fps)
}

fn even_split(scenario: &Scenario, duration: f64, worker_count: usize, fps: f64) -> Vec<Segment> {
    let mut bounds = Vec::with_capacity(worker_count + 1);
    for i in 0..=worker_count {
        bounds.push(duration * (i as f64) / (worker_count as f64));
    }
    let curve = vec![0.0_f64; duration.ceil() as usize];
    segments_from_bounds(scenario, &curve, &bounds, fps)
}

/// Walk the complexity curve accumulating weight; whenever the running sum
/// reaches `total / worker_count`, look for a nearby local minimum (ideally
/// a silent second) to place the boundary, honoring min/max segment length.
fn weighted_split_bounds(
    curve: &[f64],
    duration: f64,
    worker_count: usize,
    total: f64,
) -> Vec<f64> {
    let target = total / worker_count as f64;
    let mut bounds = vec![0.0_f64];
    let mut acc = 0.0_f64;
    let mut last_bound_secs = 0usize;

    for t in 0..curve.len() {
        acc += curve[t];
        if acc < target {
            continue;
        }
        let candidate = find_local_min_near(curve, t, SPLIT_SEARCH_RADIUS_SECS);
        let since_last = (candidate as f64) - (last_bound_secs as f64);
        if since_last < MIN_SEGMENT_SECS {
            continue;
        }
        if since_last > MAX_SEGMENT_SECS {
            // Force a split at the max-length boundary instead of drifting further.
            let forced = last_bound_secs + MAX_SEGMENT_SECS as usize;
            bounds.push((forced as f64).min(duration));
            last_bound_secs = forced;
            acc = curve[forced.min(curve.len().saturating_sub(1))..=t].iter().sum();
            continue;
        }
        bounds.push(candidate as f64);
        last_bound_secs = candidate;
        acc = 0.0;
        if bounds.len() == worker_count {
            break;
        }
    }
    bounds.push(duration);
    bounds.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    bounds
}

fn find_local_min_near(curve: &[f64], at: usize, radius: usize) -> usize {
    let lo = at.saturating_sub(radius);
    let hi = (at + radius).min(curve.len().saturating_sub(1));
    let mut best = at;
    let mut best_val = curve.get(at).copied().unwrap_or(0.0);
    for t in lo..=hi {
        if curve[t] < best_val {
            best_val = curve[t];
            best = t;
        }
    }
    best
}

fn bisect_longest(bounds: &mut Vec<f64>) {
    let mut longest_idx = 0;
    let mut longest_len = 0.0_f64;
    for i in 0..bounds.len() - 1 {
        let len = bounds[i + 1] - bounds[i];
        if len > longest_len {
            longest_len = len;
            longest_idx = i;
        }
    }
    let mid = (bounds[longest_idx] + bounds[longest_idx + 1]) / 2.0;
    bounds.insert(longest_idx + 1, mid);
}

fn segments_from_bounds(
    scenario: &Scenario,
    curve: &[f64],
    bounds: &[f64],
    fps: f64,
) -> Vec<Segment> {
    let mut out = Vec::with_capacity(bounds.len().saturating_sub(1));
    for i in 0..bounds.len() - 1 {
        let start = bounds[i];
        let end = bounds[i + 1];
        let lo = start.floor() as usize;
        let hi = (end.ceil() as usize).min(curve.len());
        let complexity: f64 = curve.get(lo..hi).map(|s| s.iter().sum()).unwrap_or(0.0);
        out.push(make_segment(i, i, start, end, &scenario.cues, complexity, fps));
    }
    out
}

fn make_segment(
    index: usize,
    worker_id: usize,
    start: f64,
    end: f64,
    all_cues: &[Cue],
    complexity: f64,
    fps: f64,
) -> Segment {
    let cues: Vec<Cue> = all_cues
        .iter()
        .filter(|c| c.end > start && c.start < end)
        .cloned()
        .collect();
    let estimated_frames = ((end - start).max(0.0) * fps).round() as u64;
    Segment {
        index,
        worker_id,
        start,
        end,
        cues,
        estimated_frames,
        complexity,
        status: SegmentStatus::Pending,
        output_path: None,
        file_size: 0,
        frames_processed: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Cue;

    fn cue(start: f64, end: f64, text: &str) -> Cue {
        Cue {
            start,
            end,
            text: text.to_string(),
            style: None,
            animation: None,
            emotion: None,
        }
    }

    #[test]
    fn no_cues_even_split() {
        let scenario = Scenario { cues: vec![] };
        let segs = plan_segments(&scenario, 12.0, 4, 30.0);
        assert_eq!(segs.len(), 4);
        assert_eq!(segs[0].start, 0.0);
        assert_eq!(segs[3].end, 12.0);
        for w in segs.windows(2) {
            assert_eq!(w[0].end, w[1].start);
        }
    }

    #[test]
    fn zero_duration_degenerate_segment() {
        let scenario = Scenario { cues: vec![] };
        let segs = plan_segments(&scenario, 0.0, 4, 30.0);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].start, 0.0);
        assert_eq!(segs[0].end, 0.0);
    }

    #[test]
    fn short_job_collapses_to_one_segment() {
        let scenario = Scenario {
            cues: vec![cue(0.0, 3.0, "hi")],
        };
        let segs = plan_segments(&scenario, 3.0, 4, 30.0);
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn segments_are_contiguous_and_cover_duration() {
        let scenario = Scenario {
            cues: vec![cue(0.0, 2.0, "hello there"), cue(5.0, 8.0, "second cue")],
        };
        let segs = plan_segments(&scenario, 20.0, 4, 30.0);
        assert_eq!(segs.first().unwrap().start, 0.0);
        assert_eq!(segs.last().unwrap().end, 20.0);
        for w in segs.windows(2) {
            assert_eq!(w[0].end, w[1].start);
        }
    }

    #[test]
    fn long_cue_spanning_entire_video_still_splits_into_n() {
        let scenario = Scenario {
            cues: vec![cue(0.0, 20.0, "spans everything")],
        };
        let segs = plan_segments(&scenario, 20.0, 4, 30.0);
        assert_eq!(segs.len(), 4);
        for s in &segs {
            assert_eq!(s.cues.len(), 1);
        }
    }

    #[test]
    fn each_segment_duration_within_bounds_for_even_split() {
        let scenario = Scenario { cues: vec![] };
        let segs = plan_segments(&scenario, 40.0, 4, 30.0);
        for s in &segs {
            let d = s.duration();
            assert!(d >= MIN_SEGMENT_SECS - 1e-6);
            assert!(d <= MAX_SEGMENT_SECS + 1e-6);
        }
    }
}
