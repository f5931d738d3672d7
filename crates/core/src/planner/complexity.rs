//! Per-second rendering complexity model used to balance segments.

use crate::model::Cue;

/// Weight contributed by an animation family. Anything not named here
/// (including a missing `animation` field) is treated as neutral.
pub fn animation_weight(animation_type: Option<&str>) -> f64 {
    match animation_type {
        Some("elastic") | Some("bounce") => 1.5,
        Some("fade") | Some("slide") => 0.5,
        _ => 0.0,
    }
}

fn is_cjk_font(style_font: Option<&str>) -> bool {
    style_font.map(|f| f.contains("CJK")).unwrap_or(false)
}

fn cue_base_weight(cue: &Cue) -> f64 {
    let mut w = 1.0 + 0.01 * cue.text.chars().count() as f64;
    if is_cjk_font(cue.style.as_ref().and_then(|s| s.font_family.as_deref())) {
        w += 0.5;
    }
    w += animation_weight(cue.animation.as_ref().map(|a| a.kind.as_str()));
    if let Some(emotion) = &cue.emotion {
        if !emotion.eq_ignore_ascii_case("neutral") {
            w += 0.3;
        }
    }
    w
}

/// Builds `c(t)` for integer seconds `t` in `[0, ceil(duration))`.
///
/// A cue is "active" at second `t` when `cue.start <= t < cue.end`. When
/// `k >= 2` cues overlap at a second, their summed weight is scaled by
/// `1 + 0.5 * (k - 1)`.
pub fn complexity_curve(cues: &[Cue], duration: f64) -> Vec<f64> {
    let seconds = duration.ceil().max(0.0) as usize;
    let mut curve = vec![0.0_f64; seconds];
    for t in 0..seconds {
        let ts = t as f64;
        let active: Vec<&Cue> = cues
            .iter()
            .filter(|c| c.start <= ts && ts < c.end)
            .collect();
        if active.is_empty() {
            continue;
        }
        let base_sum: f64 = active.iter().map(|c| cue_base_weight(c)).sum();
        let k = active.len();
        let scale = 1.0 + 0.5 * (k as f64 - 1.0);
        curve[t] = base_sum * scale;
    }
    curve
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cue, CueAnimation, CueStyle};

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
    fn unknown_animation_is_neutral() {
        assert_eq!(animation_weight(Some("bounce-in")), 0.0);
        assert_eq!(animation_weight(None), 0.0);
    }

    #[test]
    fn known_animation_families_weighted() {
        assert_eq!(animation_weight(Some("elastic")), 1.5);
        assert_eq!(animation_weight(Some("bounce")), 1.5);
        assert_eq!(animation_weight(Some("fade")), 0.5);
        assert_eq!(animation_weight(Some("slide")), 0.5);
    }

    #[test]
    fn overlap_multiplies_combined_weight() {
        let cues = vec![cue(0.0, 2.0, "a"), cue(0.0, 2.0, "b")];
        let curve = complexity_curve(&cues, 2.0);
        let single = cue_base_weight(&cues[0]) + cue_base_weight(&cues[1]);
        assert!((curve[0] - single * 1.5).abs() < 1e-9);
    }

    #[test]
    fn cjk_font_adds_weight() {
        let mut c = cue(0.0, 1.0, "hi");
        c.style = Some(CueStyle {
            font_family: Some("Noto Sans CJK KR".to_string()),
            font_size: None,
            color: None,
        });
        let plain = cue(0.0, 1.0, "hi");
        assert!(cue_base_weight(&c) > cue_base_weight(&plain));
    }

    #[test]
    fn cjk_substring_match_is_case_sensitive_like_the_source_check() {
        assert!(is_cjk_font(Some("Source Han Sans CJK")));
        assert!(!is_cjk_font(Some("noto sans cjk")));
        assert!(!is_cjk_font(Some("Arial")));
    }

    #[test]
    fn non_neutral_emotion_adds_weight() {
        let mut c = cue(0.0, 1.0, "hi");
        c.emotion = Some("angry".to_string());
        let plain = cue(0.0, 1.0, "hi");
        assert!(cue_base_weight(&c) > cue_base_weight(&plain));
    }

    #[test]
    fn animation_field_feeds_curve() {
        let mut c = cue(0.0, 1.0, "hi");
        c.animation = Some(CueAnimation {
            kind: "elastic".to_string(),
        });
        let curve = complexity_curve(&[c], 1.0);
        assert!((curve[0] - (1.0 + 0.02 + 1.5)).abs() < 1e-9);
    }

    #[test]
    fn no_cues_curve_is_all_zero() {
        let curve = complexity_curve(&[], 5.0);
        assert_eq!(curve, vec![0.0; 5]);
    }
}
