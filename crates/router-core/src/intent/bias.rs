//! Session-continuity bias for ambiguous rule scores.

use tracing::debug;

use super::types::{top_domain, DomainScores, Signal};

/// Lowest top score eligible for the bias.
pub const BIAS_LOW: f64 = 0.60;
/// Highest top score eligible for the bias.
pub const BIAS_HIGH: f64 = 0.89;
/// Amount added to an eligible score.
pub const BIAS_BOOST: f64 = 0.10;
/// A biased score never exceeds this.
pub const BIAS_CAP: f64 = 0.90;

/// Nudge the top domain when it continues the session's selected domain.
///
/// Only the top domain (lexicographic tie-break) is considered, and only
/// when its score lies in [`BIAS_LOW`, `BIAS_HIGH`]. Idempotent in the
/// sense that repeated application never pushes past [`BIAS_CAP`].
pub fn apply_session_bias(mut scores: DomainScores, selected: Option<&str>) -> DomainScores {
    let Some(selected) = selected else {
        return scores;
    };
    let Some(top) = top_domain(&scores).map(|r| r.domain.clone()) else {
        return scores;
    };
    if top != selected {
        return scores;
    }

    if let Some(record) = scores.get_mut(&top) {
        if (BIAS_LOW..=BIAS_HIGH).contains(&record.score) {
            let before = record.score;
            record.score = (record.score + BIAS_BOOST).min(BIAS_CAP);
            record.push_signal(Signal::SessionBias);
            debug!(domain = %top, before, after = record.score, "Applied session bias");
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::types::DomainScore;

    fn scores(entries: &[(&str, f64)]) -> DomainScores {
        entries
            .iter()
            .map(|(d, s)| {
                let mut record = DomainScore::empty(*d);
                record.score = *s;
                (d.to_string(), record)
            })
            .collect()
    }

    #[test]
    fn test_bias_applies_inside_band() {
        let out = apply_session_bias(
            scores(&[("real_estate", 0.65), ("business", 0.5)]),
            Some("real_estate"),
        );
        assert!((out["real_estate"].score - 0.75).abs() < 1e-9);
        assert_eq!(out["real_estate"].signals, vec![Signal::SessionBias]);
        assert_eq!(out["business"].score, 0.5);
    }

    #[test]
    fn test_bias_caps_at_ninety() {
        let out = apply_session_bias(scores(&[("food", 0.85)]), Some("food"));
        assert_eq!(out["food"].score, BIAS_CAP);
    }

    #[test]
    fn test_bias_twice_stays_capped() {
        let once = apply_session_bias(scores(&[("food", 0.7)]), Some("food"));
        let twice = apply_session_bias(once, Some("food"));
        assert!(twice["food"].score <= BIAS_CAP);
        assert_eq!(twice["food"].signals, vec![Signal::SessionBias]);
    }

    #[test]
    fn test_bias_skips_outside_band() {
        for score in [0.59, 0.9, 0.95, 0.0] {
            let out = apply_session_bias(scores(&[("food", score)]), Some("food"));
            assert_eq!(out["food"].score, score);
            assert!(out["food"].signals.is_empty());
        }
    }

    #[test]
    fn test_bias_requires_selected_top() {
        let input = scores(&[("food", 0.7), ("business", 0.65)]);
        let out = apply_session_bias(input.clone(), Some("business"));
        assert_eq!(out, input);
        let out = apply_session_bias(input.clone(), None);
        assert_eq!(out, input);
    }

    #[test]
    fn test_bias_uses_tie_break() {
        // business wins the tie, so a selected real_estate gets nothing.
        let input = scores(&[("business", 0.7), ("real_estate", 0.7)]);
        let out = apply_session_bias(input.clone(), Some("real_estate"));
        assert_eq!(out, input);
        let out = apply_session_bias(input, Some("business"));
        assert!(out["business"].has(Signal::SessionBias));
    }
}
