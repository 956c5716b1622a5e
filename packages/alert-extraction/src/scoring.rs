//! Confidence scoring for extracted hits and whole-message parses.
//!
//! Pure functions: a hit record in, a 0..=100 score out. The hit score
//! gates on the must-have fields (title, company, raw location), then
//! applies structure bonuses and sanity penalties. The message score
//! aggregates hit scores against the parser's expected hit-count range.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::hit::{normalize, JobHit};

static CTA_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(view|apply|details|see|open)\b").unwrap());

static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$[\d,]+").unwrap());

/// Score one extracted hit, 0..=100.
///
/// A hit missing all three must-have fields scores exactly 0.
pub fn score_hit(hit: &JobHit) -> u8 {
    let title = hit.title.as_deref().unwrap_or("").trim();
    let company = hit.company.as_deref().unwrap_or("").trim();
    let location_raw = hit.location_raw.as_deref().unwrap_or("").trim();

    let missing_must = [title, company, location_raw]
        .iter()
        .filter(|f| f.is_empty())
        .count();

    let mut score: i32 = match missing_must {
        3 => return 0,
        2 => 20,
        1 => 45,
        _ => 70,
    };

    if hit.state.is_some() {
        score += 8;
    }
    if hit.city.is_some() {
        score += 6;
    }

    // Salary: the raw line is the strongest signal, then parsed numbers,
    // then the period.
    if hit.salary_raw.as_deref().map_or(false, |s| !s.trim().is_empty()) {
        score += 10;
    }
    if hit.salary_min.is_some() {
        score += 3;
    }
    if hit.salary_max.is_some() && hit.salary_max != hit.salary_min {
        score += 2;
    }
    if hit.salary_period.is_some() {
        score += 2;
    }

    // Debug lines as a weak sanity signal.
    if !hit.debug_lines.is_empty() {
        let unique: HashSet<String> = hit
            .debug_lines
            .iter()
            .map(|l| normalize(l))
            .filter(|l| !l.is_empty())
            .collect();
        let unique_count = unique.len();
        let total = hit.debug_lines.len();
        let dup_ratio = 1.0 - (unique_count as f64 / total as f64);

        if (3..=7).contains(&unique_count) {
            score += 3;
        } else if unique_count < 3 || unique_count > 12 {
            score -= 5;
        }
        if dup_ratio > 0.5 {
            score -= 2;
        }
    }

    if title.chars().count() < 4 {
        score -= 25;
    }
    if CTA_TITLE_RE.is_match(title) {
        score -= 15;
    }
    if !location_raw.is_empty() && MONEY_RE.is_match(location_raw) {
        score -= 15;
    }
    if hit.debug_lines.len() <= 3 || hit.debug_lines.len() >= 10 {
        score -= 10;
    }

    score.clamp(0, 100) as u8
}

/// Aggregate confidence for a whole message parse, 0..=100.
///
/// Zero hits scores a flat 10: the parser matched the sender but found
/// nothing, which is suspicious rather than definitively wrong.
pub fn score_message(hit_confidences: &[u8], hits_expected: Option<(usize, usize)>) -> u8 {
    let n = hit_confidences.len();
    if n == 0 {
        return 10;
    }

    let avg = hit_confidences.iter().map(|&c| c as f64).sum::<f64>() / n as f64;
    let frac_good = hit_confidences.iter().filter(|&&c| c >= 80).count() as f64 / n as f64;
    let frac_bad = hit_confidences.iter().filter(|&&c| c < 50).count() as f64 / n as f64;

    let mut score = avg + 10.0 * frac_good - 15.0 * frac_bad;

    if let Some((lo, hi)) = hits_expected {
        if (lo..=hi).contains(&n) {
            score += 5.0;
        }

        // Soft penalty when far outside the expected range.
        let ok_low = (lo / 3).max(1);
        let ok_high = (hi as f64 * 1.5) as usize;
        if n < ok_low {
            score -= 10.0;
        } else if n > ok_high {
            score -= 5.0;
        }
    }
    if n < 3 {
        score -= 10.0;
    }

    score.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hit::SalaryPeriod;
    use proptest::prelude::*;

    fn full_hit() -> JobHit {
        JobHit {
            tracking_url: "https://email.s.seek.com.au/uni/ss/c/a".into(),
            title: Some("Data Engineer".into()),
            company: Some("Acme Analytics".into()),
            suburb: Some("Parramatta".into()),
            city: Some("Sydney".into()),
            state: Some("NSW".into()),
            location_raw: Some("Parramatta, Sydney NSW".into()),
            salary_min: Some(90000.0),
            salary_max: Some(110000.0),
            salary_period: Some(SalaryPeriod::Year),
            salary_raw: Some("$90,000 - $110,000".into()),
            debug_lines: vec![
                "Data Engineer".into(),
                "Acme Analytics".into(),
                "Parramatta, Sydney NSW".into(),
                "$90,000 - $110,000".into(),
                "Great culture".into(),
            ],
            fingerprint: None,
            hit_confidence: 0,
        }
    }

    #[test]
    fn test_all_must_haves_missing_scores_zero() {
        let hit = JobHit::new("https://example.com/t");
        assert_eq!(score_hit(&hit), 0);
    }

    #[test]
    fn test_full_hit_scores_high() {
        // base 70 + state 8 + city 6 + salary 10+3+2+2 + unique lines 3 = 104,
        // clamped to 100
        assert_eq!(score_hit(&full_hit()), 100);
    }

    #[test]
    fn test_cta_title_penalized() {
        let mut hit = full_hit();
        hit.title = Some("View all jobs".into());
        let clean = score_hit(&full_hit());
        assert!(score_hit(&hit) < clean);
    }

    #[test]
    fn test_short_title_penalized() {
        let mut hit = full_hit();
        hit.title = Some("DBA".into());
        assert!(score_hit(&hit) <= score_hit(&full_hit()) - 25 + 4);
    }

    #[test]
    fn test_money_in_location_penalized() {
        let mut hit = full_hit();
        hit.location_raw = Some("Sydney NSW $120,000".into());
        assert!(score_hit(&hit) < score_hit(&full_hit()));
    }

    #[test]
    fn test_message_score_empty_is_ten() {
        assert_eq!(score_message(&[], Some((12, 20))), 10);
        assert_eq!(score_message(&[], None), 10);
    }

    #[test]
    fn test_message_score_in_expected_range() {
        let confidences = vec![85u8; 15];
        // avg 85 + frac_good 10 + in-range 5 = 100
        assert_eq!(score_message(&confidences, Some((12, 20))), 100);
    }

    #[test]
    fn test_message_score_far_below_expected() {
        let one = score_message(&[85], Some((12, 20)));
        // avg 85 + 10 (all good) - 10 (below lo/3) - 10 (fewer than 3) = 75
        assert_eq!(one, 75);
    }

    #[test]
    fn test_message_score_low_confidences_floor() {
        let confidences = vec![5u8; 15];
        // avg 5 + 0 - 15 (all bad) + 5 (in range) = -5, clamped to 0
        assert_eq!(score_message(&confidences, Some((12, 20))), 0);
    }

    proptest! {
        #[test]
        fn prop_hit_score_bounded(
            title in proptest::option::of(".{0,40}"),
            company in proptest::option::of(".{0,40}"),
            location in proptest::option::of(".{0,60}"),
            lines in proptest::collection::vec(".{0,30}", 0..15),
        ) {
            let hit = JobHit {
                tracking_url: "u".into(),
                title,
                company,
                location_raw: location,
                debug_lines: lines,
                ..Default::default()
            };
            let score = score_hit(&hit);
            prop_assert!(score <= 100);
        }

        #[test]
        fn prop_message_score_bounded(
            confidences in proptest::collection::vec(0u8..=100, 0..40),
            lo in 0usize..25,
            span in 0usize..25,
        ) {
            let score = score_message(&confidences, Some((lo, lo + span)));
            prop_assert!(score <= 100);
        }
    }
}
