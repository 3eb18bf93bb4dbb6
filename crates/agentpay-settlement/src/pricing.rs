//! Deterministic question pricing
//!
//! Base price 6, +2 for long questions, +2 for technical keywords, −2 for a
//! previously seen question, clamped to [5, 10].

/// Keywords that mark a question as technical
const TECHNICAL_KEYWORDS: [&str; 8] = [
    "matrix", "gaussian", "proof", "opencv", "unreal", "swiftui", "jetson", "agent",
];

/// Lower price bound
pub const MIN_POINTS: u64 = 5;
/// Upper price bound
pub const MAX_POINTS: u64 = 10;

/// Price a question in points.
///
/// `seen_before` is kept for interface parity with the repeat discount; the
/// engine's only call site passes `false` because repeats short-circuit to a
/// zero-point quote before pricing runs.
pub fn decide_points(question: &str, seen_before: bool) -> u64 {
    let mut points: i64 = 6;
    if question.chars().count() > 120 {
        points += 2;
    }
    let lower = question.to_lowercase();
    if TECHNICAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        points += 2;
    }
    if seen_before {
        points -= 2;
    }
    points.clamp(MIN_POINTS as i64, MAX_POINTS as i64) as u64
}
