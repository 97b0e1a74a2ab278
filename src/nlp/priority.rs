//! Deterministic priority scoring.
//!
//! The model's own urgency number is never trusted; priority is
//! recomputed here from the raw Russian classification labels plus the
//! caller-supplied client segment.

use crate::domain::Segment;

// Base scores calibrated so that sentiment + segment adjustments keep
// each type within its intended range without squashing.
fn base_score(request_type: &str) -> i32 {
    match request_type {
        "Мошеннические действия" => 9,       // [9, 10] after clamp + hard floor
        "Неработоспособность приложения" => 7, // [7, 10]
        "Жалоба" => 6,                        // [5, 8]
        "Претензия" => 4,                     // [3, 6]
        "Смена данных" => 5,                  // [2, 5]
        "Консультация" => 4,                  // [1, 4]
        "Спам" => 1,                          // hard override below
        _ => 4,
    }
}

// Sentiment shifts; neutral is the baseline.
fn sentiment_adj(sentiment: &str) -> i32 {
    match sentiment {
        "Негативная" => 2,
        "Положительная" => -1,
        _ => 0,
    }
}

fn segment_bonus(segment: Segment) -> i32 {
    match segment {
        Segment::Vip => 2,
        Segment::Priority => 1,
        Segment::Mass => 0,
    }
}

/// Return an integer priority in `[1, 10]`.
///
/// Formula: `base(type) + sentiment_adj + segment_bonus`, clamped to
/// `[1, 10]`. Hard rules applied after clamping:
/// - Спам → always 1
/// - Мошеннические действия → minimum 9
pub fn score_priority(request_type: &str, sentiment: &str, segment: Segment) -> u8 {
    if request_type == "Спам" {
        return 1;
    }

    let raw = base_score(request_type) + sentiment_adj(sentiment) + segment_bonus(segment);
    let mut priority = raw.clamp(1, 10);

    if request_type == "Мошеннические действия" {
        priority = priority.max(9);
    }

    priority as u8
}
