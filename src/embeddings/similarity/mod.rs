// Similarity scoring and text change detection


use itertools::Itertools;

/// Texts longer than this (in chars) are compared with bigram overlap instead of edit distance
pub const LONG_TEXT_CHARS: usize = 4096;

/// Scores how close two embedding vectors are
pub trait SimilarityScorer: Send + Sync + std::fmt::Debug {
    /// `None` when the vectors cannot be compared (length mismatch, zero norm)
    fn score(&self, a: &[f32], b: &[f32]) -> Option<f32>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CosineScorer;

impl SimilarityScorer for CosineScorer {
    #[inline]
    fn score(&self, a: &[f32], b: &[f32]) -> Option<f32> {
        if a.is_empty() || a.len() != b.len() {
            return None;
        }

        let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
            (0.0_f64, 0.0_f64, 0.0_f64),
            |(dot, na, nb), (x, y)| {
                let (x, y) = (f64::from(*x), f64::from(*y));
                (dot + x * y, na + x * x, nb + y * y)
            },
        );

        if norm_a == 0.0 || norm_b == 0.0 {
            return None;
        }

        let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());
        cosine.is_finite().then(|| cosine.clamp(-1.0, 1.0) as f32)
    }
}

/// Collapse whitespace runs and lowercase
#[inline]
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().join(" ").to_lowercase()
}

/// How much `new` differs from `old`, from 0 (same) to 1 (nothing in common)
#[inline]
pub fn content_delta(old: &str, new: &str) -> f64 {
    let old = normalize_text(old);
    let new = normalize_text(new);

    if old == new {
        return 0.0;
    }
    if old.is_empty() || new.is_empty() {
        return 1.0;
    }

    let longest = old.chars().count().max(new.chars().count());
    let similarity = if longest > LONG_TEXT_CHARS {
        strsim::sorensen_dice(&old, &new)
    } else {
        strsim::normalized_levenshtein(&old, &new)
    };

    (1.0 - similarity).clamp(0.0, 1.0)
}
