//! Text normalisation and embedding-text composition.

use crate::types::EmbeddingInput;

/// Separator between fields of the composed embedding text.
pub const FIELD_SEPARATOR: &str = " | ";

/// Casefold, trim, and collapse runs of whitespace to a single space.
///
/// Two texts that normalise to the same string share a cache entry.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compose the text embedded for a record.
///
/// Field order is fixed: organization, program, category, location,
/// description, features, keywords. Empty fields are skipped.
pub fn compose_embedding_text(input: &EmbeddingInput) -> String {
    let features = input.features.join(", ");
    let keywords = input.keywords.join(", ");

    [
        input.key.organization.as_str(),
        input.key.program.as_str(),
        input.category.as_deref().unwrap_or_default(),
        input.location.as_deref().unwrap_or_default(),
        input.description.as_str(),
        features.as_str(),
        keywords.as_str(),
    ]
    .iter()
    .map(|field| field.trim())
    .filter(|field| !field.is_empty())
    .collect::<Vec<_>>()
    .join(FIELD_SEPARATOR)
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Cosine similarity in `[-1, 1]`; 0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Cosine distance in `[0, 2]`, matching pgvector's `<=>` operator.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::types::RecordKey;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  MIT   Computer\tScience \n"), "mit computer science");
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_normalize_equivalent_inputs_collide() {
        assert_eq!(normalize_text("AI Research"), normalize_text("ai   research "));
    }

    #[test]
    fn test_compose_embedding_text_order() {
        let input = EmbeddingInput {
            id: "1".into(),
            key: RecordKey::new("MIT", "Computer Science"),
            description: "Research university".into(),
            category: Some("engineering".into()),
            location: None,
            features: vec!["labs".into(), "co-op".into()],
            keywords: vec!["ai".into()],
        };
        assert_eq!(
            compose_embedding_text(&input),
            "MIT | Computer Science | engineering | Research university | labs, co-op | ai"
        );
    }

    #[test]
    fn test_compose_embedding_text_deterministic() {
        let input = EmbeddingInput {
            id: "1".into(),
            key: RecordKey::new("A", "B"),
            description: String::new(),
            category: None,
            location: None,
            features: vec![],
            keywords: vec![],
        };
        assert_eq!(compose_embedding_text(&input), compose_embedding_text(&input));
        assert_eq!(compose_embedding_text(&input), "A | B");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefgh", 3), "abc…");
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo…");
    }

    #[test]
    fn test_cosine_similarity_and_distance() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let c = [-1.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
        assert!((cosine_distance(&a, &c) - 2.0).abs() < 1e-6);
        assert!(cosine_distance(&a, &a).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(text in "\\PC{0,64}") {
            let once = normalize_text(&text);
            prop_assert_eq!(normalize_text(&once), once.clone());
            prop_assert!(!once.contains("  "));
            prop_assert_eq!(once.trim(), once.as_str());
        }

        #[test]
        fn prop_cosine_similarity_is_bounded(
            pairs in proptest::collection::vec((-100.0f32..100.0, -100.0f32..100.0), 1..32)
        ) {
            let (a, b): (Vec<f32>, Vec<f32>) = pairs.into_iter().unzip();
            let sim = cosine_similarity(&a, &b);
            prop_assert!((-1.0..=1.0).contains(&sim));
            prop_assert!((0.0..=2.0).contains(&cosine_distance(&a, &b)));
        }
    }
}
