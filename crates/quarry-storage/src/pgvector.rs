//! pgvector text representation.
//!
//! Vectors cross the wire as text (`'[0.1,0.2]'`) and are cast with
//! `$n::text::vector` on the server, so no pgvector client type is needed.

use quarry_core::{Error, Result};

/// Render a vector as a pgvector literal.
pub fn vector_to_pg(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 10 + 2);
    out.push('[');
    for (i, value) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&value.to_string());
    }
    out.push(']');
    out
}

/// Parse the `vector::text` output form.
pub fn parse_pg_vector(text: &str) -> Result<Vec<f32>> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| Error::persistence(format!("malformed vector literal: {text:.32}")))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| Error::persistence(format!("malformed vector component '{part}': {e}")))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_to_pg() {
        assert_eq!(vector_to_pg(&[0.5, -1.0, 0.25]), "[0.5,-1,0.25]");
        assert_eq!(vector_to_pg(&[]), "[]");
    }

    #[test]
    fn test_parse_pg_vector() {
        assert_eq!(parse_pg_vector("[0.5,-1,0.25]").unwrap(), vec![0.5, -1.0, 0.25]);
        assert_eq!(parse_pg_vector(" [1, 2] ").unwrap(), vec![1.0, 2.0]);
        assert!(parse_pg_vector("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_pg_vector_rejects_garbage() {
        assert!(parse_pg_vector("0.5,1").is_err());
        assert!(parse_pg_vector("[0.5,x]").is_err());
    }

    #[test]
    fn test_scientific_notation_parses() {
        assert_eq!(parse_pg_vector("[1e-05,2.5e+3]").unwrap(), vec![1e-5, 2500.0]);
    }
}
