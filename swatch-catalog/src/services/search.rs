//! Nearest-color search
//!
//! Ranks catalog products by CIE76 distance between their Lab colors and a
//! reference product's Lab color. The whole catalog is scanned on each
//! query; only the best `k` candidates are kept while scanning.

use crate::store::CatalogStore;
use swatch_common::Product;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Product not found: {0}")]
    NotFound(String),
}

/// Up to `k` products closest in color to `reference`, nearest first
///
/// The reference itself (matched by id) and products without a color are
/// never returned. A reference without a color yields no results.
///
/// Equal distances keep candidate order: a later candidate never displaces
/// an earlier one at the same distance.
pub fn nearest<I>(reference: &Product, candidates: I, k: usize) -> Vec<Product>
where
    I: IntoIterator<Item = Product>,
{
    let Some(reference_lab) = reference.lab() else {
        return Vec::new();
    };
    if k == 0 {
        return Vec::new();
    }

    // Ascending by distance, never longer than k
    let mut best: Vec<(f64, Product)> = Vec::with_capacity(k + 1);

    for candidate in candidates {
        if candidate.id == reference.id {
            continue;
        }
        let Some(lab) = candidate.lab() else {
            continue;
        };
        let distance = reference_lab.distance(&lab);

        if best.len() == k {
            match best.last() {
                Some((worst, _)) if distance < *worst => {
                    best.pop();
                }
                _ => continue,
            }
        }

        // After every entry with distance <= this one
        let position = best.partition_point(|(d, _)| *d <= distance);
        best.insert(position, (distance, candidate));
    }

    best.into_iter().map(|(_, product)| product).collect()
}

/// Look up `reference_id` in the store and return its `k` nearest products
pub async fn suggest_by_color(
    store: &CatalogStore,
    reference_id: &str,
    k: usize,
) -> Result<(Product, Vec<Product>), SearchError> {
    let reference = store
        .get(reference_id)
        .await
        .ok_or_else(|| SearchError::NotFound(reference_id.to_string()))?;

    let suggestions = nearest(&reference, store.list().await, k);

    tracing::debug!(
        reference_id,
        requested = k,
        returned = suggestions.len(),
        "Color suggestions computed"
    );

    Ok((reference, suggestions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use swatch_common::Rgb;

    fn gray(id: &str, level: u8) -> Product {
        Product::new(id, format!("img-{}", id)).with_color(Rgb::new(level, level, level))
    }

    fn ids(products: &[Product]) -> Vec<&str> {
        products.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_orders_by_distance() {
        let reference = gray("ref", 0);
        let candidates = vec![gray("far", 200), gray("near", 10), gray("mid", 100)];

        let result = nearest(&reference, candidates, 3);
        assert_eq!(ids(&result), vec!["near", "mid", "far"]);
    }

    #[test]
    fn test_keeps_only_k() {
        let reference = gray("ref", 0);
        let candidates = vec![gray("a", 250), gray("b", 5), gray("c", 120), gray("d", 60)];

        let result = nearest(&reference, candidates, 2);
        assert_eq!(ids(&result), vec!["b", "d"]);
    }

    #[test]
    fn test_excludes_reference_and_unenriched() {
        let reference = gray("ref", 128);
        let candidates = vec![
            gray("ref", 128),
            Product::new("plain", "img"),
            gray("other", 140),
        ];

        let result = nearest(&reference, candidates, 5);
        assert_eq!(ids(&result), vec!["other"]);
    }

    #[test]
    fn test_unenriched_reference_returns_nothing() {
        let reference = Product::new("ref", "img");
        let result = nearest(&reference, vec![gray("a", 1)], 5);
        assert!(result.is_empty());
    }

    #[test]
    fn test_zero_k_returns_nothing() {
        let result = nearest(&gray("ref", 0), vec![gray("a", 1)], 0);
        assert!(result.is_empty());
    }

    #[test]
    fn test_ties_keep_candidate_order() {
        let reference = gray("ref", 0);
        let candidates = vec![gray("x", 50), gray("y", 50), gray("z", 50), gray("w", 10)];

        let result = nearest(&reference, candidates, 2);
        assert_eq!(ids(&result), vec!["w", "x"]);
    }

    #[test]
    fn test_fewer_candidates_than_k() {
        let result = nearest(&gray("ref", 0), vec![gray("a", 30)], 10);
        assert_eq!(ids(&result), vec!["a"]);
    }
}
