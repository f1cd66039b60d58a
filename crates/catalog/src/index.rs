//! Product indexing and k-NN similarity search over the value-store's
//! vector index.

use crate::encoder::EmbeddingEncoder;
use crate::model::Product;
use churn_core::error::Result;
use churn_core::kv_store::{Namespace, ValueStore};
use std::collections::HashSet;
use std::sync::Arc;

fn namespace() -> Namespace {
    vec!["products".to_string()]
}

pub struct ProductIndex {
    store: Arc<dyn ValueStore>,
    encoder: Arc<dyn EmbeddingEncoder>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ScoredProduct {
    pub product: Product,
    pub similarity_score: f32,
}

impl ProductIndex {
    pub fn new(store: Arc<dyn ValueStore>, encoder: Arc<dyn EmbeddingEncoder>) -> Self {
        Self { store, encoder }
    }

    /// Encodes and stores every product's `embedding_text`. Re-indexing
    /// is idempotent: each product is keyed by `product_id`, so a repeat
    /// call simply overwrites the existing entry.
    pub async fn index_products(&self, products: &[Product]) -> Result<usize> {
        let mut indexed = 0;
        for product in products {
            let embedding = self.encoder.encode(&product.embedding_text()).await?;
            let value = serde_json::to_value(product).expect("Product always serializes");
            self.store.aput(&namespace(), &product.product_id, value, Some(embedding)).await?;
            indexed += 1;
        }
        Ok(indexed)
    }

    pub async fn product_count(&self) -> Result<usize> {
        Ok(self.store.asearch(&namespace(), None, usize::MAX).await?.len())
    }

    /// k-NN over the indexed products, excluding `exclude_ids`. Returns
    /// whatever is available when the index has fewer than
    /// `limit + exclude_ids.len()` entries — never errors on scarcity.
    pub async fn search_similar(&self, query_text: &str, limit: usize, exclude_ids: &[String]) -> Result<Vec<ScoredProduct>> {
        let query_embedding = self.encoder.encode(query_text).await?;
        let exclude: HashSet<&str> = exclude_ids.iter().map(|s| s.as_str()).collect();

        let results = self
            .store
            .asearch(&namespace(), Some(&query_embedding), limit + exclude.len())
            .await?;

        let mut scored = Vec::new();
        for (item, score) in results {
            if exclude.contains(item.key.as_str()) {
                continue;
            }
            if let Ok(product) = serde_json::from_value::<Product>(item.value.clone()) {
                scored.push(ScoredProduct { product, similarity_score: score });
            }
            if scored.len() >= limit {
                break;
            }
        }
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::HashEmbeddingEncoder;
    use churn_core::kv_store::InMemoryKvStore;

    fn product(id: &str, category: &str) -> Product {
        Product {
            product_id: id.to_string(),
            name: format!("Product {id}"),
            description: None,
            category: category.to_string(),
            subcategory: None,
            brand: None,
            price: 10.0,
            original_price: None,
            discount_percentage: None,
            rating: Some(4.5),
            review_count: Some(100),
            stock_quantity: Some(5),
            tags: vec![],
            images: vec![],
            specifications: Default::default(),
            is_featured: false,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn search_excludes_requested_ids() {
        let store: Arc<dyn ValueStore> = Arc::new(InMemoryKvStore::new());
        let encoder: Arc<dyn EmbeddingEncoder> = Arc::new(HashEmbeddingEncoder);
        let index = ProductIndex::new(store, encoder);

        index
            .index_products(&[product("p1", "electronics"), product("p2", "electronics")])
            .await
            .unwrap();

        let results = index.search_similar("electronics", 10, &["p1".to_string()]).await.unwrap();
        assert!(results.iter().all(|r| r.product.product_id != "p1"));
    }

    #[tokio::test]
    async fn search_never_errors_when_index_is_smaller_than_limit() {
        let store: Arc<dyn ValueStore> = Arc::new(InMemoryKvStore::new());
        let encoder: Arc<dyn EmbeddingEncoder> = Arc::new(HashEmbeddingEncoder);
        let index = ProductIndex::new(store, encoder);
        index.index_products(&[product("p1", "electronics")]).await.unwrap();

        let results = index.search_similar("electronics", 50, &[]).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn reindexing_a_product_overwrites_rather_than_duplicates() {
        let store: Arc<dyn ValueStore> = Arc::new(InMemoryKvStore::new());
        let encoder: Arc<dyn EmbeddingEncoder> = Arc::new(HashEmbeddingEncoder);
        let index = ProductIndex::new(store, encoder);

        index.index_products(&[product("p1", "electronics")]).await.unwrap();
        index.index_products(&[product("p1", "home")]).await.unwrap();

        assert_eq!(index.product_count().await.unwrap(), 1);
    }
}
