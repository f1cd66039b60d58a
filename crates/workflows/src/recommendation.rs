//! Recommendations workflow (C8): `get_cart → get_features →
//! estimate_churn → vector_search → rank_discount →
//! store_recommendations`, with a parallel `error_handler` terminal,
//! checkpointed after every node.

use churn_catalog::ProductIndex;
use churn_core::checkpoint::Checkpointer;
use churn_core::error::{Error, ErrorCode, Result};
use churn_core::kv_store::{Namespace, ValueStore};
use churn_features::{CartItemRef, FeatureStore};
use churn_scoring::{ChurnScorer, RiskSegment};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

fn cache_namespace() -> Namespace {
    vec!["user_recommendations".to_string()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStep {
    GetCart,
    GetFeatures,
    EstimateChurn,
    VectorSearch,
    RankDiscount,
    StoreRecommendations,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedRecommendation {
    pub product_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_price: Option<f64>,
    pub discounted_price: f64,
    pub discount_percentage: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub similarity_score: f32,
    pub recommendation_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub user_id: String,
    pub recommendations: Vec<RankedRecommendation>,
    pub churn_risk: String,
    pub churn_probability: f64,
    pub cart_item_count: usize,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationState {
    pub user_id: String,
    pub cart_items: Vec<CartItemRef>,
    pub cart_total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub churn_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_segment: Option<RiskSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<RecommendationRecord>,
    pub current_step: RecommendationStep,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed: bool,
}

impl RecommendationState {
    fn new(user_id: &str, cart_items: Vec<CartItemRef>) -> Self {
        let cart_total = cart_items.iter().map(|i| i.price.unwrap_or(0.0) * i.quantity as f64).sum();
        Self {
            user_id: user_id.to_string(),
            cart_items,
            cart_total,
            churn_probability: None,
            risk_segment: None,
            record: None,
            current_step: RecommendationStep::GetCart,
            error: None,
            completed: false,
        }
    }

    fn fail(&mut self, step: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(user_id = %self.user_id, step, error = %message, "recommendations workflow step failed");
        self.error = Some(message);
        self.current_step = RecommendationStep::Error;
        self.completed = true;
    }
}

/// `low_risk 0-5 -> 2, medium_risk 5-10 -> 7, high_risk 15-20 -> 17, critical 20-30 -> 25`,
/// the midpoint-rounded-down tier from each segment's discount band.
fn discount_tier_pct(segment: RiskSegment) -> i32 {
    match segment {
        RiskSegment::Low => 2,
        RiskSegment::Medium => 7,
        RiskSegment::High => 17,
        RiskSegment::Critical => 25,
    }
}

fn discounted_price(price: f64, tier_pct: i32) -> f64 {
    (price * (1.0 - tier_pct as f64 / 100.0) * 100.0).round() / 100.0
}

pub struct RecommendationsWorkflow {
    features: Arc<FeatureStore>,
    scorer: Arc<ChurnScorer>,
    index: Arc<ProductIndex>,
    cache: Arc<dyn ValueStore>,
    checkpointer: Arc<dyn Checkpointer>,
}

impl RecommendationsWorkflow {
    pub fn new(
        features: Arc<FeatureStore>,
        scorer: Arc<ChurnScorer>,
        index: Arc<ProductIndex>,
        cache: Arc<dyn ValueStore>,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        Self { features, scorer, index, cache, checkpointer }
    }

    pub async fn run(&self, user_id: &str, cart_items: Vec<CartItemRef>) -> Result<RecommendationState> {
        let thread_id = format!("reco_{user_id}");
        let mut state = RecommendationState::new(user_id, cart_items);
        let mut step_index = 0u32;

        // get_cart is computed synchronously in `RecommendationState::new`.
        state.current_step = RecommendationStep::GetFeatures;
        self.checkpoint(&thread_id, step_index, &state).await;

        let features = match self.features.retrieve_all(user_id).await {
            Ok((features, _freshness)) => features,
            Err(e) => {
                state.fail("get_features", e.to_string());
                self.checkpoint(&thread_id, step_index, &state).await;
                return Ok(state);
            }
        };
        state.current_step = RecommendationStep::EstimateChurn;
        step_index += 1;
        self.checkpoint(&thread_id, step_index, &state).await;

        let prediction = self.scorer.predict_churn(&features);
        state.churn_probability = Some(prediction.churn_probability);
        state.risk_segment = Some(prediction.risk_segment);
        state.current_step = RecommendationStep::VectorSearch;
        step_index += 1;
        self.checkpoint(&thread_id, step_index, &state).await;

        let candidates = match self.vector_search(&state).await {
            Ok(candidates) => candidates,
            Err(e) => {
                state.fail("vector_search", e.to_string());
                self.checkpoint(&thread_id, step_index, &state).await;
                return Ok(state);
            }
        };
        state.current_step = RecommendationStep::RankDiscount;
        step_index += 1;
        self.checkpoint(&thread_id, step_index, &state).await;

        let recommendations = self.rank_discount(&state, prediction.risk_segment, candidates);
        let record = RecommendationRecord {
            user_id: user_id.to_string(),
            recommendations,
            churn_risk: prediction.risk_segment.as_str().to_string(),
            churn_probability: prediction.churn_probability,
            cart_item_count: state.cart_items.len(),
            generated_at: churn_core::utils::now_utc_iso(),
        };

        if let Err(e) = self
            .cache
            .aput(&cache_namespace(), user_id, serde_json::to_value(&record).expect("RecommendationRecord always serializes"), None)
            .await
        {
            warn!(user_id, error = %e, "failed to cache recommendations, returning them uncached");
        }

        state.record = Some(record);
        state.current_step = RecommendationStep::StoreRecommendations;
        state.completed = true;
        step_index += 1;
        self.checkpoint(&thread_id, step_index, &state).await;

        Ok(state)
    }

    async fn checkpoint(&self, thread_id: &str, step_index: u32, state: &RecommendationState) {
        let snapshot = serde_json::to_value(state).expect("RecommendationState always serializes");
        if let Err(e) = self.checkpointer.save(thread_id, "recommendations", step_index, snapshot).await {
            warn!(thread_id, error = %e, "recommendations checkpoint save failed, continuing in-memory");
        }
    }

    /// Builds up to three query strings (cart-item join, category-only,
    /// and empty-cart fallbacks), runs each with `limit=10`, unions and
    /// dedupes by `product_id`, excludes cart items, and keeps the top 15
    /// by similarity.
    async fn vector_search(&self, state: &RecommendationState) -> Result<Vec<churn_catalog::ScoredProduct>> {
        let exclude_ids: Vec<String> = state.cart_items.iter().map(|i| i.product_id.clone()).collect();
        let queries = self.build_queries(state);

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for query in queries {
            let results = self.index.search_similar(&query, 10, &exclude_ids).await?;
            for scored in results {
                if seen.insert(scored.product.product_id.clone()) {
                    merged.push(scored);
                }
            }
        }

        merged.sort_by(|a, b| b.similarity_score.partial_cmp(&a.similarity_score).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(15);
        Ok(merged)
    }

    fn build_queries(&self, state: &RecommendationState) -> Vec<String> {
        if !state.cart_items.is_empty() {
            let item_query = state
                .cart_items
                .iter()
                .map(|item| {
                    let name = item.name.as_deref().unwrap_or("item");
                    let category = item.category.as_deref().unwrap_or("general");
                    let brand = item.brand.as_deref().unwrap_or("");
                    format!("{name} | Category: {category} | Brand: {brand}")
                })
                .collect::<Vec<_>>()
                .join(" ; ");

            let categories: HashSet<&str> = state.cart_items.iter().filter_map(|i| i.category.as_deref()).collect();
            let category_query = categories.into_iter().collect::<Vec<_>>().join(", ");

            let mut queries = vec![item_query];
            if !category_query.is_empty() {
                queries.push(category_query);
            }
            queries
        } else {
            vec![
                "trending popular".to_string(),
                "electronics gadgets".to_string(),
                "home kitchen essentials".to_string(),
            ]
        }
    }

    /// Scores each candidate `0.6*similarity + 0.4*(rating/5)`, sorts
    /// descending, keeps the top 8, and assigns a discount and reason.
    fn rank_discount(
        &self,
        state: &RecommendationState,
        segment: RiskSegment,
        candidates: Vec<churn_catalog::ScoredProduct>,
    ) -> Vec<RankedRecommendation> {
        let tier_pct = discount_tier_pct(segment);
        let cart_categories: HashSet<&str> = state.cart_items.iter().filter_map(|i| i.category.as_deref()).collect();
        let cart_brands: HashSet<&str> = state.cart_items.iter().filter_map(|i| i.brand.as_deref()).collect();

        let mut scored: Vec<(f32, RankedRecommendation)> = candidates
            .into_iter()
            .map(|candidate| {
                let product = candidate.product;
                let rating = product.rating.unwrap_or(0.0);
                let score = 0.6 * candidate.similarity_score + 0.4 * (rating / 5.0) as f32;
                let reason = recommendation_reason(&product, candidate.similarity_score, &cart_categories, &cart_brands);

                let recommendation = RankedRecommendation {
                    product_id: product.product_id,
                    name: product.name,
                    description: product.description,
                    category: product.category,
                    brand: product.brand,
                    price: product.price,
                    original_price: product.original_price,
                    discounted_price: discounted_price(product.price, tier_pct),
                    discount_percentage: tier_pct,
                    rating: product.rating,
                    review_count: product.review_count,
                    image: product.images.first().cloned(),
                    similarity_score: candidate.similarity_score,
                    recommendation_reason: reason,
                };
                (score, recommendation)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(8);
        scored.into_iter().map(|(_, r)| r).collect()
    }
}

/// Reason priority: cart-category match > cart-brand match > similarity
/// >= 0.7 > rating >= 4.5 > "Recommended for you".
fn recommendation_reason(
    product: &churn_catalog::Product,
    similarity: f32,
    cart_categories: &HashSet<&str>,
    cart_brands: &HashSet<&str>,
) -> String {
    if cart_categories.contains(product.category.as_str()) {
        return format!("Matches your {} cart", product.category);
    }
    if let Some(brand) = &product.brand {
        if cart_brands.contains(brand.as_str()) {
            return format!("More from {brand}");
        }
    }
    if similarity >= 0.7 {
        return "Similar to items you've viewed".to_string();
    }
    if product.rating.unwrap_or(0.0) >= 4.5 {
        return "Highly rated".to_string();
    }
    "Recommended for you".to_string()
}

/// Returns `None` if nothing has been cached yet for the user (the
/// caller maps that to a 404).
pub async fn read_cached(cache: &dyn ValueStore, user_id: &str) -> Result<Option<RecommendationRecord>> {
    let item = cache.aget(&cache_namespace(), user_id).await?;
    Ok(item.and_then(|item| serde_json::from_value(item.value).ok()))
}

pub fn missing_index_error() -> Error {
    Error::new(ErrorCode::IndexNotReady, "product index has not been built yet")
}

#[cfg(test)]
mod tests {
    use super::*;
    use churn_catalog::{HashEmbeddingEncoder, Product};
    use churn_core::checkpoint::InMemoryCheckpointer;
    use churn_core::kv_store::{InMemoryKvStore, KvStore};
    use churn_scoring::{ModelArtifact, RuleBasedExplainer, Tree, TreeNode};

    fn product(id: &str, category: &str, brand: &str) -> Product {
        Product {
            product_id: id.to_string(),
            name: format!("Product {id}"),
            description: None,
            category: category.to_string(),
            subcategory: None,
            brand: Some(brand.to_string()),
            price: 100.0,
            original_price: None,
            discount_percentage: None,
            rating: Some(4.8),
            review_count: Some(10),
            stock_quantity: Some(5),
            tags: vec![],
            images: vec![],
            specifications: Default::default(),
            is_featured: false,
            is_active: true,
        }
    }

    async fn workflow() -> RecommendationsWorkflow {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let value_store: Arc<dyn ValueStore> = Arc::new(InMemoryKvStore::new());
        let features = Arc::new(FeatureStore::new(kv));
        let model = Arc::new(ModelArtifact {
            trees: vec![Tree { nodes: vec![TreeNode { feature_index: 0, threshold: 0.0, left: usize::MAX, right: usize::MAX, leaf_weight: -2.0 }] }],
            base_score: 0.0,
        });
        let scorer = Arc::new(ChurnScorer::new(model, Box::new(RuleBasedExplainer)));
        let index = Arc::new(ProductIndex::new(value_store.clone(), Arc::new(HashEmbeddingEncoder)));
        index
            .index_products(&[product("p1", "electronics", "Acme"), product("p2", "electronics", "Acme")])
            .await
            .unwrap();
        let checkpointer: Arc<dyn Checkpointer> = Arc::new(InMemoryCheckpointer::new());
        RecommendationsWorkflow::new(features, scorer, index, value_store, checkpointer)
    }

    #[tokio::test]
    async fn excludes_cart_items_from_recommendations() {
        let workflow = workflow().await;
        let cart = vec![CartItemRef { product_id: "p1".to_string(), name: Some("Product p1".to_string()), category: Some("electronics".to_string()), brand: Some("Acme".to_string()), price: Some(100.0), quantity: 1 }];
        let state = workflow.run("u1", cart).await.unwrap();
        let record = state.record.unwrap();
        assert!(record.recommendations.iter().all(|r| r.product_id != "p1"));
    }

    #[tokio::test]
    async fn discount_percentage_matches_risk_tier() {
        let workflow = workflow().await;
        let state = workflow.run("u2", vec![]).await.unwrap();
        let record = state.record.unwrap();
        let expected = discount_tier_pct(state.risk_segment.unwrap());
        assert!(record.recommendations.iter().all(|r| r.discount_percentage == expected));
    }

    #[tokio::test]
    async fn cached_read_round_trips_after_run() {
        let workflow = workflow().await;
        workflow.run("u3", vec![]).await.unwrap();
        let cached = read_cached(&*workflow.cache, "u3").await.unwrap();
        assert!(cached.is_some());
    }
}
