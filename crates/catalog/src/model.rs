//! The product record, mirrored from the storefront's canonical catalog
//! into the vector index.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub original_price: Option<f64>,
    #[serde(default)]
    pub discount_percentage: Option<i32>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u64>,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub specifications: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl Product {
    /// `"name | description | Category: … | Subcategory: … | Brand: … | Tags: …"`,
    /// the synthesized text the encoder turns into an embedding.
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![self.name.clone()];
        if let Some(description) = &self.description {
            parts.push(description.clone());
        }
        parts.push(format!("Category: {}", self.category));
        if let Some(subcategory) = &self.subcategory {
            parts.push(format!("Subcategory: {subcategory}"));
        }
        if let Some(brand) = &self.brand {
            parts.push(format!("Brand: {brand}"));
        }
        if !self.tags.is_empty() {
            parts.push(format!("Tags: {}", self.tags.join(", ")));
        }
        parts.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_text_skips_absent_optional_fields() {
        let product = Product {
            product_id: "p1".to_string(),
            name: "Wireless Mouse".to_string(),
            description: None,
            category: "electronics".to_string(),
            subcategory: None,
            brand: Some("Acme".to_string()),
            price: 19.99,
            original_price: None,
            discount_percentage: None,
            rating: None,
            review_count: None,
            stock_quantity: None,
            tags: vec![],
            images: vec![],
            specifications: Default::default(),
            is_featured: false,
            is_active: true,
        };
        assert_eq!(product.embedding_text(), "Wireless Mouse | Category: electronics | Brand: Acme");
    }
}
