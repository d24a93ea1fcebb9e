use serde::{Deserialize, Serialize};

/// Catalog entry. Products are managed elsewhere; orders only read prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub sizes: Vec<String>,
}

impl Product {
    pub fn offers_size(&self, size: &str) -> bool {
        self.sizes.is_empty() || self.sizes.iter().any(|s| s == size)
    }
}
