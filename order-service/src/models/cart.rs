use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::BTreeMap;

/// `item_id -> size -> quantity`, the shape storefront clients render.
pub type CartData = BTreeMap<String, BTreeMap<String, u32>>;

/// Per-user cart document. The user id is the document id, so a user has at
/// most one cart and it can be removed with a single keyed delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    #[serde(rename = "_id")]
    pub user_id: String,
    #[serde(default)]
    pub items: CartData,
    #[serde(default)]
    pub version: i64,
    pub updated_at: DateTime,
}

impl Cart {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            items: CartData::new(),
            version: 0,
            updated_at: DateTime::now(),
        }
    }

    pub fn quantity(&self, item_id: &str, size: &str) -> u32 {
        self.items
            .get(item_id)
            .and_then(|sizes| sizes.get(size))
            .copied()
            .unwrap_or(0)
    }

    /// Cart contents without the empty size maps left behind by removals.
    pub fn into_data(self) -> CartData {
        self.items
            .into_iter()
            .map(|(item, sizes)| {
                let sizes: BTreeMap<String, u32> =
                    sizes.into_iter().filter(|(_, qty)| *qty > 0).collect();
                (item, sizes)
            })
            .filter(|(_, sizes)| !sizes.is_empty())
            .collect()
    }
}

/// Item ids and sizes become document field names, so they must not contain
/// path separators or operator prefixes.
pub fn validate_cart_key(value: &str, field: &str) -> Result<(), AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("{} is required", field)));
    }
    if value.contains('.') || value.starts_with('$') || value.contains('\0') {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "{} contains unsupported characters",
            field
        )));
    }
    Ok(())
}

/// Dotted document path of one cart line.
pub fn cart_item_path(item_id: &str, size: &str) -> String {
    format!("items.{}.{}", item_id, size)
}
