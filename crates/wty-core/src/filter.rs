//! Filtering of batches and codes.
//!
//! Criteria are conjunctive; an "any" criterion always passes. Results keep
//! input order and borrow from the input.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::ids::{ProductId, ShopId};
use crate::model::{Batch, Code, Product};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    Any,
    Activated,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductFilter {
    #[default]
    Any,
    Only(ProductId),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShopFilter {
    #[default]
    Any,
    Unassigned,
    Only(ShopId),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub search: String,
    pub status: StatusFilter,
    pub product: ProductFilter,
    pub shop: ShopFilter,
}

impl FilterCriteria {
    pub fn is_active(&self) -> bool {
        !self.search.trim().is_empty()
            || self.status != StatusFilter::Any
            || self.product != ProductFilter::Any
            || self.shop != ShopFilter::Any
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn needle(&self) -> Option<String> {
        let term = self.search.trim();
        (!term.is_empty()).then(|| term.to_lowercase())
    }

    pub fn matches_code(&self, code: &Code) -> bool {
        if let Some(needle) = self.needle()
            && !code.serial_number.to_lowercase().contains(&needle)
        {
            return false;
        }

        let status_ok = match self.status {
            StatusFilter::Any => true,
            StatusFilter::Activated => code.is_activated,
            StatusFilter::Pending => !code.is_activated,
        };
        if !status_ok {
            return false;
        }

        if let ProductFilter::Only(product_id) = &self.product
            && &code.product_id != product_id
        {
            return false;
        }

        match &self.shop {
            ShopFilter::Any => true,
            ShopFilter::Unassigned => code.assigned_shop_id.is_none(),
            ShopFilter::Only(shop_id) => code.assigned_shop_id.as_ref() == Some(shop_id),
        }
    }

    /// Batch-level predicate: search matches the product name or the batch
    /// id, and the product filter matches the batch's product.
    pub fn matches_batch(&self, batch: &Batch, product: Option<&Product>) -> bool {
        if let Some(needle) = self.needle() {
            let name_hit = product.is_some_and(|p| p.product_name.to_lowercase().contains(&needle));
            if !name_hit && !batch.id.as_str().to_lowercase().contains(&needle) {
                return false;
            }
        }

        match &self.product {
            ProductFilter::Any => true,
            ProductFilter::Only(product_id) => &batch.product_id == product_id,
        }
    }
}

pub fn apply<'a>(codes: &'a [Code], criteria: &FilterCriteria) -> Vec<&'a Code> {
    codes.iter().filter(|c| criteria.matches_code(c)).collect()
}

pub fn apply_batches<'a>(
    batches: &'a [Batch],
    products: &[Product],
    criteria: &FilterCriteria,
) -> Vec<&'a Batch> {
    batches
        .iter()
        .filter(|b| {
            let product = products.iter().find(|p| p.product_id == b.product_id);
            criteria.matches_batch(b, product)
        })
        .collect()
}

impl FromStr for StatusFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" | "any" => Ok(Self::Any),
            "activated" => Ok(Self::Activated),
            "pending" => Ok(Self::Pending),
            other => Err(Error::Validation(format!(
                "Unknown status filter '{other}' (expected all, activated or pending)"
            ))),
        }
    }
}

impl FromStr for ProductFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "all" | "any" => Ok(Self::Any),
            id => Ok(Self::Only(ProductId::new(id))),
        }
    }
}

impl FromStr for ShopFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "all" | "any" => Ok(Self::Any),
            "unassigned" => Ok(Self::Unassigned),
            id => Ok(Self::Only(ShopId::new(id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{BatchId, CodeId};
    use time::macros::datetime;

    fn code(id: &str, serial: &str, activated: bool, shop: Option<&str>) -> Code {
        Code {
            id: CodeId::new(id),
            serial_number: serial.to_string(),
            product_id: "P-100".into(),
            batch_id: "B-1".into(),
            assigned_shop_id: shop.map(ShopId::from),
            is_activated: activated,
            activation_date: None,
            customer_name: None,
            customer_phone: None,
            customer_address: None,
            created_at: None,
        }
    }

    fn sample() -> Vec<Code> {
        vec![
            code("a", "SN-001", false, None),
            code("b", "SN-002", true, Some("SHOP-1")),
            code("c", "XY-003", false, Some("SHOP-2")),
            code("d", "sn-004", true, None),
        ]
    }

    fn ids(codes: &[&Code]) -> Vec<String> {
        codes.iter().map(|c| c.id.to_string()).collect()
    }

    #[test]
    fn test_all_any_returns_input_in_order() {
        let codes = sample();
        let visible = apply(&codes, &FilterCriteria::default());
        assert_eq!(ids(&visible), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_search_is_case_insensitive_on_serial() {
        let codes = sample();
        let criteria = FilterCriteria {
            search: "Sn-0".into(),
            ..Default::default()
        };
        assert_eq!(ids(&apply(&codes, &criteria)), vec!["a", "b", "d"]);
    }

    #[test]
    fn test_status_filters() {
        let codes = sample();
        let mut criteria = FilterCriteria {
            status: StatusFilter::Activated,
            ..Default::default()
        };
        assert_eq!(ids(&apply(&codes, &criteria)), vec!["b", "d"]);
        criteria.status = StatusFilter::Pending;
        assert_eq!(ids(&apply(&codes, &criteria)), vec!["a", "c"]);
    }

    #[test]
    fn test_shop_filters() {
        let codes = sample();
        let mut criteria = FilterCriteria {
            shop: ShopFilter::Unassigned,
            ..Default::default()
        };
        assert_eq!(ids(&apply(&codes, &criteria)), vec!["a", "d"]);
        criteria.shop = ShopFilter::Only("SHOP-2".into());
        assert_eq!(ids(&apply(&codes, &criteria)), vec!["c"]);
    }

    #[test]
    fn test_criteria_compose_conjunctively() {
        let codes = sample();
        let criteria = FilterCriteria {
            search: "sn".into(),
            status: StatusFilter::Activated,
            shop: ShopFilter::Unassigned,
            ..Default::default()
        };
        assert_eq!(ids(&apply(&codes, &criteria)), vec!["d"]);
    }

    #[test]
    fn test_no_match_is_empty() {
        let codes = sample();
        let criteria = FilterCriteria {
            search: "does-not-exist".into(),
            ..Default::default()
        };
        assert!(apply(&codes, &criteria).is_empty());
        assert!(apply(&[], &FilterCriteria::default()).is_empty());
    }

    #[test]
    fn test_batch_search_hits_product_name_or_batch_id() {
        let batches = vec![
            Batch {
                id: BatchId::new("B-KETTLE-1"),
                product_id: "P-100".into(),
                count: 5,
                activated_count: 0,
                assigned_count: 0,
                created_at: datetime!(2024-01-01 0:00 UTC),
            },
            Batch {
                id: BatchId::new("B-2"),
                product_id: "P-200".into(),
                count: 5,
                activated_count: 0,
                assigned_count: 0,
                created_at: datetime!(2024-01-02 0:00 UTC),
            },
        ];
        let products = vec![Product {
            product_id: "P-200".into(),
            product_name: "Toaster".into(),
            manufacturer: String::new(),
            category: String::new(),
            image_url: String::new(),
            warranty_duration: 90,
        }];

        let mut criteria = FilterCriteria {
            search: "toast".into(),
            ..Default::default()
        };
        let hits = apply_batches(&batches, &products, &criteria);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "B-2");

        criteria.search = "kettle".into();
        let hits = apply_batches(&batches, &products, &criteria);
        assert_eq!(hits[0].id.as_str(), "B-KETTLE-1");

        criteria.search.clear();
        criteria.product = ProductFilter::Only("P-100".into());
        assert_eq!(apply_batches(&batches, &products, &criteria).len(), 1);
    }

    #[test]
    fn test_is_active_and_clear() {
        let mut criteria = FilterCriteria {
            shop: ShopFilter::Unassigned,
            ..Default::default()
        };
        assert!(criteria.is_active());
        criteria.clear();
        assert!(!criteria.is_active());
        criteria.search = "   ".into();
        assert!(!criteria.is_active());
    }

    #[test]
    fn test_parse_filters() {
        assert_eq!("pending".parse::<StatusFilter>().unwrap(), StatusFilter::Pending);
        assert!("bogus".parse::<StatusFilter>().is_err());
        assert_eq!("unassigned".parse::<ShopFilter>().unwrap(), ShopFilter::Unassigned);
        assert_eq!(
            "SHOP-1".parse::<ShopFilter>().unwrap(),
            ShopFilter::Only("SHOP-1".into())
        );
        assert_eq!("all".parse::<ProductFilter>().unwrap(), ProductFilter::Any);
    }
}
