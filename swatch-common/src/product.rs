//! Catalog item record

use crate::color::{Lab, ProductColor, Rgb};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A catalog product
///
/// `id` is assigned by the ingestion source and is the store's primary key.
/// `attributes` are carried through untouched. `color` is absent until the
/// enrichment pipeline has found a dominant color for `image_reference`.
///
/// Serialized as a flat record with sibling `color` (RGB) and `colorLab`
/// fields. On load `colorLab` is ignored and recomputed from `color`, so a
/// hand-edited snapshot cannot desynchronize them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ProductRecord", from = "ProductRecord")]
pub struct Product {
    pub id: String,
    pub attributes: BTreeMap<String, String>,
    pub image_reference: String,
    color: Option<ProductColor>,
}

/// Wire form of [`Product`]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductRecord {
    id: String,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    image_reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<Rgb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color_lab: Option<Lab>,
}

impl From<Product> for ProductRecord {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            attributes: product.attributes,
            image_reference: product.image_reference,
            color: product.color.map(|c| c.rgb()),
            color_lab: product.color.map(|c| c.lab()),
        }
    }
}

impl From<ProductRecord> for Product {
    fn from(record: ProductRecord) -> Self {
        Self {
            id: record.id,
            attributes: record.attributes,
            image_reference: record.image_reference,
            color: record.color.map(ProductColor::from_rgb),
        }
    }
}

impl Product {
    pub fn new(id: impl Into<String>, image_reference: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
            image_reference: image_reference.into(),
            color: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Return a copy carrying `rgb` as its dominant color
    pub fn with_color(mut self, rgb: Rgb) -> Self {
        self.set_color(rgb);
        self
    }

    /// Set both color representations at once
    pub fn set_color(&mut self, rgb: Rgb) {
        self.color = Some(ProductColor::from_rgb(rgb));
    }

    pub fn color(&self) -> Option<&ProductColor> {
        self.color.as_ref()
    }

    pub fn rgb(&self) -> Option<Rgb> {
        self.color.map(|c| c.rgb())
    }

    pub fn lab(&self) -> Option<Lab> {
        self.color.map(|c| c.lab())
    }

    /// True once a dominant color has been recorded
    pub fn is_enriched(&self) -> bool {
        self.color.is_some()
    }
}
