use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::config::RateOverride;
use crate::errors::ServiceError;
use crate::models::ProcessCategory;

/// Per-unit rates (per kg of yarn) for each process and material.
#[derive(Debug, Clone)]
pub struct PricingCatalog {
    rates: BTreeMap<(ProcessCategory, String), Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CatalogEntry {
    pub process_category: ProcessCategory,
    pub material: String,
    #[schema(value_type = String, example = "450")]
    pub unit_rate: Decimal,
}

/// Normalises a free-form material name for catalog lookup:
/// `"  Poly-Cotton Blend "` becomes `"poly-cotton-blend"`.
pub fn material_slug(material: &str) -> String {
    let mut slug = String::with_capacity(material.len());
    for c in material.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

impl Default for PricingCatalog {
    fn default() -> Self {
        let mut catalog = Self {
            rates: BTreeMap::new(),
        };
        let sizing = [
            ("cotton", dec!(450)),
            ("polyester", dec!(520)),
            ("viscose", dec!(480)),
            ("poly-cotton", dec!(495)),
            ("silk", dec!(900)),
        ];
        let weaving = [
            ("cotton", dec!(38.5)),
            ("polyester", dec!(42)),
            ("viscose", dec!(40)),
            ("poly-cotton", dec!(41)),
            ("silk", dec!(85)),
        ];
        for (material, rate) in sizing {
            catalog.insert(ProcessCategory::Sizing, material, rate);
        }
        for (material, rate) in weaving {
            catalog.insert(ProcessCategory::Weaving, material, rate);
        }
        catalog
    }
}

impl PricingCatalog {
    pub fn empty() -> Self {
        Self {
            rates: BTreeMap::new(),
        }
    }

    /// Built-in rates with configured overrides applied on top.
    pub fn with_overrides(overrides: &[RateOverride]) -> Result<Self, ServiceError> {
        let mut catalog = Self::default();
        for o in overrides {
            let category = ProcessCategory::from_str(o.category.trim()).map_err(|_| {
                ServiceError::ValidationError(format!(
                    "unknown process category in pricing override: {}",
                    o.category
                ))
            })?;
            if o.rate <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "pricing override for {}/{} must be positive",
                    o.category, o.material
                )));
            }
            catalog.insert(category, &o.material, o.rate);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, category: ProcessCategory, material: &str, rate: Decimal) {
        self.rates.insert((category, material_slug(material)), rate);
    }

    /// `GetRate(processCategory, materialSlug) -> unitRate`
    pub fn get_rate(
        &self,
        category: ProcessCategory,
        material: &str,
    ) -> Result<Decimal, ServiceError> {
        let slug = material_slug(material);
        if slug.is_empty() {
            return Err(ServiceError::ValidationError(
                "material is required".to_string(),
            ));
        }

        let rate = self
            .rates
            .get(&(category, slug.clone()))
            .copied()
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "no rate for {} of {}",
                    category, slug
                ))
            })?;

        if rate <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "rate for {} of {} is not positive",
                category, slug
            )));
        }

        debug!(%category, material = %slug, %rate, "catalog rate resolved");
        Ok(rate)
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.rates
            .iter()
            .map(|((category, material), rate)| CatalogEntry {
                process_category: *category,
                material: material.clone(),
                unit_rate: *rate,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_normalises_case_and_separators() {
        assert_eq!(material_slug("Cotton"), "cotton");
        assert_eq!(material_slug("  Poly / Cotton "), "poly-cotton");
        assert_eq!(material_slug("poly--cotton!!"), "poly-cotton");
        assert_eq!(material_slug(" -- "), "");
    }

    #[test]
    fn rate_lookup_uses_category_and_slug() {
        let catalog = PricingCatalog::default();
        assert_eq!(
            catalog.get_rate(ProcessCategory::Sizing, "COTTON").unwrap(),
            dec!(450)
        );
        assert_eq!(
            catalog.get_rate(ProcessCategory::Weaving, "cotton").unwrap(),
            dec!(38.5)
        );
    }

    #[test]
    fn unknown_or_blank_material_is_a_validation_error() {
        let catalog = PricingCatalog::default();
        assert!(matches!(
            catalog.get_rate(ProcessCategory::Sizing, "kevlar"),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            catalog.get_rate(ProcessCategory::Sizing, "   "),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn overrides_replace_and_extend() {
        let catalog = PricingCatalog::with_overrides(&[
            RateOverride {
                category: "sizing".into(),
                material: "Cotton".into(),
                rate: dec!(470),
            },
            RateOverride {
                category: "Weaving".into(),
                material: "Linen".into(),
                rate: dec!(60),
            },
        ])
        .unwrap();
        assert_eq!(
            catalog.get_rate(ProcessCategory::Sizing, "cotton").unwrap(),
            dec!(470)
        );
        assert_eq!(
            catalog.get_rate(ProcessCategory::Weaving, "linen").unwrap(),
            dec!(60)
        );
    }

    #[test]
    fn override_with_unknown_category_fails() {
        let err = PricingCatalog::with_overrides(&[RateOverride {
            category: "dyeing".into(),
            material: "cotton".into(),
            rate: dec!(10),
        }])
        .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}
