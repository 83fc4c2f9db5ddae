//! Recipe config — which base probability features combine into each
//! derived feature.
//!
//! Recipes live in a YAML document keyed by feature name. Entries for
//! features other than the two derived ones belong to sibling computations
//! and are ignored here.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LikelihoodError;
use crate::feature::{DerivedFeature, PROB_SUFFIX};

// ── YAML-level types ────────────────────────────────────────────────

/// Top-level recipe document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RecipeConfig {
    /// Feature name → recipe.
    pub features: BTreeMap<String, RecipeSpec>,
}

/// One configured recipe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RecipeSpec {
    /// Bare base feature names (without the `_prob` suffix), in order.
    pub base_features: Vec<String>,
}

// ── Compiled types ──────────────────────────────────────────────────

/// A recipe resolved against the store's naming convention.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub feature: DerivedFeature,
    /// Stored base feature names, suffixed with `_prob`.
    pub base_features: Vec<String>,
}

impl Recipe {
    pub fn new(feature: DerivedFeature, bare_names: &[String]) -> Self {
        Self {
            feature,
            base_features: bare_names
                .iter()
                .map(|name| format!("{name}{PROB_SUFFIX}"))
                .collect(),
        }
    }

    /// Recipe length N: a slice is valid only if it holds `0 < n <= N` values.
    pub fn len(&self) -> usize {
        self.base_features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base_features.is_empty()
    }

    /// Names to load for one run: every base feature plus the derived
    /// feature itself, so its previously stored value is read back.
    pub fn load_names(&self) -> Vec<String> {
        let mut names = self.base_features.clone();
        names.push(self.feature.as_str().to_string());
        names
    }
}

/// Recipes for both derived features, validated.
#[derive(Debug, Clone)]
pub struct CompiledRecipes {
    recipes: HashMap<DerivedFeature, Recipe>,
}

impl CompiledRecipes {
    pub fn get(&self, feature: DerivedFeature) -> Option<&Recipe> {
        self.recipes.get(&feature)
    }

    /// Build directly from compiled recipes (one per derived feature).
    pub fn from_recipes(recipes: impl IntoIterator<Item = Recipe>) -> Result<Self, LikelihoodError> {
        let recipes: HashMap<DerivedFeature, Recipe> =
            recipes.into_iter().map(|r| (r.feature, r)).collect();
        for feature in DerivedFeature::ALL {
            match recipes.get(&feature) {
                None => return Err(LikelihoodError::MissingRecipe(feature.to_string())),
                Some(r) if r.is_empty() => {
                    return Err(LikelihoodError::EmptyRecipe(feature.to_string()))
                }
                Some(_) => {}
            }
        }
        Ok(Self { recipes })
    }
}

impl RecipeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, LikelihoodError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, LikelihoodError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Resolve the derived feature recipes, failing if either is missing
    /// or empty.
    pub fn compile(&self) -> Result<CompiledRecipes, LikelihoodError> {
        let mut recipes = Vec::new();
        for (name, spec) in &self.features {
            match name.parse::<DerivedFeature>() {
                Ok(feature) => recipes.push(Recipe::new(feature, &spec.base_features)),
                Err(_) => debug!(feature = %name, "recipe not handled by likelihood engine"),
            }
        }
        CompiledRecipes::from_recipes(recipes)
    }
}
