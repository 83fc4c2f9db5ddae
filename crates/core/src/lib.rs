pub mod config;
pub mod error;
pub mod feature;
pub mod recipe;

pub use config::{Config, EngineConfig, OverflowPolicy, PostgresConfig};
pub use error::*;
pub use feature::*;
pub use recipe::{CompiledRecipes, Recipe, RecipeConfig};
