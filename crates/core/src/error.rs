use thiserror::Error;

#[derive(Error, Debug)]
pub enum LikelihoodError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Recipe parse error: {0}")]
    RecipeParse(#[from] serde_yaml::Error),

    #[error("No recipe configured for feature: {0}")]
    MissingRecipe(String),

    #[error("Recipe for {0} lists no base features")]
    EmptyRecipe(String),

    #[error("Unknown derived feature: {0}")]
    UnknownFeature(String),

    #[error("Invalid config value for {key}: {value}")]
    InvalidConfig { key: String, value: String },

    #[error("{0}")]
    Other(String),
}
