use thiserror::Error;

/// Startup configuration problems. Only a missing WMS credential is fatal;
/// everything else degrades (default roster, empty special-SKU set) and is
/// reported through logs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing configuration: {what}")]
    Missing { what: String },

    #[error("invalid configuration: {what}")]
    Invalid { what: String },
}
