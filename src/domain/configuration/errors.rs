// ============================================================================
// Configuration Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Configuration is already initialized")]
    AlreadyInitialized,

    #[error("Configuration has not been initialized")]
    NotInitialized,

    #[error("Company name cannot be empty")]
    EmptyCompanyName,

    #[error("Setting key cannot be empty")]
    EmptyKey,

    #[error("Setting '{0}' does not exist")]
    UnknownSetting(String),

    #[error("Setting '{0}' already has that value")]
    Unchanged(String),
}
