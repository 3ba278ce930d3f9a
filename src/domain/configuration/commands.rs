use std::collections::BTreeMap;

// ============================================================================
// Configuration Commands
// ============================================================================

#[derive(Debug, Clone)]
pub enum ConfigurationCommand {
    Initialize {
        company_name: String,
        settings: BTreeMap<String, String>,
    },
    ChangeSetting {
        key: String,
        value: String,
    },
    RemoveSetting {
        key: String,
    },
}
