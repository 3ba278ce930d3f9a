// ============================================================================
// Employee Commands
// ============================================================================

#[derive(Debug, Clone)]
pub enum EmployeeCommand {
    RegisterEmployee {
        document_id: String,
        first_name: String,
        last_name: String,
        position: String,
        email: Option<String>,
    },
    UpdateProfile {
        first_name: Option<String>,
        last_name: Option<String>,
        position: Option<String>,
        email: Option<String>,
    },
    Deactivate {
        reason: String,
    },
    Reactivate,
    DeleteEmployee,
}
