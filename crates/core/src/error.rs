use crate::types::DbId;

/// Error taxonomy for every data-access operation.
///
/// Capability absence is deliberately not represented here: a missing
/// optional column selects a degraded code path instead of failing.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A mutation was attempted without a current session.
    #[error("Authentication required")]
    AuthRequired,

    /// An owner-scoped mutation matched no rows. The record may not exist
    /// or may belong to someone else; the two cases are indistinguishable.
    #[error("{entity} {id} not found or not owned by the current session")]
    NotFoundOrForbidden { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Any transport or database failure, carrying the underlying message.
    #[error("Repository error: {0}")]
    Repository(String),
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CoreError::Validation(errors.to_string())
    }
}
