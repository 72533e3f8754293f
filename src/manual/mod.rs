//! Manual Input Governance
//!
//! Field schema, validation and the update coordinator that turns staged
//! edits into one partial update and reconciles against the backend.

pub mod catalog;
pub mod coordinator;
pub mod field;
pub mod validator;

pub use catalog::FieldCatalog;
pub use coordinator::{UpdateCoordinator, UpdateError};
pub use field::{as_of_key, FieldKind, FieldMetadata, ManualInputField, ManualInputsResponse, ManualInputsState};
pub use validator::{validate, ValidatedEntry, ValidationError};
