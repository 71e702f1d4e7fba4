//! Module metadata: definitions, validation, and the catalog store.

pub mod resolved;
pub mod store;
pub mod types;
pub mod validator;

pub use resolved::{ParentLink, ResolvedModule};
pub use store::ModuleCatalog;
pub use types::{
    FieldDefinition, FieldSpec, FieldView, Module, ModuleDetail, ModuleFilter, ModuleKind,
    ModuleSpec, Status,
};
