//! Metamodule: runtime-defined modules over PostgreSQL.
//!
//! Administrators define modules (record types) and their fields; the engine keeps a
//! physical table per module in step with the definition, builds parameterized CRUD
//! against it, checks role permissions and keeps an audit trail.

pub mod actor;
pub mod audit;
pub mod catalog;
pub mod document;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod ident;
pub mod lists;
pub mod migration;
pub mod permission;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;
pub mod types;

pub use actor::Actor;
pub use audit::{AuditAction, AuditEntry, AuditFilter, AuditRecorder};
pub use catalog::{
    FieldDefinition, FieldSpec, FieldView, Module, ModuleCatalog, ModuleDetail, ModuleFilter,
    ModuleKind, ModuleSpec, Status,
};
pub use document::{DocumentStore, Upload};
pub use error::AppError;
pub use lists::{List, ListDetail, ListRegistry, ListValue, NewList, NewListValue};
pub use permission::{Capability, Grants, NewRole, Permission, PermissionGate, Role, RoleStore, ADMINISTRATOR_ROLE};
pub use response::{success_created, success_many, success_one};
pub use routes::{catalog_routes, common_routes, common_routes_with_ready, record_routes};
pub use service::{GroupCount, ListQuery, ReadMode, RecordService};
pub use settings::{connect, ensure_database_exists, EngineConfig};
pub use state::AppState;
pub use store::ensure_sys_tables;
pub use types::DataType;
