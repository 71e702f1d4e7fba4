//! Module and field definitions as stored in the catalog and as submitted by callers.

use crate::error::AppError;
use crate::types::DataType;
use serde::{Deserialize, Serialize};

/// System columns every module table carries, in physical order after the id.
pub const COL_ID: &str = "Id";
pub const COL_STATE: &str = "State";
pub const COL_CREATED_AT: &str = "CreatedAt";
pub const COL_MODIFIED_AT: &str = "ModifiedAt";
pub const COL_CREATED_BY: &str = "CreatedBy";
pub const COL_MODIFIED_BY: &str = "ModifiedBy";

pub const SYSTEM_COLUMNS: [&str; 6] = [
    COL_ID,
    COL_STATE,
    COL_CREATED_AT,
    COL_MODIFIED_AT,
    COL_CREATED_BY,
    COL_MODIFIED_BY,
];

/// Lifecycle state shared by modules, fields, lists, list values, roles and records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Active,
    Inactive,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "Active",
            Status::Inactive => "Inactive",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Status::Active),
            "Inactive" => Ok(Status::Inactive),
            _ => Err(AppError::Validation(format!("invalid state: {}", s))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleKind {
    Principal,
    Secondary,
    Independent,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Principal => "Principal",
            ModuleKind::Secondary => "Secondary",
            ModuleKind::Independent => "Independent",
        }
    }
}

impl std::str::FromStr for ModuleKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Principal" => Ok(ModuleKind::Principal),
            "Secondary" => Ok(ModuleKind::Secondary),
            "Independent" => Ok(ModuleKind::Independent),
            _ => Err(AppError::Validation(format!("invalid module kind: {}", s))),
        }
    }
}

/// One field as submitted in a module definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub visible_in_grid: bool,
    #[serde(default)]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// A module definition as submitted to create or update.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    pub kind: ModuleKind,
    #[serde(default)]
    pub parent_module_id: Option<i64>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default)]
    pub state: Status,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub name: String,
    /// Derived from `name` at creation and on rename only.
    pub table_name: String,
    pub kind: ModuleKind,
    pub parent_module_id: Option<i64>,
    pub icon: Option<String>,
    pub display_order: i32,
    pub state: Status,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: i64,
    pub module_id: i64,
    pub name: String,
    /// Fixed once the column exists; display renames never touch it.
    pub column_name: String,
    pub data_type: DataType,
    pub order: i32,
    pub visible: bool,
    pub visible_in_grid: bool,
    pub required: bool,
    pub state: Status,
}

/// Field metadata for the presentation layer, with the referenced list's name resolved.
#[derive(Clone, Debug, Serialize)]
pub struct FieldView {
    #[serde(flatten)]
    pub field: FieldDefinition,
    pub list_name: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ModuleDetail {
    #[serde(flatten)]
    pub module: Module,
    pub fields: Vec<FieldView>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ModuleFilter {
    #[serde(default)]
    pub kind: Option<ModuleKind>,
    #[serde(default)]
    pub state: Option<Status>,
    #[serde(default)]
    pub parent_module_id: Option<i64>,
    #[serde(default)]
    pub name_contains: Option<String>,
}
