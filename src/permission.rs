//! Role-based access to modules.
//!
//! Roles come from the actor's role names; role state and per-module permission
//! rows are read from the catalog on every check. Roles combine with OR: any active
//! role granting the capability is enough. The Administrator role bypasses checks.

use crate::actor::Actor;
use crate::audit::{AuditAction, AuditRecorder};
use crate::catalog::types::Status;
use crate::error::{AppError, StorageContext};
use crate::state::AppState;
use crate::store::{MODULES_TABLE, PERMISSIONS_TABLE, ROLES_TABLE};
use serde::{Deserialize, Serialize};

pub const ADMINISTRATOR_ROLE: &str = "Administrator";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    View,
    ViewGrouped,
    Add,
    Modify,
    Delete,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::View => "view",
            Capability::ViewGrouped => "view grouped",
            Capability::Add => "add",
            Capability::Modify => "modify",
            Capability::Delete => "delete",
        }
    }
}

/// Capability flags of one role on one module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Grants {
    #[serde(default)]
    pub can_view: bool,
    #[serde(default)]
    pub can_view_grouped: bool,
    #[serde(default)]
    pub can_add: bool,
    #[serde(default)]
    pub can_modify: bool,
    #[serde(default)]
    pub can_delete: bool,
}

impl Grants {
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::View => self.can_view,
            Capability::ViewGrouped => self.can_view_grouped,
            Capability::Add => self.can_add,
            Capability::Modify => self.can_modify,
            Capability::Delete => self.can_delete,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Permission {
    pub role_id: i64,
    pub module_id: i64,
    #[serde(flatten)]
    pub grants: Grants,
}

#[derive(Clone, Debug, Serialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub state: Status,
    pub audit_access: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub audit_access: bool,
}

/// One of the actor's active roles, with its permission row on the module if any.
#[derive(Clone, Debug)]
pub struct RoleGrant {
    pub role_name: String,
    pub grants: Option<Grants>,
}

/// Pure decision over the actor's active roles.
pub fn evaluate(roles: &[RoleGrant], capability: Capability) -> bool {
    if roles
        .iter()
        .any(|r| r.role_name.eq_ignore_ascii_case(ADMINISTRATOR_ROLE))
    {
        return true;
    }
    roles
        .iter()
        .filter_map(|r| r.grants)
        .any(|g| g.allows(capability))
}

pub struct PermissionGate;

impl PermissionGate {
    /// Whether `actor` may perform `capability` on `module_id`.
    pub async fn authorize(
        state: &AppState,
        actor: &Actor,
        module_id: i64,
        capability: Capability,
    ) -> Result<bool, AppError> {
        let roles = Self::role_grants(state, actor, Some(module_id)).await?;
        let allowed = evaluate(&roles, capability);
        tracing::debug!(actor = actor.id, module_id, capability = capability.as_str(), allowed, "authorize");
        Ok(allowed)
    }

    pub async fn require(
        state: &AppState,
        actor: &Actor,
        module_id: i64,
        module_name: &str,
        capability: Capability,
    ) -> Result<(), AppError> {
        if Self::authorize(state, actor, module_id, capability).await? {
            Ok(())
        } else {
            Err(AppError::PermissionDenied(format!(
                "{} on {}",
                capability.as_str(),
                module_name
            )))
        }
    }

    pub async fn is_administrator(state: &AppState, actor: &Actor) -> Result<bool, AppError> {
        let roles = Self::role_grants(state, actor, None).await?;
        Ok(roles
            .iter()
            .any(|r| r.role_name.eq_ignore_ascii_case(ADMINISTRATOR_ROLE)))
    }

    /// Catalog changes (modules, lists, roles) are reserved for administrators.
    pub async fn require_administrator(
        state: &AppState,
        actor: &Actor,
        what: &str,
    ) -> Result<(), AppError> {
        if Self::is_administrator(state, actor).await? {
            Ok(())
        } else {
            Err(AppError::PermissionDenied(format!("{} requires {}", what, ADMINISTRATOR_ROLE)))
        }
    }

    /// Administrators, or any active role flagged with audit access.
    pub async fn can_view_audit(state: &AppState, actor: &Actor) -> Result<bool, AppError> {
        let keys = actor.role_keys();
        if keys.is_empty() {
            return Ok(false);
        }
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE state = 'Active' AND lower(name) = ANY($1) \
             AND (audit_access OR lower(name) = lower($2)))",
            state.sys_table(ROLES_TABLE)
        );
        state
            .bounded("check audit access", async {
                sqlx::query_scalar::<_, bool>(&sql)
                    .bind(&keys)
                    .bind(ADMINISTRATOR_ROLE)
                    .fetch_one(&state.pool)
                    .await
                    .storage("check audit access")
            })
            .await
    }

    /// Active roles of the actor, each with its permission row on `module_id`.
    async fn role_grants(
        state: &AppState,
        actor: &Actor,
        module_id: Option<i64>,
    ) -> Result<Vec<RoleGrant>, AppError> {
        let keys = actor.role_keys();
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT r.name, p.can_view, p.can_view_grouped, p.can_add, p.can_modify, p.can_delete \
             FROM {} r LEFT JOIN {} p ON p.role_id = r.id AND p.module_id = $2 \
             WHERE r.state = 'Active' AND lower(r.name) = ANY($1)",
            state.sys_table(ROLES_TABLE),
            state.sys_table(PERMISSIONS_TABLE)
        );
        type GrantRow = (
            String,
            Option<bool>,
            Option<bool>,
            Option<bool>,
            Option<bool>,
            Option<bool>,
        );
        let rows: Vec<GrantRow> = state
            .bounded("load role grants", async {
                sqlx::query_as(&sql)
                    .bind(&keys)
                    .bind(module_id)
                    .fetch_all(&state.pool)
                    .await
                    .storage("load role grants")
            })
            .await?;
        Ok(rows
            .into_iter()
            .map(|(role_name, view, grouped, add, modify, delete)| RoleGrant {
                role_name,
                grants: view.map(|can_view| Grants {
                    can_view,
                    can_view_grouped: grouped.unwrap_or(false),
                    can_add: add.unwrap_or(false),
                    can_modify: modify.unwrap_or(false),
                    can_delete: delete.unwrap_or(false),
                }),
            })
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: i64,
    name: String,
    state: String,
    audit_access: bool,
}

impl TryFrom<RoleRow> for Role {
    type Error = AppError;

    fn try_from(r: RoleRow) -> Result<Self, Self::Error> {
        Ok(Role {
            id: r.id,
            name: r.name,
            state: r.state.parse()?,
            audit_access: r.audit_access,
        })
    }
}

/// Role and permission administration.
pub struct RoleStore;

impl RoleStore {
    pub async fn create_role(state: &AppState, actor: &Actor, role: NewRole) -> Result<i64, AppError> {
        PermissionGate::require_administrator(state, actor, "create role").await?;
        let name = role.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("role name is required".into()));
        }
        let id = state
            .bounded("create role", async {
                let table = state.sys_table(ROLES_TABLE);
                let exists: bool = sqlx::query_scalar(&format!(
                    "SELECT EXISTS(SELECT 1 FROM {} WHERE lower(name) = lower($1))",
                    table
                ))
                .bind(&name)
                .fetch_one(&state.pool)
                .await
                .storage("create role")?;
                if exists {
                    return Err(AppError::Conflict(format!("role '{}' already exists", name)));
                }
                sqlx::query_scalar::<_, i64>(&format!(
                    "INSERT INTO {} (name, state, audit_access) VALUES ($1, 'Active', $2) RETURNING id",
                    table
                ))
                .bind(&name)
                .bind(role.audit_access)
                .fetch_one(&state.pool)
                .await
                .storage("create role")
            })
            .await?;
        AuditRecorder::record(state, actor, AuditAction::Add, &format!("Role: {}", name), &format!("Id: {}", id)).await;
        Ok(id)
    }

    pub async fn get_role(state: &AppState, role_id: i64) -> Result<Role, AppError> {
        state
            .bounded("get role", async {
                let row: Option<RoleRow> = sqlx::query_as(&format!(
                    "SELECT id, name, state, audit_access FROM {} WHERE id = $1",
                    state.sys_table(ROLES_TABLE)
                ))
                .bind(role_id)
                .fetch_optional(&state.pool)
                .await
                .storage("get role")?;
                row.ok_or_else(|| AppError::NotFound(format!("role {}", role_id)))?
                    .try_into()
            })
            .await
    }

    pub async fn list_roles(state: &AppState) -> Result<Vec<Role>, AppError> {
        state
            .bounded("list roles", async {
                let rows: Vec<RoleRow> = sqlx::query_as(&format!(
                    "SELECT id, name, state, audit_access FROM {} ORDER BY name",
                    state.sys_table(ROLES_TABLE)
                ))
                .fetch_all(&state.pool)
                .await
                .storage("list roles")?;
                rows.into_iter().map(Role::try_from).collect()
            })
            .await
    }

    pub async fn set_role_state(
        state: &AppState,
        actor: &Actor,
        role_id: i64,
        new_state: Status,
    ) -> Result<(), AppError> {
        PermissionGate::require_administrator(state, actor, "change role").await?;
        let role = Self::get_role(state, role_id).await?;
        if role.name.eq_ignore_ascii_case(ADMINISTRATOR_ROLE) && new_state == Status::Inactive {
            return Err(AppError::Conflict(format!("{} role cannot be deactivated", ADMINISTRATOR_ROLE)));
        }
        state
            .bounded("set role state", async {
                sqlx::query(&format!(
                    "UPDATE {} SET state = $1 WHERE id = $2",
                    state.sys_table(ROLES_TABLE)
                ))
                .bind(new_state.as_str())
                .bind(role_id)
                .execute(&state.pool)
                .await
                .storage("set role state")?;
                Ok(())
            })
            .await?;
        AuditRecorder::record(
            state,
            actor,
            AuditAction::Modify,
            &format!("Role: {}", role.name),
            &format!("State: {}", new_state.as_str()),
        )
        .await;
        Ok(())
    }

    /// Insert or replace the permission row of a role on a module.
    pub async fn set_permission(
        state: &AppState,
        actor: &Actor,
        role_id: i64,
        module_id: i64,
        grants: Grants,
    ) -> Result<(), AppError> {
        PermissionGate::require_administrator(state, actor, "set permission").await?;
        let role = Self::get_role(state, role_id).await?;
        state
            .bounded("set permission", async {
                let module_exists: bool = sqlx::query_scalar(&format!(
                    "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
                    state.sys_table(MODULES_TABLE)
                ))
                .bind(module_id)
                .fetch_one(&state.pool)
                .await
                .storage("set permission")?;
                if !module_exists {
                    return Err(AppError::NotFound(format!("module {}", module_id)));
                }
                sqlx::query(&format!(
                    "INSERT INTO {} (role_id, module_id, can_view, can_view_grouped, can_add, can_modify, can_delete) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7) \
                     ON CONFLICT (role_id, module_id) DO UPDATE SET can_view = EXCLUDED.can_view, \
                     can_view_grouped = EXCLUDED.can_view_grouped, can_add = EXCLUDED.can_add, \
                     can_modify = EXCLUDED.can_modify, can_delete = EXCLUDED.can_delete",
                    state.sys_table(PERMISSIONS_TABLE)
                ))
                .bind(role_id)
                .bind(module_id)
                .bind(grants.can_view)
                .bind(grants.can_view_grouped)
                .bind(grants.can_add)
                .bind(grants.can_modify)
                .bind(grants.can_delete)
                .execute(&state.pool)
                .await
                .storage("set permission")?;
                Ok(())
            })
            .await?;
        AuditRecorder::record(
            state,
            actor,
            AuditAction::Modify,
            &format!("Role: {}", role.name),
            &format!("Permissions on module {}", module_id),
        )
        .await;
        Ok(())
    }

    pub async fn permissions_of(state: &AppState, role_id: i64) -> Result<Vec<Permission>, AppError> {
        state
            .bounded("list permissions", async {
                let rows: Vec<(i64, i64, bool, bool, bool, bool, bool)> = sqlx::query_as(&format!(
                    "SELECT role_id, module_id, can_view, can_view_grouped, can_add, can_modify, can_delete \
                     FROM {} WHERE role_id = $1 ORDER BY module_id",
                    state.sys_table(PERMISSIONS_TABLE)
                ))
                .bind(role_id)
                .fetch_all(&state.pool)
                .await
                .storage("list permissions")?;
                Ok(rows
                    .into_iter()
                    .map(|(role_id, module_id, can_view, can_view_grouped, can_add, can_modify, can_delete)| Permission {
                        role_id,
                        module_id,
                        grants: Grants {
                            can_view,
                            can_view_grouped,
                            can_add,
                            can_modify,
                            can_delete,
                        },
                    })
                    .collect())
            })
            .await
    }
}
