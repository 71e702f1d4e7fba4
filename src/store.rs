//! Catalog tables (`_sys_*`) and their idempotent creation. All of them live in the
//! schema named by `EngineConfig::schema`, next to the module tables.

use crate::error::AppError;
use crate::ident::{qualified, quoted};
use crate::permission::ADMINISTRATOR_ROLE;
use crate::state::AppState;

pub const MODULES_TABLE: &str = "_sys_modules";
pub const FIELDS_TABLE: &str = "_sys_fields";
pub const LISTS_TABLE: &str = "_sys_lists";
pub const LIST_VALUES_TABLE: &str = "_sys_list_values";
pub const ROLES_TABLE: &str = "_sys_roles";
pub const PERMISSIONS_TABLE: &str = "_sys_permissions";
pub const AUDIT_TABLE: &str = "_sys_audit";

/// CREATE statements in dependency order.
pub fn sys_table_statements(schema: &str) -> Vec<String> {
    let modules = qualified(schema, MODULES_TABLE);
    let fields = qualified(schema, FIELDS_TABLE);
    let lists = qualified(schema, LISTS_TABLE);
    let values = qualified(schema, LIST_VALUES_TABLE);
    let roles = qualified(schema, ROLES_TABLE);
    let permissions = qualified(schema, PERMISSIONS_TABLE);
    let audit = qualified(schema, AUDIT_TABLE);
    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema)),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {modules} (
                id BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
                name TEXT NOT NULL,
                table_name TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                parent_module_id BIGINT REFERENCES {modules} (id),
                icon TEXT,
                display_order INT NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'Active',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                modified_at TIMESTAMPTZ
            )
            "#
        ),
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {modules} (lower(name))",
            quoted("_sys_modules_name_ci")
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {lists} (
                id BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                state TEXT NOT NULL DEFAULT 'Active'
            )
            "#
        ),
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {lists} (lower(name))",
            quoted("_sys_lists_name_ci")
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {values} (
                id BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
                list_id BIGINT NOT NULL REFERENCES {lists} (id) ON DELETE CASCADE,
                label TEXT NOT NULL,
                sort_order INT NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'Active'
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {fields} (
                id BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
                module_id BIGINT NOT NULL REFERENCES {modules} (id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                column_name TEXT NOT NULL,
                data_type TEXT NOT NULL,
                text_length INT,
                list_id BIGINT REFERENCES {lists} (id),
                sort_order INT NOT NULL DEFAULT 0,
                visible BOOLEAN NOT NULL DEFAULT TRUE,
                visible_in_grid BOOLEAN NOT NULL DEFAULT TRUE,
                required BOOLEAN NOT NULL DEFAULT FALSE,
                state TEXT NOT NULL DEFAULT 'Active',
                UNIQUE (module_id, column_name)
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {roles} (
                id BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
                name TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'Active',
                audit_access BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#
        ),
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {roles} (lower(name))",
            quoted("_sys_roles_name_ci")
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {permissions} (
                role_id BIGINT NOT NULL REFERENCES {roles} (id) ON DELETE CASCADE,
                module_id BIGINT NOT NULL REFERENCES {modules} (id) ON DELETE CASCADE,
                can_view BOOLEAN NOT NULL DEFAULT FALSE,
                can_view_grouped BOOLEAN NOT NULL DEFAULT FALSE,
                can_add BOOLEAN NOT NULL DEFAULT FALSE,
                can_modify BOOLEAN NOT NULL DEFAULT FALSE,
                can_delete BOOLEAN NOT NULL DEFAULT FALSE,
                PRIMARY KEY (role_id, module_id)
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {audit} (
                id BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
                occurred_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                actor_id BIGINT NOT NULL,
                actor_name TEXT NOT NULL,
                action TEXT NOT NULL,
                process TEXT NOT NULL,
                detail TEXT NOT NULL DEFAULT ''
            )
            "#
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {audit} (occurred_at DESC)",
            quoted("_sys_audit_occurred_at")
        ),
    ]
}

/// Create the schema and catalog tables if missing, and seed the Administrator role.
pub async fn ensure_sys_tables(state: &AppState) -> Result<(), AppError> {
    state
        .bounded("ensure catalog tables", async {
            for statement in sys_table_statements(state.schema()) {
                sqlx::query(&statement)
                    .execute(&state.pool)
                    .await
                    .map_err(|e| AppError::ddl("ensure catalog tables", statement.trim(), e))?;
            }
            let roles = state.sys_table(ROLES_TABLE);
            let seed = format!(
                "INSERT INTO {roles} (name, state, audit_access) SELECT $1, 'Active', TRUE \
                 WHERE NOT EXISTS (SELECT 1 FROM {roles} WHERE lower(name) = lower($1))"
            );
            sqlx::query(&seed)
                .bind(ADMINISTRATOR_ROLE)
                .execute(&state.pool)
                .await
                .map_err(|e| AppError::ddl("seed administrator role", &seed, e))?;
            tracing::info!(schema = %state.schema(), "catalog tables ready");
            Ok(())
        })
        .await
}
