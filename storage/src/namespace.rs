//! Namespacing rules: all managed tables live under the logical
//! namespace `neuract`. Postgres/SQL Server get a true schema
//! (`neuract.<table>`); SQLite/MySQL are schema-less
//! (`neuract__<table>`).

use crate::types::Provider;

pub fn physical_table_name(namespace: &str, provider: Provider, table: &str) -> String {
    if provider.has_native_schema() {
        format!("{namespace}.{table}")
    } else {
        format!("{namespace}__{table}")
    }
}

/// Strips the `neuract__` prefix from a discovered table name, leaving
/// schema-qualified names (`neuract.foo`) for the caller to split on
/// `.` itself since those never carry the prefix.
pub fn strip_prefix(namespace: &str, discovered_name: &str) -> String {
    let prefix = format!("{namespace}__");
    discovered_name
        .strip_prefix(&prefix)
        .unwrap_or(discovered_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_uses_schema() {
        assert_eq!(
            physical_table_name("neuract", Provider::Postgres, "lt_panel"),
            "neuract.lt_panel"
        );
    }

    #[test]
    fn sqlite_uses_prefix() {
        assert_eq!(
            physical_table_name("neuract", Provider::Sqlite, "lt_panel"),
            "neuract__lt_panel"
        );
    }

    #[test]
    fn strip_prefix_removes_only_when_present() {
        assert_eq!(strip_prefix("neuract", "neuract__lt_panel"), "lt_panel");
        assert_eq!(strip_prefix("neuract", "lt_panel"), "lt_panel");
    }
}
