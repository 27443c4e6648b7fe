use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-table access rule: which operations the planner may touch, and which
/// columns each write kind is allowed to set.
///
/// The whitelist is loaded once at startup and never mutated afterwards; the
/// table name is the map key, so names are unique by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRule {
    /// Whether SELECTs against this table are permitted
    #[serde(default = "default_true")]
    pub read: bool,
    /// Columns an insert may provide
    #[serde(default)]
    pub insert: Vec<String>,
    /// Columns an update may set
    #[serde(default)]
    pub update: Vec<String>,
    /// Deletes are never generated; kept so the rules summary can say so
    #[serde(default)]
    pub delete: bool,
}

fn default_true() -> bool {
    true
}

impl TableRule {
    pub fn allows_insert(&self, column: &str) -> bool {
        self.insert.iter().any(|c| c == column)
    }

    pub fn allows_update(&self, column: &str) -> bool {
        self.update.iter().any(|c| c == column)
    }
}

/// The full whitelist, keyed by table name
pub type WriteRules = BTreeMap<String, TableRule>;

/// Built-in demo whitelist, overridable via configuration
pub fn default_rules() -> WriteRules {
    let mut rules = WriteRules::new();
    rules.insert(
        "sales".to_string(),
        TableRule {
            read: true,
            insert: vec![
                "item_name".to_string(),
                "quantity".to_string(),
                "sold_at".to_string(),
            ],
            update: vec!["quantity".to_string(), "sold_at".to_string()],
            delete: false,
        },
    );
    rules.insert(
        "products".to_string(),
        TableRule {
            read: true,
            insert: vec![
                "name".to_string(),
                "sku".to_string(),
                "price".to_string(),
                "description".to_string(),
                "category".to_string(),
                "stock".to_string(),
            ],
            update: vec![
                "price".to_string(),
                "description".to_string(),
                "category".to_string(),
                "stock".to_string(),
                "name".to_string(),
                "sku".to_string(),
            ],
            delete: false,
        },
    );
    rules
}

/// One line per table, fed to the planner so it knows what it may touch
pub fn rules_summary(rules: &WriteRules) -> String {
    rules
        .iter()
        .map(|(table, rule)| {
            format!(
                "{}: read={}, insert=[{}], update=[{}], delete={}",
                table,
                if rule.read { "on" } else { "off" },
                rule.insert.join(","),
                rule.update.join(","),
                if rule.delete { "on" } else { "off" },
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_cover_demo_tables() {
        let rules = default_rules();
        assert!(rules.contains_key("products"));
        assert!(rules.contains_key("sales"));
        assert!(rules["products"].allows_insert("sku"));
        assert!(rules["products"].allows_update("price"));
        assert!(!rules["sales"].allows_update("item_name"));
    }

    #[test]
    fn test_rules_summary_format() {
        let rules = default_rules();
        let summary = rules_summary(&rules);
        assert!(summary.contains("products: read=on"));
        assert!(summary.contains("update=[quantity,sold_at]"));
        assert!(summary.contains("delete=off"));
    }
}
