//! Permission evaluation across both role encodings.
//!
//! Role records arrive from the roles service in one of two shapes:
//!
//! - **Structured**: a map from module name to an action → boolean map,
//!   either directly under `permissions`, as the first element of a
//!   `permissions` array, or nested once more under a `permissions` key.
//!
//!   ```json
//!   {"permissions": [{"campaign": {"view": true, "add": false}}]}
//!   ```
//!
//! - **Legacy**: a flat list of `module.action` strings, with `module.*` and
//!   `*` wildcards. Entries may be bare strings or objects carrying the
//!   string under `name`, `permission`, `code`, `key`, or `slug`. Such
//!   objects stay legacy even when they also hold nested join rows.
//!
//!   ```json
//!   {"permissions": ["campaign.view", {"name": "rental.*"}]}
//!   ```
//!
//! [`has_access`] detects the shape and answers uniformly. Anything it
//! cannot interpret denies.
//!
//! In the structured encoding, `view: false` on a module denies every other
//! action on it regardless of that action's own flag.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::Serialize;
use serde_json::{Map, Value};

/// Object keys that may carry a legacy permission string.
const LEGACY_STRING_KEYS: &[&str] = &["name", "permission", "code", "key", "slug"];

/// Singular/plural module names the backend has used interchangeably.
const DEFAULT_ALIASES: &[(&str, &[&str])] = &[
    ("organization", &["organizations", "org", "orgs"]),
    ("property", &["properties"]),
    ("rental", &["rentals"]),
    ("campaign", &["campaigns"]),
    ("user", &["users"]),
    ("role", &["roles"]),
];

/// A requested operation on a module.
///
/// `create` is accepted as an external name and maps to [`Action::Add`],
/// the name the structured encoding uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Add,
    Edit,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::View, Action::Add, Action::Edit, Action::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Add => "add",
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }

    /// Names this action may appear under in either encoding, internal first.
    fn names(self) -> &'static [&'static str] {
        match self {
            Action::View => &["view"],
            Action::Add => &["add", "create"],
            Action::Edit => &["edit"],
            Action::Delete => &["delete"],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(Action::View),
            "add" | "create" => Ok(Action::Add),
            "edit" => Ok(Action::Edit),
            "delete" => Ok(Action::Delete),
            other => bail!(
                "Unknown action: '{}'. Use view, add, create, edit, or delete.",
                other
            ),
        }
    }
}

/// Module-name aliases used when probing the structured encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionPolicy {
    aliases: HashMap<String, Vec<String>>,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        let mut policy = Self::empty();
        for (module, names) in DEFAULT_ALIASES {
            policy.add_aliases(module, names.iter().copied());
        }
        policy
    }
}

impl PermissionPolicy {
    /// A policy with no aliases: modules match only by their exact name.
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    /// Register `names` as aliases of `module`, in both directions.
    pub fn add_aliases<'a, I>(&mut self, module: &str, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            if name == module {
                continue;
            }
            push_unique(self.aliases.entry(module.to_string()).or_default(), name);
            push_unique(self.aliases.entry(name.to_string()).or_default(), module);
        }
    }

    /// The requested name followed by its aliases, in registration order.
    pub fn names_for<'a>(&'a self, module: &'a str) -> Vec<&'a str> {
        let mut names = vec![module];
        if let Some(aliases) = self.aliases.get(module) {
            for alias in aliases {
                if !names.contains(&alias.as_str()) {
                    names.push(alias);
                }
            }
        }
        names
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

/// The encoding detected in a role record.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionSchema<'a> {
    /// Module name → action flags.
    Structured(&'a Map<String, Value>),
    /// Flat permission strings, in record order.
    Legacy(Vec<&'a str>),
    /// No `permissions`, or a value of the wrong type.
    Missing,
}

/// Detect which encoding `role` uses. A bare array is treated as the
/// permissions list itself.
pub fn detect_schema(role: &Value) -> PermissionSchema<'_> {
    let permissions = match role {
        Value::Array(_) => role,
        Value::Object(map) => match map.get("permissions") {
            Some(p) => p,
            None => return PermissionSchema::Missing,
        },
        _ => return PermissionSchema::Missing,
    };
    classify(permissions, false)
}

fn classify(permissions: &Value, nested: bool) -> PermissionSchema<'_> {
    match permissions {
        Value::Object(map) => {
            if !nested {
                if let Some(inner) = map.get("permissions") {
                    return classify(inner, true);
                }
            }
            PermissionSchema::Structured(map)
        }
        Value::Array(entries) => {
            if let Some(Value::Object(first)) = entries.first() {
                if !nested {
                    if let Some(inner @ Value::Object(_)) = first.get("permissions") {
                        return classify(inner, true);
                    }
                }
                let carries_legacy_string = LEGACY_STRING_KEYS
                    .iter()
                    .any(|k| first.get(*k).is_some_and(Value::is_string));
                if !carries_legacy_string && first.values().any(Value::is_object) {
                    return PermissionSchema::Structured(first);
                }
            }
            PermissionSchema::Legacy(entries.iter().filter_map(legacy_string).collect())
        }
        _ => PermissionSchema::Missing,
    }
}

fn legacy_string(entry: &Value) -> Option<&str> {
    match entry {
        Value::String(s) => Some(s.trim()),
        Value::Object(obj) => LEGACY_STRING_KEYS
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(str::trim),
        _ => None,
    }
}

/// Whether `role` grants `action` on `module`, using the default aliases.
pub fn has_access(role: &Value, module: &str, action: Action) -> bool {
    has_access_with(role, module, action, &PermissionPolicy::default())
}

/// Whether `role` grants `action` on `module`, resolving module aliases
/// through `policy`.
pub fn has_access_with(
    role: &Value,
    module: &str,
    action: Action,
    policy: &PermissionPolicy,
) -> bool {
    let module = module.trim();
    if module.is_empty() {
        return false;
    }

    let granted = match detect_schema(role) {
        PermissionSchema::Structured(modules) => structured_access(modules, module, action, policy),
        PermissionSchema::Legacy(entries) => policy
            .names_for(module)
            .into_iter()
            .any(|name| legacy_access(&entries, name, action)),
        PermissionSchema::Missing => false,
    };

    tracing::debug!(module, action = %action, granted, "permission check");
    granted
}

/// Like [`has_access_with`], taking the action by name. Unknown action names
/// deny.
pub fn has_access_named(
    role: &Value,
    module: &str,
    action: &str,
    policy: &PermissionPolicy,
) -> bool {
    match action.parse::<Action>() {
        Ok(action) => has_access_with(role, module, action, policy),
        Err(err) => {
            tracing::debug!(module, error = %err, "denying unknown action");
            false
        }
    }
}

/// Every action `role` grants on `module`, in [`Action::ALL`] order.
pub fn allowed_actions(role: &Value, module: &str, policy: &PermissionPolicy) -> Vec<Action> {
    Action::ALL
        .into_iter()
        .filter(|action| has_access_with(role, module, *action, policy))
        .collect()
}

fn structured_access(
    modules: &Map<String, Value>,
    module: &str,
    action: Action,
    policy: &PermissionPolicy,
) -> bool {
    let flags = match policy
        .names_for(module)
        .into_iter()
        .find_map(|name| modules.get(name))
    {
        Some(Value::Object(flags)) => flags,
        _ => return false,
    };

    if action != Action::View && flags.get("view") == Some(&Value::Bool(false)) {
        return false;
    }

    action
        .names()
        .iter()
        .find_map(|name| flags.get(*name))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn legacy_access(entries: &[&str], module: &str, action: Action) -> bool {
    let wildcard = format!("{}.*", module);
    let exact: Vec<String> = action
        .names()
        .iter()
        .map(|name| format!("{}.{}", module, name))
        .collect();

    entries
        .iter()
        .any(|entry| *entry == "*" || *entry == wildcard || exact.iter().any(|e| e == entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn view_false_gates_other_actions() {
        let role = json!({"permissions": [{"campaign": {"view": false, "add": true}}]});
        assert!(!has_access(&role, "campaign", Action::Add));
        assert!(!has_access(&role, "campaign", Action::View));
    }

    #[test]
    fn structured_flags_are_read_directly() {
        let role = json!({"permissions": [{"campaign": {"view": true, "add": true, "delete": false}}]});
        assert!(has_access(&role, "campaign", Action::View));
        assert!(has_access(&role, "campaign", Action::Add));
        assert!(!has_access(&role, "campaign", Action::Delete));
        // Missing flag denies.
        assert!(!has_access(&role, "campaign", Action::Edit));
    }

    #[test]
    fn missing_view_flag_does_not_gate() {
        let role = json!({"permissions": {"rental": {"edit": true}}});
        assert!(has_access(&role, "rental", Action::Edit));
        assert!(!has_access(&role, "rental", Action::View));
    }

    #[test]
    fn create_maps_to_add() {
        let role = json!({"permissions": [{"property": {"view": true, "add": true}}]});
        assert!(has_access_named(&role, "property", "create", &PermissionPolicy::default()));

        let create_flag = json!({"permissions": [{"property": {"view": true, "create": true}}]});
        assert!(has_access(&create_flag, "property", Action::Add));
    }

    #[test]
    fn structured_nested_under_permissions_key() {
        let role = json!({"permissions": {"permissions": {"campaign": {"view": true}}}});
        assert!(has_access(&role, "campaign", Action::View));

        let in_array = json!({"permissions": [{"permissions": {"campaign": {"view": true}}}]});
        assert!(has_access(&in_array, "campaign", Action::View));
    }

    #[test]
    fn aliases_resolve_historical_module_names() {
        let role = json!({"permissions": [{"campaigns": {"view": true, "edit": true}}]});
        assert!(has_access(&role, "campaign", Action::Edit));

        let singular = json!({"permissions": [{"organization": {"view": true}}]});
        assert!(has_access(&singular, "organizations", Action::View));

        assert!(!has_access_with(&role, "campaign", Action::Edit, &PermissionPolicy::empty()));
    }

    #[test]
    fn first_present_alias_wins() {
        let role = json!({"permissions": [{
            "campaign": {"view": false},
            "campaigns": {"view": true, "edit": true},
        }]});
        assert!(!has_access(&role, "campaign", Action::Edit));
        assert!(has_access(&role, "campaigns", Action::Edit));
    }

    #[test]
    fn non_boolean_flags_deny() {
        let role = json!({"permissions": [{"campaign": {"view": "true", "add": 1}}]});
        assert!(!has_access(&role, "campaign", Action::View));
        assert!(!has_access(&role, "campaign", Action::Add));

        let not_a_map = json!({"permissions": {"campaign": true, "rental": {"view": true}}});
        assert!(!has_access(&not_a_map, "campaign", Action::View));
    }

    #[test]
    fn legacy_wildcards() {
        let role = json!({"permissions": ["campaign.*"]});
        assert!(has_access(&role, "campaign", Action::Delete));
        assert!(!has_access(&role, "rental", Action::View));

        let global = json!({"permissions": ["*"]});
        assert!(has_access(&global, "anything", Action::Edit));
    }

    #[test]
    fn legacy_exact_and_object_entries() {
        let role = json!({"permissions": [
            "rental.view",
            {"name": "rental.create"},
            {"code": " property.edit "},
            42,
        ]});
        assert!(has_access(&role, "rental", Action::View));
        assert!(has_access(&role, "rental", Action::Add));
        assert!(!has_access(&role, "rental", Action::Delete));
        assert!(has_access(&role, "property", Action::Edit));
        assert!(!has_access(&role, "campaign", Action::View));
    }

    #[test]
    fn legacy_has_no_view_gate() {
        let role = json!({"permissions": ["campaign.delete"]});
        assert!(has_access(&role, "campaign", Action::Delete));
        assert!(!has_access(&role, "campaign", Action::View));
    }

    #[test]
    fn legacy_row_with_nested_join_object_stays_legacy() {
        let role = json!({"permissions": [
            {"id": 3, "name": "campaign.view", "guard_name": "web", "pivot": {"role_id": 1, "permission_id": 3}},
            {"id": 4, "name": "campaign.edit", "guard_name": "web", "pivot": {"role_id": 1, "permission_id": 4}},
        ]});
        assert!(matches!(
            detect_schema(&role),
            PermissionSchema::Legacy(ref e) if e == &vec!["campaign.view", "campaign.edit"]
        ));
        assert!(has_access(&role, "campaign", Action::View));
        assert!(has_access(&role, "campaign", Action::Edit));
        assert!(!has_access(&role, "campaign", Action::Delete));
    }

    #[test]
    fn legacy_entries_resolve_aliases() {
        let role = json!({"permissions": ["organizations.view", "org.*"]});
        assert!(has_access(&role, "organization", Action::View));
        assert!(has_access(&role, "organization", Action::Delete));
        assert!(!has_access(&role, "campaign", Action::View));
    }

    #[test]
    fn empty_or_malformed_permissions_deny() {
        assert!(!has_access(&json!({"permissions": []}), "campaign", Action::View));
        assert!(!has_access(&json!({}), "campaign", Action::View));
        assert!(!has_access(&json!({"permissions": "campaign.*"}), "campaign", Action::View));
        assert!(!has_access(&json!({"permissions": null}), "campaign", Action::View));
        assert!(!has_access(&json!("admin"), "campaign", Action::View));
        assert!(!has_access(&json!({"permissions": ["*"]}), "  ", Action::View));
    }

    #[test]
    fn bare_array_role_is_the_permission_list() {
        assert!(has_access(&json!(["campaign.view"]), "campaign", Action::View));
    }

    #[test]
    fn unknown_action_name_denies() {
        let role = json!({"permissions": ["*"]});
        assert!(!has_access_named(&role, "campaign", "approve", &PermissionPolicy::default()));
        assert!("approve".parse::<Action>().is_err());
        assert_eq!(" Create ".parse::<Action>().unwrap(), Action::Add);
    }

    #[test]
    fn allowed_actions_lists_grants_in_order() {
        let role = json!({"permissions": [{"rental": {"view": true, "edit": true, "add": false}}]});
        assert_eq!(
            allowed_actions(&role, "rental", &PermissionPolicy::default()),
            vec![Action::View, Action::Edit]
        );
    }

    #[test]
    fn detect_schema_shapes() {
        assert!(matches!(
            detect_schema(&json!({"permissions": ["a.view"]})),
            PermissionSchema::Legacy(ref e) if e == &vec!["a.view"]
        ));
        assert!(matches!(
            detect_schema(&json!({"permissions": [{"a": {"view": true}}]})),
            PermissionSchema::Structured(_)
        ));
        assert_eq!(detect_schema(&json!({"role": "x"})), PermissionSchema::Missing);
    }

    #[test]
    fn names_for_puts_requested_name_first() {
        let mut policy = PermissionPolicy::empty();
        policy.add_aliases("listing", ["rental", "rentals"]);
        assert_eq!(policy.names_for("listing"), vec!["listing", "rental", "rentals"]);
        assert_eq!(policy.names_for("rentals"), vec!["rentals", "listing"]);
        assert_eq!(policy.names_for("unknown"), vec!["unknown"]);
    }
}
