//! `adminres access`: evaluate a role record against a module and action.
//!
//! The role is read from a JSON file (or `-` for stdin) in whichever schema
//! the backend produced. The answer is printed as `allow` or `deny`; with
//! `--all`, the granted actions are listed instead.

use anyhow::Result;
use std::path::Path;

use admin_resilience_core::permissions::{allowed_actions, detect_schema, has_access_named, PermissionSchema};

use crate::config::Config;
use crate::inspect::read_json_input;

pub fn run_access(
    config: &Config,
    role_path: &Path,
    module: &str,
    action: Option<&str>,
    all: bool,
) -> Result<()> {
    let role = read_json_input(role_path)?;
    let policy = config.permissions.policy();

    if let PermissionSchema::Missing = detect_schema(&role) {
        tracing::warn!(path = %role_path.display(), "role record carries no permissions; denying everything");
    }

    if all || action.is_none() {
        let actions = allowed_actions(&role, module, &policy);
        if actions.is_empty() {
            println!("(none)");
        }
        for action in actions {
            println!("{}", action);
        }
        return Ok(());
    }

    let granted = action.is_some_and(|a| has_access_named(&role, module, a, &policy));
    println!("{}", if granted { "allow" } else { "deny" });
    Ok(())
}
