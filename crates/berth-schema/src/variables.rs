use serde::{Deserialize, Serialize};

/// Scope a project or environment variable is exposed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableScope {
    Build,
    #[default]
    Global,
    Runtime,
    InternalSystem,
    ContainerRegistry,
    InternalContainerRegistry,
}

/// Scopes visible while the deployment model is being compiled.
pub const BUILD_SCOPES: &[VariableScope] = &[
    VariableScope::Build,
    VariableScope::Global,
    VariableScope::InternalSystem,
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub scope: VariableScope,
}

impl EnvironmentVariable {
    pub fn new(name: &str, value: &str, scope: VariableScope) -> Self {
        Self {
            name: name.to_owned(),
            value: value.to_owned(),
            scope,
        }
    }
}

/// Merge project-level and environment-level variables.
///
/// Environment entries replace project entries of the same name in place;
/// entries in the `internal_system` scope are never replaced.
pub fn merge_variables(
    project: &[EnvironmentVariable],
    environment: &[EnvironmentVariable],
) -> Vec<EnvironmentVariable> {
    let mut merged: Vec<EnvironmentVariable> = Vec::with_capacity(project.len() + environment.len());
    for var in project.iter().chain(environment) {
        match merged.iter_mut().find(|m| m.name == var.name) {
            Some(existing) if existing.scope == VariableScope::InternalSystem => {}
            Some(existing) => *existing = var.clone(),
            None => merged.push(var.clone()),
        }
    }
    merged
}

/// Look a variable up by name, restricted to the given scopes.
pub fn find_variable<'a>(
    variables: &'a [EnvironmentVariable],
    name: &str,
    scopes: &[VariableScope],
) -> Option<&'a EnvironmentVariable> {
    variables
        .iter()
        .find(|v| v.name == name && scopes.contains(&v.scope))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_replaces_project_value() {
        let project = vec![
            EnvironmentVariable::new("A", "project", VariableScope::Build),
            EnvironmentVariable::new("B", "keep", VariableScope::Global),
        ];
        let env = vec![EnvironmentVariable::new("A", "env", VariableScope::Global)];
        let merged = merge_variables(&project, &env);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].value, "env");
        assert_eq!(merged[0].scope, VariableScope::Global);
        assert_eq!(merged[1].value, "keep");
    }

    #[test]
    fn internal_system_is_not_replaced() {
        let project = vec![EnvironmentVariable::new(
            "LAGOON_SYSTEM_ROUTER_PATTERN",
            "${service}.example.com",
            VariableScope::InternalSystem,
        )];
        let env = vec![EnvironmentVariable::new(
            "LAGOON_SYSTEM_ROUTER_PATTERN",
            "evil.example.com",
            VariableScope::Build,
        )];
        let merged = merge_variables(&project, &env);
        assert_eq!(merged[0].value, "${service}.example.com");
    }

    #[test]
    fn lookup_respects_scope() {
        let vars = vec![EnvironmentVariable::new("X", "1", VariableScope::Runtime)];
        assert!(find_variable(&vars, "X", BUILD_SCOPES).is_none());
        assert!(find_variable(&vars, "X", &[VariableScope::Runtime]).is_some());
    }

    #[test]
    fn scope_deserializes_snake_case() {
        let var: EnvironmentVariable =
            serde_json::from_str(r#"{"name":"A","value":"b","scope":"internal_system"}"#).unwrap();
        assert_eq!(var.scope, VariableScope::InternalSystem);
    }
}
