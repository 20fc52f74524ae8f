// weiser-core/src/infrastructure/config/template.rs

// Pre-parse template expansion: `{{ NAME }}` placeholders are replaced
// from the .env file and the ambient environment before the YAML parser
// ever sees the document. `${NAME}` syntax is not honored. An unresolved
// placeholder is a configuration error, never a silently kept literal.

use minijinja::{Environment, UndefinedBehavior};
use std::collections::HashMap;
use std::path::Path;

use crate::infrastructure::error::InfrastructureError;

/// Build the template context. Ambient environment wins over the `.env`
/// file — unless the file was explicitly passed, in which case the
/// operator's choice wins.
pub fn env_context(env_file: Option<&Path>) -> Result<HashMap<String, String>, InfrastructureError> {
    let mut context = HashMap::new();

    match env_file {
        Some(path) => {
            if !path.exists() {
                return Err(InfrastructureError::ConfigNotFound(
                    path.display().to_string(),
                ));
            }
            for (key, value) in std::env::vars() {
                context.insert(key, value);
            }
            for item in dotenvy::from_path_iter(path).map_err(|e| {
                InfrastructureError::Config(format!(
                    "failed to read env file {}: {e}",
                    path.display()
                ))
            })? {
                let (key, value) = item.map_err(|e| {
                    InfrastructureError::Config(format!(
                        "malformed entry in env file {}: {e}",
                        path.display()
                    ))
                })?;
                context.insert(key, value);
            }
        }
        None => {
            let default = Path::new(".env");
            if default.exists() {
                if let Ok(iter) = dotenvy::from_path_iter(default) {
                    for (key, value) in iter.flatten() {
                        context.insert(key, value);
                    }
                }
            }
            for (key, value) in std::env::vars() {
                context.insert(key, value);
            }
        }
    }

    Ok(context)
}

/// Render `{{ NAME }}` placeholders. Strict undefined behavior turns any
/// unresolved name into an error before parsing starts.
pub fn render(
    source: &str,
    context: &HashMap<String, String>,
) -> Result<String, InfrastructureError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    Ok(env.render_str(source, context)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_placeholder() {
        let mut context = HashMap::new();
        context.insert("DB_PASSWORD".to_string(), "hunter2".to_string());
        let out = render("password: {{ DB_PASSWORD }}", &context).expect("renders");
        assert_eq!(out, "password: hunter2");
    }

    #[test]
    fn test_unresolved_placeholder_is_an_error() {
        let context = HashMap::new();
        let err = render("password: {{ MISSING }}", &context);
        assert!(matches!(err, Err(InfrastructureError::Template(_))));
    }

    #[test]
    fn test_dollar_syntax_is_left_alone() {
        let context = HashMap::new();
        let out = render("uri: ${NOT_A_TEMPLATE}", &context).expect("renders");
        assert_eq!(out, "uri: ${NOT_A_TEMPLATE}");
    }
}
