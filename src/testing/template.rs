//! Command templates and `{{name}}` substitution

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::runner::CommandSpec;

/// Variable table used for substitution
pub type Vars = BTreeMap<String, String>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Undefined variable '{0}'")]
    Undefined(String),

    #[error("Command has no program")]
    EmptyCommand,
}

/// Replace every `{{name}}` in `template` with its value from `vars`
///
/// Whitespace inside the braces is ignored. Text that does not form a
/// placeholder (an unclosed `{{`, or a name with characters outside
/// `[A-Za-z0-9_.-]`) is copied through unchanged.
pub fn render(template: &str, vars: &Vars) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };

        let name = after_open[..end].trim();
        if is_placeholder_name(name) {
            let value = vars
                .get(name)
                .ok_or_else(|| TemplateError::Undefined(name.to_string()))?;
            out.push_str(value);
        } else {
            out.push_str(&rest[start..start + 2 + end + 2]);
        }
        rest = &after_open[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Names of all placeholders in `template`, in order of appearance
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            break;
        };
        let name = after_open[..end].trim();
        if is_placeholder_name(name) {
            names.push(name.to_string());
        }
        rest = &after_open[end + 2..];
    }
    names
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// A command whose tokens and environment values may contain placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub tokens: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Overrides the phase timeout for this command
    pub timeout: Option<Duration>,
}

impl CommandTemplate {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            working_dir: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn shell(script: impl Into<String>) -> Self {
        Self::new(["sh".to_string(), "-c".to_string(), script.into()])
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Substitute variables and build the concrete command
    pub fn render(&self, vars: &Vars) -> Result<CommandSpec, TemplateError> {
        let tokens = self
            .tokens
            .iter()
            .map(|token| render(token, vars))
            .collect::<Result<Vec<_>, _>>()?;
        let mut spec = CommandSpec::from_tokens(tokens).ok_or(TemplateError::EmptyCommand)?;

        if let Some(dir) = &self.working_dir {
            spec = spec.with_working_dir(dir);
        }
        for (key, value) in &self.env {
            spec = spec.with_env(key, render(value, vars)?);
        }
        Ok(spec)
    }

    /// Placeholder names used anywhere in this command
    pub fn placeholders(&self) -> Vec<String> {
        self.tokens
            .iter()
            .chain(self.env.iter().map(|(_, value)| value))
            .flat_map(|text| placeholders(text))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_into_argument() {
        let vars = vars(&[("game", "test"), ("move", "e2e4")]);
        assert_eq!(
            render(r#"("{{game}}", "{{ move }}")"#, &vars).unwrap(),
            r#"("test", "e2e4")"#
        );
    }

    #[test]
    fn test_render_undefined_variable() {
        let err = render("{{missing}}", &Vars::new()).unwrap_err();
        assert_eq!(err, TemplateError::Undefined("missing".to_string()));
    }

    #[test]
    fn test_render_leaves_non_placeholders_alone() {
        let vars = Vars::new();
        assert_eq!(render("record { a = 1 }", &vars).unwrap(), "record { a = 1 }");
        assert_eq!(render("{{ not a name }}", &vars).unwrap(), "{{ not a name }}");
        assert_eq!(render("open {{ only", &vars).unwrap(), "open {{ only");
        assert_eq!(render("{{}}", &vars).unwrap(), "{{}}");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let vars = vars(&[("a", "{{b}}")]);
        assert_eq!(render("{{a}}", &vars).unwrap(), "{{b}}");
    }

    #[test]
    fn test_placeholders_in_order() {
        assert_eq!(
            placeholders("move {{game}} {{move}} {{ game }}"),
            vec!["game", "move", "game"]
        );
    }

    #[test]
    fn test_command_template_render() {
        let template = CommandTemplate::new(["dfx", "canister", "call", "chess_rs", "getFen", "(\"{{game}}\")"])
            .with_working_dir("/srv/chess");
        let spec = template.render(&vars(&[("game", "test")])).unwrap();
        assert_eq!(spec.program(), "dfx");
        assert_eq!(spec.args().last().unwrap(), "(\"test\")");
        assert_eq!(spec.working_dir(), Some(std::path::Path::new("/srv/chess")));
    }

    #[test]
    fn test_empty_template_is_error() {
        let template = CommandTemplate::new(Vec::<String>::new());
        assert_eq!(template.render(&Vars::new()), Err(TemplateError::EmptyCommand));
    }
}
