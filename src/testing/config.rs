//! Scenario file format
//!
//! Defines the data structures for deserializing YAML test scenarios and
//! turns them into [`Scenario`] values.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::common::paths::resolve_relative;
use crate::common::{Error, Result};

use super::scenario::Scenario;
use super::step::{Expectation, ScenarioStep};
use super::template::CommandTemplate;

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Directory commands run in, relative to the scenario file
    pub working_dir: Option<PathBuf>,
    /// Default timeout for every command in this scenario
    pub timeout_secs: Option<u64>,
    /// Values for `{{name}}` placeholders
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Environment added to every command
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Commands that bring the system under test up
    #[serde(default)]
    pub setup: Vec<CommandEntry>,
    /// The sequence of test steps to execute
    pub steps: Vec<StepEntry>,
    /// Commands that release the system under test, always run
    #[serde(default)]
    pub teardown: Vec<CommandEntry>,
}

/// A command given either as a token list or as a shell script
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct CommandEntry {
    /// Program and arguments
    pub run: Option<Vec<String>>,
    /// Script executed with `sh -c`
    pub shell: Option<String>,
    /// Overrides the scenario working directory
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
}

/// A single test step in the execution flow
///
/// Carries the [`CommandEntry`] keys inline; `flatten` would lose
/// `deny_unknown_fields`.
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct StepEntry {
    /// Step name used in reports
    pub name: String,
    pub run: Option<Vec<String>>,
    pub shell: Option<String>,
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
    /// Expected standard output
    pub expect: ExpectEntry,
}

impl StepEntry {
    fn into_parts(self) -> (String, CommandEntry, ExpectEntry) {
        let command = CommandEntry {
            run: self.run,
            shell: self.shell,
            working_dir: self.working_dir,
            env: self.env,
            timeout_secs: self.timeout_secs,
        };
        (self.name, command, self.expect)
    }
}

/// `expect: "text"` for an exact match, or a map naming the mode
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum ExpectEntry {
    Exact(String),
    Matcher(MatcherEntry),
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct MatcherEntry {
    /// Expected exact output
    pub equals: Option<String>,
    /// Expected substring in output
    pub contains: Option<String>,
}

impl ExpectEntry {
    fn into_expectation(self) -> std::result::Result<Expectation, String> {
        match self {
            Self::Exact(text) => Ok(Expectation::Equals(text)),
            Self::Matcher(MatcherEntry {
                equals: Some(text),
                contains: None,
            }) => Ok(Expectation::Equals(text)),
            Self::Matcher(MatcherEntry {
                equals: None,
                contains: Some(text),
            }) => Ok(Expectation::Contains(text)),
            Self::Matcher(_) => Err("expect needs exactly one of 'equals' or 'contains'".to_string()),
        }
    }
}

fn positive_timeout(secs: u64) -> std::result::Result<Duration, String> {
    if secs == 0 {
        return Err("timeout_secs must be at least 1".to_string());
    }
    Ok(Duration::from_secs(secs))
}

/// Where relative paths in a scenario resolve from
struct Context<'a> {
    working_dir: &'a Path,
    env: &'a BTreeMap<String, String>,
}

impl CommandEntry {
    fn into_template(self, cx: &Context<'_>) -> std::result::Result<CommandTemplate, String> {
        let mut template = match (self.run, self.shell) {
            (Some(tokens), None) => {
                if tokens.is_empty() {
                    return Err("'run' must name a program".to_string());
                }
                CommandTemplate::new(tokens)
            }
            (None, Some(script)) => CommandTemplate::shell(script),
            (Some(_), Some(_)) => return Err("give either 'run' or 'shell', not both".to_string()),
            (None, None) => return Err("missing 'run' or 'shell'".to_string()),
        };

        let dir = match &self.working_dir {
            Some(dir) => resolve_relative(cx.working_dir, dir),
            None => cx.working_dir.to_path_buf(),
        };
        template = template.with_working_dir(dir);

        // Command env overrides scenario env
        let mut env = cx.env.clone();
        env.extend(self.env);
        template.env = env.into_iter().collect();

        if let Some(secs) = self.timeout_secs {
            template = template.with_timeout(positive_timeout(secs)?);
        }
        Ok(template)
    }
}

impl ScenarioFile {
    /// Parse scenario YAML
    pub fn parse(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Validate and convert. `base_dir` is the directory holding the file.
    pub fn into_scenario(self, base_dir: &Path) -> std::result::Result<Scenario, String> {
        if self.name.trim().is_empty() {
            return Err("scenario name is empty".to_string());
        }
        if self.steps.is_empty() {
            return Err("scenario has no steps".to_string());
        }
        let timeout = self.timeout_secs.map(positive_timeout).transpose()?;

        let working_dir = match &self.working_dir {
            Some(dir) => resolve_relative(base_dir, dir),
            None => base_dir.to_path_buf(),
        };
        let cx = Context {
            working_dir: &working_dir,
            env: &self.env,
        };

        let setup = self
            .setup
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                entry
                    .into_template(&cx)
                    .map_err(|e| format!("setup command {}: {}", i + 1, e))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let teardown = self
            .teardown
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                entry
                    .into_template(&cx)
                    .map_err(|e| format!("teardown command {}: {}", i + 1, e))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(self.steps.len());
        for step in self.steps {
            let (name, command, expect) = step.into_parts();
            if name.trim().is_empty() {
                return Err(format!("step {} has an empty name", steps.len() + 1));
            }
            if !seen.insert(name.clone()) {
                return Err(format!("duplicate step name '{}'", name));
            }
            let command = command
                .into_template(&cx)
                .map_err(|e| format!("step '{}': {}", name, e))?;
            let expect = expect
                .into_expectation()
                .map_err(|e| format!("step '{}': {}", name, e))?;
            steps.push(ScenarioStep::new(name, command, expect));
        }

        Ok(Scenario {
            name: self.name,
            description: self.description,
            vars: self.vars,
            setup,
            steps,
            teardown,
            timeout,
            source: None,
        })
    }
}

/// Load a single scenario file
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, &e))?;

    let file = ScenarioFile::parse(&content).map_err(|e| Error::scenario_parse(path, e.to_string()))?;

    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let base_dir = base_dir.canonicalize().unwrap_or_else(|_| base_dir.to_path_buf());

    let mut scenario = file
        .into_scenario(&base_dir)
        .map_err(|message| Error::scenario_parse(path, message))?;
    scenario.source = Some(path.to_path_buf());
    Ok(scenario)
}

/// Load scenarios from files and directories, in argument order
///
/// A directory contributes every `*.yml`/`*.yaml` file directly inside it,
/// sorted by file name.
pub fn load_scenarios(paths: &[PathBuf]) -> Result<Vec<Scenario>> {
    let mut scenarios = Vec::new();
    for path in paths {
        if path.is_dir() {
            let files = scenario_files_in(path)?;
            if files.is_empty() {
                return Err(Error::NoScenarios(path.display().to_string()));
            }
            for file in files {
                scenarios.push(load_scenario(&file)?);
            }
        } else {
            scenarios.push(load_scenario(path)?);
        }
    }
    tracing::debug!(count = scenarios.len(), "Loaded scenarios");
    Ok(scenarios)
}

fn scenario_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yml" || ext == "yaml");
        if is_yaml && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHESS: &str = r#"
name: chess
description: Play two moves and read the board back
working_dir: ../chess
vars:
  game: test
setup:
  - run: [dfx, start, --background, --clean]
  - shell: npm install
teardown:
  - run: [dfx, stop]
steps:
  - name: create game
    run: [dfx, canister, call, chess_rs, new, '("{{game}}", true)']
    expect: '()'
  - name: move 1
    run: [dfx, canister, call, chess_rs, move, '("{{game}}", "e2e4")']
    expect: '(true)'
  - name: read board
    run: [dfx, canister, call, chess_rs, getFen, '("{{game}}")']
    expect:
      contains: KQkq
    timeout_secs: 30
"#;

    fn convert(yaml: &str) -> std::result::Result<Scenario, String> {
        ScenarioFile::parse(yaml)
            .map_err(|e| e.to_string())?
            .into_scenario(Path::new("/srv/scenarios"))
    }

    #[test]
    fn test_parse_chess_scenario() {
        let scenario = convert(CHESS).unwrap();
        assert_eq!(scenario.name, "chess");
        assert_eq!(scenario.vars.get("game").map(String::as_str), Some("test"));
        assert_eq!(scenario.setup.len(), 2);
        assert_eq!(scenario.setup[1].tokens, vec!["sh", "-c", "npm install"]);
        assert_eq!(scenario.teardown[0].tokens, vec!["dfx", "stop"]);
        assert_eq!(scenario.steps.len(), 3);
        assert_eq!(scenario.steps[0].expect, Expectation::Equals("()".to_string()));
        assert_eq!(
            scenario.steps[2].expect,
            Expectation::Contains("KQkq".to_string())
        );
        assert_eq!(
            scenario.steps[2].command.timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_working_dir_resolves_from_scenario_file() {
        let scenario = convert(CHESS).unwrap();
        let expected = PathBuf::from("/srv/scenarios/../chess");
        assert_eq!(scenario.setup[0].working_dir.as_ref(), Some(&expected));
        assert_eq!(scenario.steps[0].command.working_dir.as_ref(), Some(&expected));
    }

    #[test]
    fn test_command_env_overrides_scenario_env() {
        let scenario = convert(
            r#"
name: env
env:
  DFX_NETWORK: local
  MODE: scenario
steps:
  - name: show
    shell: echo "$MODE"
    env:
      MODE: step
    expect: step
"#,
        )
        .unwrap();
        let env = &scenario.steps[0].command.env;
        assert!(env.contains(&("DFX_NETWORK".to_string(), "local".to_string())));
        assert!(env.contains(&("MODE".to_string(), "step".to_string())));
        assert!(!env.contains(&("MODE".to_string(), "scenario".to_string())));
    }

    #[test]
    fn test_rejects_duplicate_step_names() {
        let err = convert(
            r#"
name: dup
steps:
  - name: move
    run: [echo]
    expect: ''
  - name: move
    run: [echo]
    expect: ''
"#,
        )
        .unwrap_err();
        assert_eq!(err, "duplicate step name 'move'");
    }

    #[test]
    fn test_rejects_run_and_shell_together() {
        let err = convert(
            r#"
name: both
steps:
  - name: step
    run: [echo, hi]
    shell: echo hi
    expect: hi
"#,
        )
        .unwrap_err();
        assert!(err.contains("either 'run' or 'shell'"), "{err}");
    }

    #[test]
    fn test_rejects_empty_run_and_missing_command() {
        let err = convert("name: x\nsteps:\n  - name: s\n    run: []\n    expect: ''\n").unwrap_err();
        assert!(err.contains("must name a program"), "{err}");

        let err = convert("name: x\nsetup:\n  - env: {A: b}\nsteps:\n  - name: s\n    run: [echo]\n    expect: ''\n")
            .unwrap_err();
        assert_eq!(err, "setup command 1: missing 'run' or 'shell'");
    }

    #[test]
    fn test_rejects_ambiguous_matcher() {
        let err = convert(
            r#"
name: x
steps:
  - name: s
    run: [echo]
    expect:
      equals: a
      contains: b
"#,
        )
        .unwrap_err();
        assert!(err.contains("exactly one of"), "{err}");
    }

    #[test]
    fn test_rejects_scenario_without_steps() {
        assert_eq!(convert("name: x\nsteps: []\n").unwrap_err(), "scenario has no steps");
    }

    #[test]
    fn test_unknown_top_level_field_is_error() {
        let err = convert("name: x\nstep: []\n").unwrap_err();
        assert!(err.contains("unknown field"), "{err}");
    }

    #[test]
    fn test_misspelled_command_keys_are_errors() {
        let err = convert(
            r#"
name: typo
setup:
  - run: [dfx, start]
    timeout: 5
steps:
  - name: s
    run: [echo]
    expect: ''
"#,
        )
        .unwrap_err();
        assert!(err.contains("unknown field `timeout`"), "{err}");

        let err = convert(
            r#"
name: typo
steps:
  - name: s
    run: [echo]
    timeout: 1
    expect: ''
"#,
        )
        .unwrap_err();
        assert!(err.contains("unknown field `timeout`"), "{err}");

        let err = convert(
            r#"
name: typo
steps:
  - name: s
    run: [echo]
    enviroment: {A: b}
    expect: ''
"#,
        )
        .unwrap_err();
        assert!(err.contains("unknown field `enviroment`"), "{err}");
    }

    #[test]
    fn test_step_keys_still_parse_inline() {
        let scenario = convert(
            r#"
name: inline
steps:
  - name: s
    shell: echo "$A"
    working_dir: sub
    env: {A: b}
    timeout_secs: 7
    expect: b
"#,
        )
        .unwrap();
        let command = &scenario.steps[0].command;
        assert_eq!(command.tokens, vec!["sh", "-c", "echo \"$A\""]);
        assert_eq!(command.working_dir, Some(PathBuf::from("/srv/scenarios/sub")));
        assert!(command.env.contains(&("A".to_string(), "b".to_string())));
        assert_eq!(command.timeout, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        let err = convert("name: x\ntimeout_secs: 0\nsteps:\n  - name: s\n    run: [echo]\n    expect: ''\n")
            .unwrap_err();
        assert_eq!(err, "timeout_secs must be at least 1");

        let err = convert("name: x\nsteps:\n  - name: s\n    run: [echo]\n    timeout_secs: 0\n    expect: ''\n")
            .unwrap_err();
        assert_eq!(err, "step 's': timeout_secs must be at least 1");
    }

    #[test]
    fn test_load_scenarios_from_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let body = |name: &str| format!("name: {name}\nsteps:\n  - name: s\n    run: [echo]\n    expect: ''\n");
        std::fs::write(dir.path().join("b.yaml"), body("second")).unwrap();
        std::fs::write(dir.path().join("a.yml"), body("first")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let scenarios = load_scenarios(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(scenarios[0].source.as_ref().unwrap().ends_with("a.yml"));
    }

    #[test]
    fn test_load_scenarios_empty_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_scenarios(&[dir.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, Error::NoScenarios(_)));
    }

    #[test]
    fn test_load_scenario_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yml");
        std::fs::write(&path, "name: [unclosed").unwrap();
        let err = load_scenario(&path).unwrap_err();
        match err {
            Error::ScenarioParse { path: p, .. } => assert!(p.ends_with("broken.yml")),
            other => panic!("Expected ScenarioParse, got {other:?}"),
        }
    }
}
