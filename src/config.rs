//! Ecosystem descriptor types for the pmx supervisor.
//!
//! This module provides the schema for loading and validating process
//! descriptors from TOML or JSON files. It includes:
//!
//! - [`EcosystemFile`] - root structure holding the `apps` list
//! - [`ProcessDescriptor`] - one supervised process definition
//! - [`Args`] - argument list given as an array or one shell-ish line
//! - [`Instances`] - fixed count or `"max"` (logical CPU count)
//!
//! Environment values support `${VAR}` interpolation. The lookup function
//! is passed in by the caller rather than read ambiently, so secrets flow
//! through one explicit seam (and tests can fake the environment).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::utils::parse_bytes;

/// Result of descriptor validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Root of an ecosystem file: a list of process descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcosystemFile {
    #[serde(default)]
    pub apps: Vec<ProcessDescriptor>,
}

/// Declarative description of one supervised process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDescriptor {
    /// Unique identifier for the managed process.
    pub name: String,
    /// Executable path or named binary to invoke.
    pub script: String,
    /// Arguments passed to the script.
    #[serde(default)]
    pub args: Args,
    /// Interpreter prefix, or `"none"` to exec the script directly.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Working directory the process is launched from.
    pub cwd: PathBuf,
    /// Number of concurrent copies to supervise.
    #[serde(default = "default_instances")]
    pub instances: Instances,
    /// Relaunch the process on unexpected exit.
    #[serde(default = "default_true")]
    pub autorestart: bool,
    /// Restart when files under `cwd` change.
    #[serde(default)]
    pub watch: bool,
    /// Resident-memory ceiling, e.g. `"1G"`. Crossing it forces a restart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_restart: Option<String>,
    /// Extra environment injected into the child.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// File receiving the child's stderr stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_file: Option<PathBuf>,
    /// File receiving the child's stdout stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_file: Option<PathBuf>,
    /// File receiving both streams combined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Prefix captured log lines with a timestamp.
    #[serde(default)]
    pub time: bool,
}

/// Arguments, accepted either as an array of tokens or as a single
/// whitespace-separated line (the common ecosystem-file shorthand).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Args {
    List(Vec<String>),
    Line(String),
}

impl Default for Args {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl Args {
    /// Argument tokens in order. Line form splits on whitespace; quoting
    /// is not interpreted.
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.clone(),
            Self::Line(line) => line.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// Instance count: a fixed number or `"max"` for one per logical CPU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Instances {
    Count(u32),
    Keyword(String),
}

impl Instances {
    /// Resolve to a concrete count. `"max"` maps to the CPU count.
    pub fn resolve(&self) -> Result<usize> {
        match self {
            Self::Count(0) => Err(Error::config("instances must be at least 1")),
            Self::Count(n) => Ok(*n as usize),
            Self::Keyword(word) if word == "max" => Ok(num_cpus::get()),
            Self::Keyword(word) => Err(Error::config(format!(
                "instances must be a positive integer or \"max\" (got: \"{word}\")"
            ))),
        }
    }
}

fn default_interpreter() -> String {
    crate::supervisor::NO_INTERPRETER.to_string()
}

fn default_instances() -> Instances {
    Instances::Count(1)
}

fn default_true() -> bool {
    true
}

impl ProcessDescriptor {
    /// Memory ceiling in bytes, if configured.
    pub fn max_memory_bytes(&self) -> Result<Option<u64>> {
        self.max_memory_restart
            .as_deref()
            .map(parse_bytes)
            .transpose()
    }
}

impl EcosystemFile {
    /// Load an ecosystem file, selecting the format by extension
    /// (`.json` is JSON, anything else is TOML).
    ///
    /// `env_lookup` resolves `${VAR}` references inside descriptor `env`
    /// values; unset variables resolve to the empty string. Pass
    /// `|name| std::env::var(name).ok()` for the real environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read, fails to
    /// parse, or is missing required fields.
    pub fn load_from<P, F>(path: P, env_lookup: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let mut file: Self = if is_json {
            serde_json::from_str(&content).map_err(|e| {
                Error::config(format!("Failed to parse {}: {e}", path.display()))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                Error::config(format!("Failed to parse {}: {e}", path.display()))
            })?
        };

        for app in &mut file.apps {
            for value in app.env.values_mut() {
                *value = expand_env(value, &env_lookup);
            }
        }

        Ok(file)
    }

    /// Validate all descriptors with comprehensive checks.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] aggregating every problem found:
    /// - No apps defined
    /// - Empty `name`, `script`, or `cwd`
    /// - Duplicate app names
    /// - Unparseable `max_memory_restart` or `instances`
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.apps.is_empty() {
            errors.push("ecosystem file defines no apps".to_string());
        }

        let mut seen = BTreeSet::new();
        for app in &self.apps {
            let label = if app.name.is_empty() {
                "<unnamed>"
            } else {
                app.name.as_str()
            };

            if app.name.is_empty() {
                errors.push("app name cannot be empty".to_string());
            } else if !seen.insert(app.name.clone()) {
                errors.push(format!("duplicate app name: '{}'", app.name));
            }

            if app.script.is_empty() {
                errors.push(format!("script cannot be empty for '{label}'"));
            }

            if app.cwd.as_os_str().is_empty() {
                errors.push(format!("cwd cannot be empty for '{label}'"));
            } else {
                if app.cwd.is_relative() {
                    warnings.push(format!(
                        "cwd for '{label}' is relative ({}); it resolves against wherever \
                         the supervisor starts",
                        app.cwd.display()
                    ));
                }
                if !app.cwd.exists() {
                    warnings.push(format!(
                        "cwd for '{label}' does not exist yet: {}",
                        app.cwd.display()
                    ));
                }
            }

            if let Err(e) = app.instances.resolve() {
                errors.push(format!("{e} (app '{label}')"));
            }

            if let Err(e) = app.max_memory_bytes() {
                errors.push(format!("{e} (app '{label}')"));
            }

            if app.interpreter.is_empty() {
                errors.push(format!(
                    "interpreter for '{label}' cannot be empty; use \"none\" for direct exec"
                ));
            }

            for log in [&app.error_file, &app.out_file, &app.log_file]
                .into_iter()
                .flatten()
            {
                if let Some(parent) = log.parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.is_dir()
                {
                    warnings.push(format!(
                        "log directory for '{label}' does not exist yet: {}",
                        parent.display()
                    ));
                }
            }
        }

        if !errors.is_empty() {
            return Err(Error::config(format!(
                "validation failed:\n  - {}",
                errors.join("\n  - ")
            )));
        }

        Ok(ValidationResult { warnings })
    }
}

/// Expand `${VAR}` references using the given lookup.
///
/// Unset variables expand to the empty string; presence of secrets is
/// not validated here. `$` without a following `{` passes through.
pub fn expand_env<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let name = &rest[start + 2..start + 2 + end];
                out.push_str(&lookup(name).unwrap_or_default());
                rest = &rest[start + 2 + end + 1..];
            },
            None => {
                // Unterminated reference, keep it literal
                out.push_str(&rest[start..]);
                rest = "";
            },
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_minimal_descriptor() {
        let toml_str = r#"
[[apps]]
name = "pocket-ai"
script = "/srv/pocket-ai/venv/bin/streamlit"
cwd = "/srv/pocket-ai"
"#;
        let file: EcosystemFile = toml::from_str(toml_str).unwrap();
        assert_eq!(file.apps.len(), 1);

        let app = &file.apps[0];
        assert_eq!(app.name, "pocket-ai");
        assert_eq!(app.interpreter, "none");
        assert_eq!(app.instances, Instances::Count(1));
        assert!(app.autorestart);
        assert!(!app.watch);
        assert!(!app.time);
        assert!(app.args.tokens().is_empty());
    }

    #[test]
    fn test_parse_full_descriptor() {
        let toml_str = r#"
[[apps]]
name = "pocket-ai"
script = "/srv/pocket-ai/venv/bin/streamlit"
args = "run app.py --server.port 5000 --server.address 0.0.0.0 --server.headless true"
interpreter = "none"
cwd = "/srv/pocket-ai"
instances = 1
autorestart = true
watch = false
max_memory_restart = "1G"
error_file = "/srv/pocket-ai/logs/error.log"
out_file = "/srv/pocket-ai/logs/out.log"
log_file = "/srv/pocket-ai/logs/combined.log"
time = true

[apps.env]
NODE_ENV = "production"
OPENAI_API_KEY = "${OPENAI_API_KEY}"
"#;
        let file: EcosystemFile = toml::from_str(toml_str).unwrap();
        let app = &file.apps[0];

        assert_eq!(
            app.args.tokens(),
            vec![
                "run",
                "app.py",
                "--server.port",
                "5000",
                "--server.address",
                "0.0.0.0",
                "--server.headless",
                "true"
            ]
        );
        assert_eq!(app.max_memory_bytes().unwrap(), Some(1_073_741_824));
        assert_eq!(app.env.get("NODE_ENV").map(String::as_str), Some("production"));
        assert!(app.time);
    }

    #[test]
    fn test_args_array_and_line_agree() {
        let line = Args::Line("run app.py --server.port 5000".into());
        let list = Args::List(vec![
            "run".into(),
            "app.py".into(),
            "--server.port".into(),
            "5000".into(),
        ]);
        assert_eq!(line.tokens(), list.tokens());
    }

    #[test]
    fn test_serialize_parse_round_trip() {
        let toml_str = r#"
[[apps]]
name = "pocket-ai"
script = "streamlit"
args = ["run", "app.py"]
interpreter = "/srv/pocket-ai/venv/bin/python"
cwd = "/srv/pocket-ai"
max_memory_restart = "1G"
time = true

[apps.env]
NODE_ENV = "production"
"#;
        let file: EcosystemFile = toml::from_str(toml_str).unwrap();
        let rendered = toml::to_string(&file).unwrap();
        let reparsed: EcosystemFile = toml::from_str(&rendered).unwrap();
        assert_eq!(file, reparsed);
    }

    #[test]
    fn test_json_format() {
        let json_str = r#"
{
  "apps": [{
    "name": "pocket-ai",
    "script": "/srv/pocket-ai/venv/bin/streamlit",
    "args": "run app.py",
    "cwd": "/srv/pocket-ai",
    "env": { "NODE_ENV": "production" }
  }]
}
"#;
        let file: EcosystemFile = serde_json::from_str(json_str).unwrap();
        assert_eq!(file.apps[0].name, "pocket-ai");
        assert_eq!(file.apps[0].args.tokens(), vec!["run", "app.py"]);
    }

    #[test]
    fn test_missing_required_fields_fail_parse() {
        // name missing
        let r: std::result::Result<EcosystemFile, _> = toml::from_str(
            r#"
[[apps]]
script = "server"
cwd = "/srv"
"#,
        );
        assert!(r.is_err());

        // script missing
        let r: std::result::Result<EcosystemFile, _> = toml::from_str(
            r#"
[[apps]]
name = "web"
cwd = "/srv"
"#,
        );
        assert!(r.is_err());

        // cwd missing
        let r: std::result::Result<EcosystemFile, _> = toml::from_str(
            r#"
[[apps]]
name = "web"
script = "server"
"#,
        );
        assert!(r.is_err());
    }

    #[test]
    fn test_load_from_missing_file_is_config_error() {
        let err =
            EcosystemFile::load_from("/nonexistent/pmx/ecosystem.toml", no_env).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_load_from_interpolates_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecosystem.toml");
        std::fs::write(
            &path,
            r#"
[[apps]]
name = "pocket-ai"
script = "streamlit"
cwd = "/srv/pocket-ai"

[apps.env]
OPENAI_API_KEY = "${OPENAI_API_KEY}"
NODE_ENV = "production"
MISSING = "${NOT_SET}"
"#,
        )
        .unwrap();

        let file = EcosystemFile::load_from(&path, |name| {
            (name == "OPENAI_API_KEY").then(|| "sk-test".to_string())
        })
        .unwrap();

        let env = &file.apps[0].env;
        assert_eq!(env.get("OPENAI_API_KEY").map(String::as_str), Some("sk-test"));
        assert_eq!(env.get("NODE_ENV").map(String::as_str), Some("production"));
        assert_eq!(env.get("MISSING").map(String::as_str), Some(""));
    }

    #[test]
    fn test_expand_env_edge_cases() {
        let lookup = |name: &str| (name == "A").then(|| "x".to_string());
        assert_eq!(expand_env("${A}${A}", &lookup), "xx");
        assert_eq!(expand_env("pre-${A}-post", &lookup), "pre-x-post");
        assert_eq!(expand_env("$A is literal", &lookup), "$A is literal");
        assert_eq!(expand_env("${UNTERMINATED", &lookup), "${UNTERMINATED");
        assert_eq!(expand_env("plain", &lookup), "plain");
    }

    #[test]
    fn test_validate_empty_apps() {
        let file = EcosystemFile { apps: vec![] };
        let err = file.validate().unwrap_err();
        assert!(err.to_string().contains("no apps"));
    }

    #[test]
    fn test_validate_duplicate_names() {
        let toml_str = r#"
[[apps]]
name = "web"
script = "a"
cwd = "/srv"

[[apps]]
name = "web"
script = "b"
cwd = "/srv"
"#;
        let file: EcosystemFile = toml::from_str(toml_str).unwrap();
        let err = file.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate app name"));
    }

    #[test]
    fn test_validate_bad_memory_quantity() {
        let toml_str = r#"
[[apps]]
name = "web"
script = "server"
cwd = "/srv"
max_memory_restart = "1X"
"#;
        let file: EcosystemFile = toml::from_str(toml_str).unwrap();
        let err = file.validate().unwrap_err();
        assert!(err.to_string().contains("1X"));
    }

    #[test]
    fn test_validate_instances() {
        let file: EcosystemFile = toml::from_str(
            r#"
[[apps]]
name = "web"
script = "server"
cwd = "/srv"
instances = 0
"#,
        )
        .unwrap();
        assert!(file.validate().is_err());

        let file: EcosystemFile = toml::from_str(
            r#"
[[apps]]
name = "web"
script = "server"
cwd = "/srv"
instances = "max"
"#,
        )
        .unwrap();
        assert!(file.apps[0].instances.resolve().unwrap() >= 1);

        let file: EcosystemFile = toml::from_str(
            r#"
[[apps]]
name = "web"
script = "server"
cwd = "/srv"
instances = "all"
"#,
        )
        .unwrap();
        assert!(file.validate().is_err());
    }

    #[test]
    fn test_validate_warns_on_relative_cwd() {
        let toml_str = r#"
[[apps]]
name = "web"
script = "server"
cwd = "srv/app"
"#;
        let file: EcosystemFile = toml::from_str(toml_str).unwrap();
        let result = file.validate().unwrap();
        assert!(result.has_warnings());
    }

    #[test]
    fn test_validate_multiple_errors_aggregated() {
        let file = EcosystemFile {
            apps: vec![ProcessDescriptor {
                name: String::new(),
                script: String::new(),
                args: Args::default(),
                interpreter: String::new(),
                cwd: PathBuf::new(),
                instances: Instances::Count(0),
                autorestart: true,
                watch: false,
                max_memory_restart: Some("1X".into()),
                env: BTreeMap::new(),
                error_file: None,
                out_file: None,
                log_file: None,
                time: false,
            }],
        };

        let err = file.validate().unwrap_err().to_string();
        assert!(err.contains("name cannot be empty"));
        assert!(err.contains("script cannot be empty"));
        assert!(err.contains("cwd cannot be empty"));
        assert!(err.contains("instances"));
        assert!(err.contains("1X"));
    }
}
