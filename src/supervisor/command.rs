//! Executable resolution for process descriptors.

use crate::config::ProcessDescriptor;

/// Sentinel interpreter value meaning "exec the script directly".
pub const NO_INTERPRETER: &str = "none";

/// Resolve the full argv for a descriptor.
///
/// With `interpreter = "none"` the script itself is the executable;
/// otherwise the interpreter is prepended and the script becomes its
/// first argument.
#[must_use]
pub fn resolve_argv(descriptor: &ProcessDescriptor) -> Vec<String> {
    let mut argv = Vec::new();

    if descriptor.interpreter != NO_INTERPRETER {
        argv.push(descriptor.interpreter.clone());
    }

    argv.push(descriptor.script.clone());
    argv.extend(descriptor.args.tokens());
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EcosystemFile;

    fn descriptor(toml_str: &str) -> ProcessDescriptor {
        let file: EcosystemFile = toml::from_str(toml_str).unwrap();
        file.apps.into_iter().next().unwrap()
    }

    #[test]
    fn test_direct_exec_has_no_interpreter_prefix() {
        let app = descriptor(
            r#"
[[apps]]
name = "pocket-ai"
script = "/venv/bin/streamlit"
args = "run app.py --server.port 5000 --server.address 0.0.0.0 --server.headless true"
interpreter = "none"
cwd = "/srv/pocket-ai"
"#,
        );

        assert_eq!(
            resolve_argv(&app),
            vec![
                "/venv/bin/streamlit",
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
    }

    #[test]
    fn test_interpreter_path_is_prefixed() {
        let app = descriptor(
            r#"
[[apps]]
name = "pocket-ai"
script = "streamlit"
args = ["run", "app.py"]
interpreter = "/venv/bin/python"
cwd = "/srv/pocket-ai"
"#,
        );

        assert_eq!(
            resolve_argv(&app),
            vec!["/venv/bin/python", "streamlit", "run", "app.py"]
        );
    }

    #[test]
    fn test_omitted_interpreter_behaves_as_none() {
        let app = descriptor(
            r#"
[[apps]]
name = "web"
script = "/usr/bin/server"
cwd = "/srv"
"#,
        );

        assert_eq!(resolve_argv(&app), vec!["/usr/bin/server"]);
    }
}
