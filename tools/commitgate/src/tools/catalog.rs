use crate::runner::CommandCall;

pub const LATEST: &str = "latest";

const GOLANGCI_LINT_SCRIPT: &str = "curl -sSfL https://raw.githubusercontent.com/golangci/golangci-lint/master/install.sh | sh -s -- -b $(go env GOPATH)/bin {version}";

/// How a tool gets onto the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallMethod {
    /// `go install <import_path>@<version>`
    GoInstall { import_path: String },
    /// Shell installer; `{version}` in the script is substituted. When the
    /// script keeps failing on the network, `go install` of the fallback
    /// import path is tried instead.
    Script {
        script: String,
        fallback_import_path: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    pub name: String,
    pub binary: String,
    pub version: String,
    pub install: InstallMethod,
}

impl Tool {
    pub fn go_install(name: &str, import_path: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            binary: name.to_string(),
            version: version.to_string(),
            install: InstallMethod::GoInstall {
                import_path: import_path.to_string(),
            },
        }
    }

    /// Version to pass to the installer, never empty.
    pub fn resolved_version(&self) -> &str {
        let version = self.version.trim();
        if version.is_empty() {
            LATEST
        } else {
            version
        }
    }

    /// Environment variable that overrides this tool's version.
    pub fn version_var(&self) -> String {
        version_var(&self.name)
    }

    /// Command for the primary installation method.
    pub fn install_call(&self) -> CommandCall {
        match &self.install {
            InstallMethod::GoInstall { import_path } => go_install_call(import_path, self.resolved_version()),
            InstallMethod::Script { script, .. } => CommandCall::new(
                "sh",
                vec![
                    "-c".to_string(),
                    script.replace("{version}", self.resolved_version()),
                ],
            )
            .with_env("GO111MODULE", "on"),
        }
    }

    /// Command for the secondary method, if the tool has one.
    pub fn fallback_call(&self) -> Option<CommandCall> {
        match &self.install {
            InstallMethod::Script {
                fallback_import_path: Some(import_path),
                ..
            } => Some(go_install_call(import_path, self.resolved_version())),
            _ => None,
        }
    }
}

fn go_install_call(import_path: &str, version: &str) -> CommandCall {
    CommandCall::new("go", vec!["install".to_string(), format!("{import_path}@{version}")])
        .with_env("GO111MODULE", "on")
}

/// `golangci-lint` -> `COMMITGATE_GOLANGCI_LINT_VERSION`
pub fn version_var(tool: &str) -> String {
    format!("COMMITGATE_{}_VERSION", tool.to_ascii_uppercase().replace('-', "_"))
}

/// Built-in tool table with pinned default versions.
pub fn default_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "golangci-lint".to_string(),
            binary: "golangci-lint".to_string(),
            version: "v2.4.0".to_string(),
            install: InstallMethod::Script {
                script: GOLANGCI_LINT_SCRIPT.to_string(),
                fallback_import_path: Some("github.com/golangci/golangci-lint/v2/cmd/golangci-lint".to_string()),
            },
        },
        Tool::go_install("gofumpt", "mvdan.cc/gofumpt", "v0.8.0"),
        Tool::go_install("goimports", "golang.org/x/tools/cmd/goimports", LATEST),
        Tool::go_install("gitleaks", "github.com/zricethezav/gitleaks/v8", "v8.28.0"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_var_is_uppercased_with_underscores() {
        assert_eq!(version_var("golangci-lint"), "COMMITGATE_GOLANGCI_LINT_VERSION");
        assert_eq!(version_var("gofumpt"), "COMMITGATE_GOFUMPT_VERSION");
    }

    #[test]
    fn empty_version_resolves_to_latest() {
        let tool = Tool::go_install("goimports", "golang.org/x/tools/cmd/goimports", "");
        assert_eq!(tool.resolved_version(), "latest");
        assert_eq!(
            tool.install_call().args,
            vec!["install", "golang.org/x/tools/cmd/goimports@latest"]
        );
    }

    #[test]
    fn script_install_substitutes_version_and_has_fallback() {
        let tools = default_tools();
        let lint = tools.iter().find(|t| t.name == "golangci-lint").unwrap();
        let call = lint.install_call();
        assert_eq!(call.program, "sh");
        assert!(call.args[1].ends_with("/bin v2.4.0"));

        let fallback = lint.fallback_call().unwrap();
        assert_eq!(fallback.program, "go");
        assert!(fallback.args[1].ends_with("@v2.4.0"));
    }

    #[test]
    fn go_install_tools_have_no_fallback() {
        let tool = Tool::go_install("gofumpt", "mvdan.cc/gofumpt", "v0.8.0");
        assert!(tool.fallback_call().is_none());
        assert_eq!(tool.install_call().env, vec![("GO111MODULE".to_string(), "on".to_string())]);
    }
}
