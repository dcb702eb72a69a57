//! Built-in tools: `whois` lookups and sandboxed file read/write.

use std::path::{Component, Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Command;
use tokio::time::{Duration, timeout};

use crate::error::ToolError;
use crate::tools::{ToolSpec, decode_input};

const WHOIS_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct WhoisInput {
    domain: String,
}

#[derive(Debug, Deserialize)]
struct ReadFileInput {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteFileInput {
    path: String,
    data: String,
}

pub fn whois_tool() -> ToolSpec {
    ToolSpec::new(
        "whois",
        "Performs a whois lookup for a domain. This tool will only provide new information when looking up a unique input.",
    )
    .with_input_shape(json!({"domain": "string"}))
    .with_handler(|input| async move {
        let input: WhoisInput = decode_input("whois", input)?;
        let domain = input.domain.trim().to_string();
        if domain.is_empty() || domain.starts_with('-') {
            return Err(ToolError::InvalidInput {
                tool: "whois".to_string(),
                message: format!("not a domain: {:?}", input.domain),
            });
        }

        let mut command = Command::new("whois");
        command.arg(&domain);
        let output =
            run_bounded("whois", command, Duration::from_secs(WHOIS_TIMEOUT_SECS)).await?;

        let mut rendered = String::from_utf8_lossy(&output.stdout).into_owned();
        rendered.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(execution(
                "whois",
                format!("whois exited with {}: {}", output.status, rendered.trim()),
            ));
        }

        Ok(Value::String(rendered))
    })
}

/// Runs a subprocess to completion within `limit`. On timeout the child is killed.
async fn run_bounded(
    tool: &str,
    mut command: Command,
    limit: Duration,
) -> Result<Output, ToolError> {
    let child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| execution(tool, format!("{tool} command failed: {err}")))?;

    timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| execution(tool, format!("timed out after {limit:?}")))?
        .map_err(|err| execution(tool, format!("{tool} command failed: {err}")))
}

/// Root directory the file tools are confined to.
#[derive(Debug, Clone)]
pub struct FileSandbox {
    root_dir: PathBuf,
}

impl FileSandbox {
    pub fn new(root_dir: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(root_dir.as_ref())?;
        Ok(Self {
            root_dir: root_dir.as_ref().canonicalize()?,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, String> {
        let candidate = path.as_ref();
        let unresolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root_dir.join(candidate)
        };
        let resolved = normalize_absolute_path(&unresolved);

        if !resolved.starts_with(&self.root_dir) {
            return Err(format!(
                "path escapes sandbox: {} -> {}",
                candidate.display(),
                resolved.display()
            ));
        }

        // Symlinks are followed from the deepest existing entry, which must stay inside too.
        let mut existing = resolved.as_path();
        while existing.symlink_metadata().is_err() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }
        let real = existing
            .canonicalize()
            .map_err(|err| format!("failed to resolve {}: {err}", candidate.display()))?;
        if !real.starts_with(&self.root_dir) {
            return Err(format!(
                "path escapes sandbox: {} -> {}",
                candidate.display(),
                real.display()
            ));
        }

        Ok(resolved)
    }
}

fn normalize_absolute_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Path::new("/")),
            Component::CurDir => {}
            Component::ParentDir => {
                let _ = normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

pub fn file_tools(sandbox: FileSandbox) -> Vec<ToolSpec> {
    let sandbox = Arc::new(sandbox);
    vec![read_file_tool(sandbox.clone()), write_file_tool(sandbox)]
}

pub fn read_file_tool(sandbox: Arc<FileSandbox>) -> ToolSpec {
    ToolSpec::new("readFile", "Reads content from a file at the specified path")
        .with_input_shape(json!({"path": "string"}))
        .with_handler(move |input| {
            let sandbox = sandbox.clone();
            async move {
                let input: ReadFileInput = decode_input("readFile", input)?;
                let path = sandbox
                    .resolve_path(&input.path)
                    .map_err(|err| execution("readFile", err))?;

                let content = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|err| execution("readFile", format!("failed to read file: {err}")))?;

                Ok(Value::String(content))
            }
        })
}

pub fn write_file_tool(sandbox: Arc<FileSandbox>) -> ToolSpec {
    ToolSpec::new("writeFile", "Writes content to a file at the specified path")
        .with_input_shape(json!({"path": "string", "data": "string"}))
        .with_handler(move |input| {
            let sandbox = sandbox.clone();
            async move {
                let input: WriteFileInput = decode_input("writeFile", input)?;
                let path = sandbox
                    .resolve_path(&input.path)
                    .map_err(|err| execution("writeFile", err))?;

                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|err| {
                        execution("writeFile", format!("failed to create directory: {err}"))
                    })?;
                }
                tokio::fs::write(&path, input.data.as_bytes())
                    .await
                    .map_err(|err| execution("writeFile", format!("failed to write file: {err}")))?;

                Ok(json!({"status": "success", "path": input.path}))
            }
        })
}

fn execution(tool: &str, message: impl Into<String>) -> ToolError {
    ToolError::Execution {
        tool: tool.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;

    fn sandbox() -> (tempfile::TempDir, FileSandbox) {
        let dir = tempfile::tempdir().expect("tempdir");
        let sandbox = FileSandbox::new(dir.path()).expect("sandbox");
        (dir, sandbox)
    }

    #[tokio::test]
    async fn write_then_read_inside_sandbox() {
        let (_dir, sandbox) = sandbox();
        let registry = ToolRegistry::from_tools(file_tools(sandbox)).expect("registry");

        let written = registry
            .run(
                "writeFile",
                json!(r#"{"path":"notes/out.txt","data":"hello"}"#),
            )
            .await
            .expect("write succeeds");
        assert_eq!(written["status"], "success");

        let content = registry
            .run("readFile", json!({"path": "notes/out.txt"}))
            .await
            .expect("read succeeds");
        assert_eq!(content, json!("hello"));
    }

    #[tokio::test]
    async fn paths_outside_sandbox_are_refused() {
        let (_dir, sandbox) = sandbox();
        let registry = ToolRegistry::from_tools(file_tools(sandbox)).expect("registry");

        let err = registry
            .run("readFile", json!({"path": "../../etc/passwd"}))
            .await
            .expect_err("must fail");

        match err {
            ToolError::Execution { tool, message } => {
                assert_eq!(tool, "readFile");
                assert!(message.contains("escapes sandbox"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn read_missing_file_is_an_execution_error() {
        let (_dir, sandbox) = sandbox();
        let err = read_file_tool(Arc::new(sandbox))
            .execute(json!({"path": "absent.txt"}))
            .await
            .expect_err("must fail");

        assert!(err.to_string().contains("failed to read file"));
    }

    #[tokio::test]
    async fn whois_rejects_option_like_domains() {
        let err = whois_tool()
            .execute(json!({"domain": "--help"}))
            .await
            .expect_err("must fail");

        assert!(matches!(err, ToolError::Execution { tool, .. } if tool == "whois"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_leaving_the_sandbox_are_refused() {
        let (_dir, sandbox) = sandbox();
        let outside = tempfile::tempdir().expect("outside dir");
        std::fs::write(outside.path().join("secret.txt"), "secret").expect("seed file");
        std::os::unix::fs::symlink(outside.path(), sandbox.root_dir().join("link"))
            .expect("symlink");
        let registry = ToolRegistry::from_tools(file_tools(sandbox)).expect("registry");

        let err = registry
            .run("readFile", json!({"path": "link/secret.txt"}))
            .await
            .expect_err("read through link must fail");
        assert!(err.to_string().contains("escapes sandbox"));

        let err = registry
            .run("writeFile", json!({"path": "link/new/out.txt", "data": "x"}))
            .await
            .expect_err("write through link must fail");
        assert!(err.to_string().contains("escapes sandbox"));
        assert!(!outside.path().join("new").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timed_out_subprocess_is_killed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("finished");
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(format!("sleep 1; echo done > {}", marker.display()));

        let err = run_bounded("slow", command, Duration::from_millis(100))
            .await
            .expect_err("must time out");
        assert!(err.to_string().contains("timed out"));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[test]
    fn whois_advertises_input_shape() {
        let tool = whois_tool();
        assert_eq!(tool.name(), "whois");
        assert_eq!(tool.input_shape(), Some(&json!({"domain": "string"})));
    }
}
