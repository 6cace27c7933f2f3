//! Post-write checks. A failing check makes the controller roll back.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::IrisResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed(String),
}

impl Verdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }
}

#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, path: &Path) -> IrisResult<Verdict>;
}

/// Parses structured files by extension; Python goes through `py_compile`.
/// Files of any other type pass.
pub struct SyntaxVerifier {
    python: String,
}

impl SyntaxVerifier {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    fn check_text(ext: &str, content: &str) -> Verdict {
        let result = match ext {
            "json" => serde_json::from_str::<serde_json::Value>(content)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            "toml" => toml::from_str::<toml::Table>(content)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            "yaml" | "yml" => serde_yaml::from_str::<serde_yaml::Value>(content)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            _ => Ok(()),
        };
        match result {
            Ok(_) => Verdict::Passed,
            Err(message) => Verdict::Failed(message),
        }
    }

    async fn check_python(&self, path: &Path) -> IrisResult<Verdict> {
        let output = Command::new(&self.python)
            .args(["-m", "py_compile"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => Ok(Verdict::Passed),
            Ok(out) => Ok(Verdict::Failed(
                String::from_utf8_lossy(&out.stderr).trim().to_string(),
            )),
            Err(err) => {
                warn!(python = %self.python, %err, "python unavailable; skipping syntax check");
                Ok(Verdict::Passed)
            }
        }
    }
}

impl Default for SyntaxVerifier {
    fn default() -> Self {
        Self::new("python3")
    }
}

#[async_trait]
impl Verifier for SyntaxVerifier {
    async fn verify(&self, path: &Path) -> IrisResult<Verdict> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        // Edits may delete a file's only content; a missing file has nothing to parse.
        if !path.exists() {
            return Ok(Verdict::Passed);
        }

        let verdict = if ext == "py" {
            self.check_python(path).await?
        } else {
            let content = tokio::fs::read_to_string(path).await?;
            Self::check_text(&ext, &content)
        };
        debug!(path = %path.display(), passed = verdict.is_passed(), "verified");
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    async fn verdict_for(name: &str, content: &str) -> Verdict {
        let dir = tempdir().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        SyntaxVerifier::default().verify(&path).await.unwrap()
    }

    #[tokio::test]
    async fn test_json_checks() {
        assert!(verdict_for("a.json", r#"{"ok": true}"#).await.is_passed());
        assert!(!verdict_for("a.json", r#"{"ok": tru"#).await.is_passed());
    }

    #[tokio::test]
    async fn test_toml_checks() {
        assert!(verdict_for("c.toml", "[a]\nb = 1\n").await.is_passed());
        assert!(!verdict_for("c.toml", "[a\nb = ").await.is_passed());
    }

    #[tokio::test]
    async fn test_yaml_checks() {
        assert!(verdict_for("c.yml", "a: 1\nb: [1, 2]\n").await.is_passed());
        assert!(!verdict_for("c.yaml", "a: [1, 2\n").await.is_passed());
    }

    #[tokio::test]
    async fn test_other_types_pass() {
        assert!(verdict_for("notes.txt", "{{{ not json").await.is_passed());
        assert!(verdict_for("Makefile", "all:\n").await.is_passed());
    }

    #[tokio::test]
    async fn test_missing_python_passes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.py");
        fs::write(&path, "def broken(:\n").unwrap();
        let verifier = SyntaxVerifier::new("iris-no-such-python");
        assert!(verifier.verify(&path).await.unwrap().is_passed());
    }
}
