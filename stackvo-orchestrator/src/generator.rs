//! Artifact generator: regenerates compose files from `.env` and project
//! definitions.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::process::{self, CommandOutput, CommandSpec, ProcessError, RunContext};

/// Which artifacts to regenerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateScope {
    Services,
    Projects,
    All,
}

impl fmt::Display for GenerateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerateScope::Services => f.write_str("services"),
            GenerateScope::Projects => f.write_str("projects"),
            GenerateScope::All => f.write_str("all"),
        }
    }
}

/// Regenerates derived container definitions. Must be idempotent.
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    async fn generate(
        &self,
        scope: GenerateScope,
        ctx: &RunContext,
    ) -> Result<CommandOutput, ProcessError>;
}

/// Runs `bash <script> generate [services|projects]` from the stack root.
pub struct ScriptGenerator {
    script: PathBuf,
    root: PathBuf,
}

impl ScriptGenerator {
    pub fn new(script: PathBuf, root: PathBuf) -> Self {
        Self { script, root }
    }

    pub fn command(&self, scope: GenerateScope) -> CommandSpec {
        let spec = CommandSpec::new("bash", &self.root)
            .arg(self.script.to_string_lossy())
            .arg("generate");
        match scope {
            GenerateScope::All => spec,
            other => spec.arg(other.to_string()),
        }
    }
}

#[async_trait]
impl ArtifactGenerator for ScriptGenerator {
    async fn generate(
        &self,
        scope: GenerateScope,
        ctx: &RunContext,
    ) -> Result<CommandOutput, ProcessError> {
        process::run(&self.command(scope), ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_all_passes_no_argument() {
        let gen = ScriptGenerator::new("/stack/core/cli/stackvo.sh".into(), "/stack".into());
        assert_eq!(
            gen.command(GenerateScope::All).display(),
            "bash /stack/core/cli/stackvo.sh generate"
        );
        assert_eq!(
            gen.command(GenerateScope::Projects).display(),
            "bash /stack/core/cli/stackvo.sh generate projects"
        );
    }

    #[tokio::test]
    async fn runs_script_in_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("gen.sh");
        std::fs::write(&script, "echo \"$1 $2\" > out.txt\n").unwrap();

        let gen = ScriptGenerator::new(script, dir.path().to_path_buf());
        let out = gen
            .generate(GenerateScope::Services, &RunContext::quiet())
            .await
            .expect("run");
        assert!(out.success());
        let written = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(written.trim(), "generate services");
    }
}
