//! Child process execution.

use anyhow::{Context, Result};
use log::debug;
use std::path::Path;
use tokio::process::Command;

use super::{ExecOutput, RealRuntime};

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) async fn exec_impl(
        &self,
        cwd: &Path,
        program: &str,
        args: &[String],
    ) -> Result<ExecOutput> {
        debug!("Running {} {} in {:?}", program, args.join(" "), cwd);

        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .with_context(|| format!("Failed to spawn `{}`", program))?;

        Ok(ExecOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
