use std::process::Stdio;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use crate::{
    domain::port::{Invocation, ProcessOutput, ProcessRunner},
    error::EngineError,
};

/// Runs processes with tokio and waits for them without any timeout.
///
/// A child outlives a dropped call: cancelling it means terminating the process
/// from outside.
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, EngineError> {
        debug!("Running `{}` in {}", invocation, invocation.dir.display());
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&invocation.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(EngineError::io(format!("Can't spawn `{}`", invocation)))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ProcessOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            output: combined,
        })
    }
}
