use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

/// Grace added on top of helm's own `--timeout` before the process itself
/// is killed.
const INSTALL_GRACE: Duration = Duration::from_secs(60);
const UNINSTALL_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(thiserror::Error, Debug)]
pub enum HelmError {
    #[error("helm failed: {0}")]
    Failed(String),
    #[error("helm timed out after {0:?}")]
    TimedOut(Duration),
    #[error("failed to run '{bin}': {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },
}

/// Invokes the external installer as a blocking subprocess with a hard
/// wall-clock timeout.
pub struct HelmRunner {
    bin: String,
}

impl HelmRunner {
    pub fn new(bin: String) -> Self {
        Self { bin }
    }

    /// Install-or-upgrade a release and wait for it to become ready.
    /// Re-invocation with the same release name and parameters converges
    /// instead of erroring.
    pub async fn apply_release(
        &self,
        release: &str,
        chart: &str,
        namespace: &str,
        parameters: &[String],
        timeout: Duration,
    ) -> Result<String, HelmError> {
        let mut args: Vec<String> = vec![
            "upgrade".into(),
            "--install".into(),
            release.into(),
            chart.into(),
            "-n".into(),
            namespace.into(),
            "--wait".into(),
            format!("--timeout={}s", timeout.as_secs()),
        ];
        args.extend_from_slice(parameters);
        self.run(&args, timeout + INSTALL_GRACE).await
    }

    /// Best-effort uninstall; an already-absent release is success.
    pub async fn remove_release(
        &self,
        release: &str,
        namespace: &str,
    ) -> Result<(), HelmError> {
        let args: Vec<String> = vec![
            "uninstall".into(),
            release.into(),
            "-n".into(),
            namespace.into(),
        ];
        match self.run(&args, UNINSTALL_TIMEOUT).await {
            Ok(_) => Ok(()),
            Err(HelmError::Failed(msg)) if release_not_found(&msg) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn run(
        &self,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, HelmError> {
        // Arguments can carry credentials; log only the subcommand.
        debug!(
            bin = %self.bin,
            subcommand = args.first().map(String::as_str).unwrap_or(""),
            "invoking installer"
        );
        let output_fut =
            Command::new(&self.bin).args(args).kill_on_drop(true).output();
        let output = match tokio::time::timeout(timeout, output_fut).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                return Err(HelmError::Spawn {
                    bin: self.bin.clone(),
                    source: e,
                });
            }
            Err(_) => return Err(HelmError::TimedOut(timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr =
                String::from_utf8_lossy(&output.stderr).trim().to_string();
            let details = if !stderr.is_empty() {
                stderr
            } else if !stdout.is_empty() {
                stdout
            } else {
                "unknown error".to_string()
            };
            return Err(HelmError::Failed(details));
        }
        Ok(stdout)
    }
}

fn release_not_found(msg: &str) -> bool {
    msg.to_ascii_lowercase().contains("not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let helm = HelmRunner::new("echo".into());
        let out = helm
            .run(&["hello".into()], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_without_output_reports_unknown_error() {
        let helm = HelmRunner::new("false".into());
        let err = helm.run(&[], Duration::from_secs(5)).await.unwrap_err();
        match err {
            HelmError::Failed(msg) => assert_eq!(msg, "unknown error"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wall_clock_timeout_kills_the_process() {
        let helm = HelmRunner::new("sleep".into());
        let err = helm
            .run(&["5".into()], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, HelmError::TimedOut(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let helm = HelmRunner::new("/nonexistent/helm".into());
        let err = helm.run(&[], Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, HelmError::Spawn { .. }));
    }

    #[test]
    fn uninstall_not_found_counts_as_success() {
        assert!(release_not_found(
            "Error: uninstall: Release not found: woocommerce-acme-1"
        ));
        assert!(!release_not_found("Error: connection refused"));
    }
}
