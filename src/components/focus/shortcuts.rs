use super::FocusController;
use crate::error::{focus_error, SyncResult};
use async_trait::async_trait;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// A shortcut that hangs (e.g. waiting on a permission prompt) is abandoned
/// after this long and retried on a later tick
const RUN_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives Focus Modes by running user-provided shortcuts through the
/// `shortcuts` command-line tool
#[derive(Debug, Clone)]
pub struct ShortcutsFocus {
    binary: String,
    on_shortcut: String,
    off_shortcut: String,
}

impl ShortcutsFocus {
    pub fn new(
        binary: impl Into<String>,
        on_shortcut: impl Into<String>,
        off_shortcut: impl Into<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            on_shortcut: on_shortcut.into(),
            off_shortcut: off_shortcut.into(),
        }
    }

    /// Names of the shortcuts this controller runs, `(on, off)`
    pub fn shortcut_names(&self) -> (&str, &str) {
        (&self.on_shortcut, &self.off_shortcut)
    }

    async fn invoke(&self, args: &[&str]) -> SyncResult<Output> {
        debug!("Running {} {}", self.binary, args.join(" "));
        let child = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(RUN_TIMEOUT, child)
            .await
            .map_err(|_| focus_error(&format!("{} {} timed out", self.binary, args.join(" "))))?
            .map_err(|e| focus_error(&format!("Failed to start {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(focus_error(&format!(
                "{} {} exited with {}: {}",
                self.binary,
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        Ok(output)
    }

    /// Run a shortcut by name
    pub async fn run_shortcut(&self, name: &str) -> SyncResult<()> {
        self.invoke(&["run", name]).await?;
        Ok(())
    }
}

#[async_trait]
impl FocusController for ShortcutsFocus {
    async fn set_focus(&self, on: bool) -> SyncResult<()> {
        let name = if on { &self.on_shortcut } else { &self.off_shortcut };
        self.run_shortcut(name).await?;
        info!("Focus {} via shortcut '{}'", if on { "enabled" } else { "disabled" }, name);
        Ok(())
    }

    async fn list_shortcuts(&self) -> SyncResult<Vec<String>> {
        let output = self.invoke(&["list"]).await?;
        Ok(parse_shortcut_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// One shortcut name per line
pub fn parse_shortcut_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
