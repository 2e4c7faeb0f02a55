//! Focus Mode control. The OS has no public API for Focus Modes, so they
//! are toggled by running shortcuts the user created for that purpose.

mod shortcuts;

pub use shortcuts::{parse_shortcut_list, ShortcutsFocus};

use crate::config::Config;
use crate::error::{focus_error, SyncResult};
use async_trait::async_trait;

/// Turns the Focus Mode on and off
#[async_trait]
pub trait FocusController: Send + Sync {
    async fn set_focus(&self, on: bool) -> SyncResult<()>;

    /// Shortcuts available to run
    async fn list_shortcuts(&self) -> SyncResult<Vec<String>>;
}

/// Build the controller described by the config
pub fn from_config(config: &Config) -> ShortcutsFocus {
    ShortcutsFocus::new(
        config.shortcuts_binary.clone(),
        config.focus_on_shortcut.clone(),
        config.focus_off_shortcut.clone(),
    )
}

/// Verify that every shortcut in `required` exists
pub async fn check_shortcuts(controller: &dyn FocusController, required: &[&str]) -> SyncResult<()> {
    let available = controller.list_shortcuts().await?;
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| !available.iter().any(|a| a == name))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(focus_error(&format!(
            "Missing shortcuts: {}. Create them in the Shortcuts app.",
            missing.join(", ")
        )))
    }
}
