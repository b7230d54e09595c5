//! Lifecycle hook scaffolding
//!
//! Each interface gets its own hook directory. The rendered interface
//! files dispatch into it at the four lifecycle steps; this module makes
//! sure a default hook script exists without ever touching one the
//! operator has customized.

use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;

/// The four lifecycle steps, in interface-file order
pub const STEPS: [&str; 4] = ["PreUp", "PostUp", "PreDown", "PostDown"];

/// File name of the scaffolded default hook
pub const DEFAULT_HOOK_FILE: &str = "default.sh";

const HOOK_TEMPLATE: &str = r#"#!/bin/sh
# wgden lifecycle hook. Invoked as: default.sh <step> <interface>
step="$1"
iface="$2"

case "$step" in
    PreUp)
        # runs before the interface comes up
        ;;
    PostUp)
        # e.g. iptables -A FORWARD -i "$iface" -j ACCEPT
        ;;
    PreDown)
        ;;
    PostDown)
        # e.g. iptables -D FORWARD -i "$iface" -j ACCEPT
        ;;
esac

exit 0
"#;

/// Shell command dispatching one lifecycle step into a hook directory
///
/// Runs every executable in the directory in shell-glob (name-sorted)
/// order, passing the step and interface name. A missing directory,
/// non-executable entries and failing hooks are all tolerated; one
/// broken hook never blocks the rest or the interface itself.
pub fn dispatch_command(step: &str, hook_dir: &Path) -> String {
    format!(
        "for hook in '{}'/*; do [ -x \"$hook\" ] && \"$hook\" {} %i || true; done",
        hook_dir.display(),
        step
    )
}

/// Make sure the hook directory exists and carries the default script
///
/// Create-once semantics: an existing `default.sh` is never rewritten,
/// even when it differs from the template.
pub fn ensure_default(hook_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(hook_dir)?;

    let path = hook_dir.join(DEFAULT_HOOK_FILE);
    if path.exists() {
        debug!(path = %path.display(), "default hook present, leaving untouched");
        return Ok(());
    }

    std::fs::write(&path, HOOK_TEMPLATE)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    }
    info!(path = %path.display(), "default hook scaffolded");
    Ok(())
}
