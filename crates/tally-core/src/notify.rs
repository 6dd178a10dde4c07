use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;

/// Receives the number of incomplete todos whenever the collection changes.
/// Delivery is best effort: the store logs and drops any error.
pub trait WidgetNotifier {
    fn update_widget(&mut self, active: usize) -> anyhow::Result<()>;
}

/// Used where no widget surface exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl WidgetNotifier for NoopNotifier {
    fn update_widget(&mut self, active: usize) -> anyhow::Result<()> {
        debug!(active, "no widget surface; skipping update");
        Ok(())
    }
}

/// Runs executable `on-change.*` scripts from the hooks directory with the
/// active count as argument and as a line on stdin.
#[derive(Debug, Clone)]
pub struct HookNotifier {
    enabled: bool,
    hooks_dir: PathBuf,
}

impl HookNotifier {
    pub fn new(cfg: &Config, data_dir: &Path) -> Self {
        let enabled = cfg.get_bool("hooks").unwrap_or(true);
        let hooks_dir = data_dir.join("hooks");
        debug!(
            enabled,
            hooks_dir = %hooks_dir.display(),
            "initialized widget hook notifier"
        );
        Self { enabled, hooks_dir }
    }

    #[instrument(skip(self))]
    fn list_scripts(&self) -> anyhow::Result<Vec<PathBuf>> {
        if !self.hooks_dir.exists() {
            return Ok(Vec::new());
        }

        let mut scripts = Vec::new();
        for entry in fs::read_dir(&self.hooks_dir)
            .with_context(|| format!("failed to read hooks dir {}", self.hooks_dir.display()))?
        {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !name.starts_with("on-change.") {
                continue;
            }

            if !is_executable(&path)? {
                debug!(path = %path.display(), "skipping non-executable hook");
                continue;
            }

            scripts.push(path);
        }

        scripts.sort();
        Ok(scripts)
    }
}

impl WidgetNotifier for HookNotifier {
    #[instrument(skip(self))]
    fn update_widget(&mut self, active: usize) -> anyhow::Result<()> {
        if !self.enabled {
            debug!("hooks disabled; skipping on-change");
            return Ok(());
        }

        let scripts = self.list_scripts()?;
        debug!(count = scripts.len(), "running on-change hooks");
        for script in scripts {
            run_hook(&script, active)?;
        }
        Ok(())
    }
}

fn run_hook(path: &Path, active: usize) -> anyhow::Result<()> {
    info!(hook = %path.display(), active, "running hook");
    let mut child = Command::new(path)
        .arg(active.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to run hook {}", path.display()))?;

    if let Some(mut stdin) = child.stdin.take() {
        // A hook that exits without reading closes the pipe early.
        if let Err(err) = writeln!(stdin, "{active}") {
            debug!(hook = %path.display(), error = %err, "hook did not read stdin");
        }
    }

    let output = child
        .wait_with_output()
        .with_context(|| format!("failed to wait for hook {}", path.display()))?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        return Err(anyhow!(
            "hook {} failed with status {}: {}",
            path.display(),
            output
                .status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            stderr
        ));
    }

    if !stderr.is_empty() {
        warn!(hook = %path.display(), stderr = %stderr, "hook wrote stderr");
    }

    Ok(())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> anyhow::Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(path)?.permissions().mode();
    Ok(mode & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> anyhow::Result<bool> {
    Ok(path.is_file())
}

/// Keeps every pushed count; can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    pub pushed: Vec<usize>,
    pub fail: bool,
}

impl WidgetNotifier for RecordingNotifier {
    fn update_widget(&mut self, active: usize) -> anyhow::Result<()> {
        self.pushed.push(active);
        if self.fail {
            return Err(anyhow!("widget bridge unavailable"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn config_with(hooks: &str) -> Config {
        let mut cfg = Config::defaults();
        cfg.apply_overrides([("hooks".to_string(), hooks.to_string())]);
        cfg
    }

    #[test]
    fn missing_hooks_dir_is_a_noop() {
        let temp = tempdir().expect("tempdir");
        let mut notifier = HookNotifier::new(&config_with("on"), temp.path());
        notifier.update_widget(3).expect("no hooks means nothing to fail");
    }

    // Both scenarios share one test so no other test thread forks while a
    // freshly written script is still open.
    #[cfg(unix)]
    #[test]
    fn on_change_hooks_receive_the_count_and_report_failures() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().expect("tempdir");
        let hooks = temp.path().join("hooks");
        fs::create_dir_all(&hooks).expect("hooks dir");
        let out = temp.path().join("count.txt");

        let script = hooks.join("on-change.widget");
        fs::write(&script, format!("#!/bin/sh\necho \"$1\" > {}\n", out.display()))
            .expect("write hook");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
        fs::write(hooks.join("on-change.plain"), "#!/bin/sh\nexit 1\n").expect("write");

        let mut notifier = HookNotifier::new(&config_with("on"), temp.path());
        notifier.update_widget(7).expect("hook runs");
        assert_eq!(fs::read_to_string(&out).expect("hook output").trim(), "7");

        let broken = hooks.join("on-change.zz-broken");
        fs::write(&broken, "#!/bin/sh\necho nope >&2\nexit 3\n").expect("write hook");
        fs::set_permissions(&broken, fs::Permissions::from_mode(0o755)).expect("chmod");

        let err = notifier.update_widget(1).expect_err("non-zero exit");
        assert!(err.to_string().contains("status 3"));

        let mut disabled = HookNotifier::new(&config_with("off"), temp.path());
        disabled.update_widget(1).expect("disabled hooks never run");
    }
}
