//! Small process-related helpers shared across the workspace.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

#[cfg(feature = "tokio")]
mod run;

#[cfg(feature = "tokio")]
pub use run::{CapturedOutput, RunError, run_captured};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// Resolve a program name against `PATH`.
///
/// Names containing a path separator are checked as given. Returns `None` when
/// nothing executable is found.
pub fn resolve_program(program: impl AsRef<Path>) -> Option<PathBuf> {
    let program = program.as_ref();
    if program.components().count() > 1 || program.is_absolute() {
        return is_executable(program).then(|| program.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(program);
        if is_executable(&candidate) {
            return Some(candidate);
        }

        #[cfg(windows)]
        {
            let candidate = candidate.with_extension("exe");
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }

        None
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn resolves_programs_on_path() {
        let sh = resolve_program("sh").expect("sh should be on PATH");
        assert!(sh.is_absolute());
        assert!(sh.ends_with("sh"));
    }

    #[test]
    fn explicit_paths_are_checked_directly() {
        assert!(resolve_program("/bin/sh").is_some());
        assert!(resolve_program("/definitely/not/here/rclone").is_none());
    }

    #[test]
    fn unknown_programs_are_not_resolved() {
        assert!(resolve_program("rclone-does-not-exist-anywhere").is_none());
    }
}
