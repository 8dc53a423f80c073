//! Process restart.
//!
//! A change to the configuration file can change the whole build topology,
//! so the process replaces itself with a fresh copy of the same command line.

use std::path::Path;
use std::process::Command;

/// Re-execute the current binary with the same arguments.
///
/// Does not return unless the new process could not be started.
pub(crate) fn reexec(changed: &Path) {
    tracing::info!(path = %changed.display(), "Configuration changed, restarting");

    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(err) => {
            tracing::error!(error = %err, "Cannot locate current executable");
            return;
        }
    };
    let mut command = Command::new(exe);
    command.args(std::env::args_os().skip(1));

    replace_process(&mut command);
}

#[cfg(unix)]
fn replace_process(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    let err = command.exec();
    tracing::error!(error = %err, "Failed to restart");
}

#[cfg(not(unix))]
fn replace_process(command: &mut Command) {
    match command.spawn() {
        #[allow(clippy::exit)]
        Ok(_) => std::process::exit(0),
        Err(err) => tracing::error!(error = %err, "Failed to restart"),
    }
}
