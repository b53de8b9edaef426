use nix::errno::Errno;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;

/// Kill the entire process group led by `pid` via `killpg(SIGKILL)`.
///
/// Requires the child to have been spawned with `process_group(0)` so that its
/// PGID equals its PID. Returns whether any process received the signal; a
/// group that no longer exists is not an error.
pub(crate) fn kill_process_group(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    killpg(Pid::from_raw(pid), Signal::SIGKILL).is_ok()
}

/// Whether `pid` still names a process, zombies included.
pub fn process_exists(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    !matches!(kill(Pid::from_raw(pid), Option::<Signal>::None), Err(Errno::ESRCH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_exists() {
        assert!(process_exists(std::process::id()));
    }

    #[test]
    fn kill_process_group_reaps_whole_group() {
        use std::os::unix::process::CommandExt;

        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();
        assert!(kill_process_group(child.id()));

        let status = child.wait().unwrap();
        assert!(!status.success());
        assert!(!process_exists(child.id()));
        // Nothing left to signal.
        assert!(!kill_process_group(child.id()));
    }
}
