use tokio::process::Command;

use crate::ExecError;

pub(crate) fn cmd_program(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(|s| s.as_str()));
    cmd
}

/// Ask a process to stop (`SIGTERM`). Best effort: a process that already exited is not an error.
#[cfg(unix)]
pub fn terminate_pid(pid: u32) -> Result<(), ExecError> {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return Err(ExecError::Io(format!("pid out of range: {pid}")));
    };
    let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err.into())
    }
}

#[cfg(not(unix))]
pub fn terminate_pid(_pid: u32) -> Result<(), ExecError> {
    Err(ExecError::Unsupported)
}
