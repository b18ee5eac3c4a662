//! Detach from the controlling terminal.
//!
//! Must run before the tokio runtime exists: `fork` only carries the
//! calling thread into the child.

use std::fs::OpenOptions;
use std::io;
use std::os::fd::AsRawFd;

use anyhow::Context;

/// Double-fork into a new session, chdir to `/`, and point stdio at
/// `/dev/null`. Already-open descriptors (the log sink) stay valid.
pub fn daemonize() -> anyhow::Result<()> {
    fork_and_exit_parent().context("first fork")?;

    // SAFETY: plain syscall, single-threaded at this point.
    if unsafe { libc::setsid() } == -1 {
        return Err(io::Error::last_os_error()).context("setsid");
    }

    fork_and_exit_parent().context("second fork")?;

    std::env::set_current_dir("/").context("chdir /")?;

    let devnull = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .context("open /dev/null")?;
    for fd in 0..=2 {
        // SAFETY: both descriptors are valid; dup2 replaces `fd` atomically.
        if unsafe { libc::dup2(devnull.as_raw_fd(), fd) } == -1 {
            return Err(io::Error::last_os_error()).with_context(|| format!("redirect fd {fd}"));
        }
    }

    Ok(())
}

fn fork_and_exit_parent() -> anyhow::Result<()> {
    // SAFETY: no other threads are running, so the child inherits a
    // consistent address space.
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error().into()),
        0 => Ok(()),
        _ => std::process::exit(0),
    }
}
