//! Ctrl-C turned into a flag that the run loop polls.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_signal: libc::c_int)
{
    INTERRUPTED.store(true, Ordering::SeqCst);
    // A second Ctrl-C terminates the process as usual
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
    }
}

/// Catches the next SIGINT instead of letting it end the process
pub fn catch_interrupt() -> io::Result<()>
{
    let handler = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
    let previous = unsafe { libc::signal(libc::SIGINT, handler) };
    if previous == libc::SIG_ERR {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// True once for every caught SIGINT
pub fn take_interrupt() -> bool
{
    INTERRUPTED.swap(false, Ordering::SeqCst)
}
