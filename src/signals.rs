//! Shutdown on SIGINT/SIGTERM via a dedicated `sigwait` thread.

use std::io;

use crate::cancel::CancellationToken;

#[cfg(unix)]
fn shutdown_set() -> libc::sigset_t {
    let mut set: libc::sigset_t = unsafe { std::mem::zeroed() };
    unsafe {
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGINT);
        libc::sigaddset(&mut set, libc::SIGTERM);
    }
    set
}

/// Block the shutdown signals on the calling thread.
///
/// Must run before any other thread is spawned; threads inherit the mask, so
/// only the waiter started by [`spawn_signal_waiter`] ever sees the signals.
#[cfg(unix)]
pub fn block_shutdown_signals() -> io::Result<()> {
    let set = shutdown_set();
    let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut()) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    Ok(())
}

/// Cancel `token` on the first shutdown signal; exit immediately on a second.
#[cfg(unix)]
pub fn spawn_signal_waiter(token: CancellationToken) -> io::Result<()> {
    use crate::log_dev;

    std::thread::Builder::new()
        .name("signal-wait".to_string())
        .spawn(move || {
            let set = shutdown_set();
            let mut received = 0;
            loop {
                let mut signal: libc::c_int = 0;
                let rc = unsafe { libc::sigwait(&set, &mut signal) };
                if rc != 0 {
                    log_dev!("[SIGNAL] sigwait failed rc={rc}");
                    return;
                }
                received += 1;
                if received > 1 {
                    // Second signal while draining: give up on a clean stop.
                    std::process::exit(128 + signal);
                }
                log_dev!("[SIGNAL] received {signal}, shutting down");
                token.cancel();
            }
        })?;
    Ok(())
}

/// Stub on non-Unix platforms; the default interrupt handling applies.
#[cfg(not(unix))]
pub fn block_shutdown_signals() -> io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
pub fn spawn_signal_waiter(_token: CancellationToken) -> io::Result<()> {
    Ok(())
}
