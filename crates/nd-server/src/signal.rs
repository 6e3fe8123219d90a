//! Signal-driven shutdown.
//!
//! The handler only flips an atomic flag; the main loop polls it after
//! every datagram and the select-based wait returns early with EINTR.

use nd_dos::{msg2err, Error};
use std::sync::atomic::{AtomicBool, Ordering};

static EXIT: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(_sig: libc::c_int) {
    EXIT.store(true, Ordering::Relaxed);
}

/// Install SIGINT/SIGTERM/SIGQUIT handlers and return the exit flag.
pub fn install() -> Result<&'static AtomicBool, Error> {
    for sig in [libc::SIGINT, libc::SIGTERM, libc::SIGQUIT] {
        unsafe {
            let mut action: libc::sigaction = core::mem::zeroed();
            let handler = handle_signal as extern "C" fn(libc::c_int);
            action.sa_sigaction = handler as usize;
            libc::sigemptyset(&mut action.sa_mask);
            // no SA_RESTART: select() must come back with EINTR
            action.sa_flags = 0;
            if libc::sigaction(sig, &action, std::ptr::null_mut()) != 0 {
                return Err(msg2err!(format!(
                    "sigaction({sig}): {}",
                    std::io::Error::last_os_error()
                )));
            }
        }
    }
    Ok(&EXIT)
}
