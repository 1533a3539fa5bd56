use crate::error::{Result, TransportError};

/// Request a kernel receive buffer of `size` bytes (`SO_RCVBUF`).
///
/// The kernel may round or cap the value; callers should treat it as a hint.
#[cfg(unix)]
pub(crate) fn set_recv_buffer_size<S: std::os::fd::AsRawFd>(socket: &S, size: usize) -> Result<()> {
    let fd = socket.as_raw_fd();
    let value = size.min(libc::c_int::MAX as usize) as libc::c_int;

    // SAFETY: `value` is a live c_int for the duration of the call and the
    // length matches its size; `fd` is an open socket owned by the caller.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            (&value as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };

    if rc == 0 {
        Ok(())
    } else {
        Err(TransportError::SocketOption {
            option: "SO_RCVBUF",
            source: std::io::Error::last_os_error(),
        })
    }
}

#[cfg(not(unix))]
pub(crate) fn set_recv_buffer_size<S>(_socket: &S, _size: usize) -> Result<()> {
    Ok(())
}
