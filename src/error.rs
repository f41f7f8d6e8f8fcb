//! Fixed error taxonomy shared by every module in this crate.

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The fixed, crate-wide error taxonomy.
///
/// Kinds are grouped the way the originating system grouped them: system,
/// resource, path/name, walker, messaging, and configuration. Socket-related
/// kinds are omitted — the socket transport is an out-of-scope collaborator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An OS call failed with an error this crate does not special-case.
    #[error("system error: {0}")]
    Sys(std::io::Error),

    /// A syscall was interrupted and should be retried by the caller.
    #[error("interrupted")]
    Interrupted,

    /// An operation that would block was attempted in non-blocking mode.
    #[error("operation would block")]
    Again,

    /// Allocation of an internal resource (mapping, fd, node) failed.
    #[error("resource allocation failed")]
    Resource,

    /// A fixed-capacity container is saturated.
    #[error("container is full")]
    Full,

    /// A container expected to hold an item was empty.
    #[error("container is empty")]
    Empty,

    /// A path failed validation (not absolute, contains NUL, etc).
    #[error("invalid path")]
    InvalPath,

    /// A name failed validation (empty, contains '/', etc).
    #[error("invalid name")]
    InvalName,

    /// The OS denied access to a path.
    #[error("access denied")]
    Access,

    /// A lookup (`gets`) found no node matching the given key.
    #[error("key not found")]
    BadKey,

    /// A path exceeded `PATH_MAX`.
    #[error("path too long")]
    PathLen,

    /// A name exceeded `NAME_MAX`.
    #[error("name too long")]
    NameLen,

    /// Composing a path and a name would exceed `PATH_MAX`.
    #[error("composed path overflows PATH_MAX")]
    PathOverflow,

    /// The walker's start path is not a directory.
    #[error("not a directory")]
    NotDir,

    /// A walker step should be skipped (e.g. `EACCES` opening a directory).
    #[error("walker step skipped")]
    FwSkip,

    /// The walker was driven in a way that violates its state machine.
    #[error("walker used in wrong state")]
    FwState,

    /// A directory entry has a type the walker does not classify
    /// (symlink, device, socket, fifo).
    #[error("unsupported entry type")]
    FwUnsupported,

    /// A directory entry's type could not be determined at all.
    #[error("unknown entry type")]
    FwUnknown,

    /// A queue was destroyed while not empty and shut down.
    #[error("queue not empty and shut down")]
    TmNotShutdown,

    /// A queue was destroyed or read after is was fully shut down.
    #[error("queue is shut down")]
    Shutdown,

    /// A bad configuration value was supplied (e.g. non-power-of-two alignment).
    #[error("bad configuration")]
    BadConf,

    /// A caller passed an invalid argument.
    #[error("invalid argument")]
    Arg,

    /// A file descriptor was invalid or closed.
    #[error("bad file descriptor")]
    BadFd,

    /// An invariant that should be unreachable by construction was violated.
    #[error("fatal internal error: {0}")]
    Fatal(&'static str),
}

/// Maps a raw OS `errno` value into an [`Error`], the one pure collaborator
/// this crate keeps from the distilled error-mapping layer. `op` identifies
/// the failing operation only for the `Display` impl of the underlying
/// `io::Error`; it carries no other behavior.
pub fn from_errno(errno: i32) -> Error {
    let io = std::io::Error::from_raw_os_error(errno);
    match errno {
        libc::EINTR => Error::Interrupted,
        libc::EAGAIN => Error::Again,
        libc::EACCES | libc::EPERM => Error::Access,
        libc::ENOMEM => Error::Resource,
        libc::EBADF => Error::BadFd,
        _ => Error::Sys(io),
    }
}

/// Returns the `errno` of the last failing libc call on this thread.
pub fn last_errno() -> i32 {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(0)
}
