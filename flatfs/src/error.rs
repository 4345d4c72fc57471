//! Error types for flatfs operations.

/// Alias for `Result<T, flatfs::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by flatfs operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An API entry point was called before `init` or `load`.
    #[error("file system is not initialized")]
    NotInitialized,

    /// `init` was called while a disk was already live.
    #[error("file system is already initialized")]
    AlreadyInitialized,

    /// The allocator scanned the whole disk without finding room.
    #[error("failed to allocate {requested} bytes: disk is full")]
    OutOfSpace {
        /// Number of bytes the caller asked for.
        requested: u64,
    },

    /// An offset of 0 or past the end of the disk was dereferenced.
    #[error("invalid disk offset {offset}")]
    InvalidOffset {
        /// The offending offset.
        offset: u64,
    },

    /// A record's tag byte did not match the expected kind.
    ///
    /// Indicates corruption, a double free, or a handle used after the
    /// record it referred to was removed.
    #[error("bad record tag at offset {offset} (is {found}, should be {expected})")]
    BadTag {
        /// Offset of the record.
        offset: u64,
        /// Tag byte found on the disk.
        found: u8,
        /// Tag byte that was expected.
        expected: u8,
    },

    /// `load` was given an image whose header magic does not match.
    #[error("failed to load disk: invalid header magic {found:#010x}")]
    InvalidMagic {
        /// The first four bytes of the rejected image.
        found: u32,
    },

    /// Path lookup missed.
    #[error("'{path}': no such file or directory")]
    NotFound {
        /// The path that failed to resolve.
        path: String,
    },

    /// Create was asked to make a name that already exists in its parent.
    #[error("'{name}': file already exists")]
    AlreadyExists {
        /// The conflicting component name.
        name: String,
    },

    /// A path component could not be traversed (regular file in the
    /// middle of a path, or a removal that would orphan the cwd/root).
    #[error("'{path}': invalid path")]
    InvalidPath {
        /// The offending path.
        path: String,
    },

    /// The operation needs a different kind of file than it was given.
    #[error("'{name}': not a {expected}")]
    WrongType {
        /// Name of the file involved.
        name: String,
        /// What the operation required ("regular file", "directory", ...).
        expected: &'static str,
    },

    /// `remove_dir` on a directory that still has user entries.
    #[error("'{name}': directory is not empty")]
    NotEmpty {
        /// Name of the non-empty directory.
        name: String,
    },

    /// A host-file read or write failed during `dump`/`load`.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
