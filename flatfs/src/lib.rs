//! POSIX-style hierarchical file system emulated on a single contiguous
//! byte image.
//!
//! The whole file system lives in one in-memory byte buffer ("the
//! disk"): a fixed header, then variable-length tagged records (file
//! headers and data blocks) carved out on demand by a tag-byte scanner.
//! A file's payload is a singly linked chain of blocks addressed by byte
//! offsets; a directory is a file whose payload is an array of offsets,
//! with self and parent references in the first two slots. The image can
//! be dumped to a host file verbatim and loaded back without migration.
//!
//! # Quick start
//!
//! ```
//! use flatfs::{FileSystem, OpenMode};
//!
//! let mut fs = FileSystem::new();
//! fs.init(64 * 1024)?;
//!
//! fs.create_dir("notes")?;
//! let f = fs.open("notes/today.txt", OpenMode::Write)?;
//! fs.write(f, b"hello")?;
//! fs.close(f)?;
//!
//! let f = fs.open("notes/today.txt", OpenMode::Read)?;
//! assert_eq!(fs.read_to_vec(f)?, b"hello");
//! # Ok::<(), flatfs::Error>(())
//! ```
//!
//! The core is single-threaded and non-reentrant; callers wanting
//! concurrency must serialize externally. Crash consistency, links,
//! permissions, and compaction are out of scope.

mod alloc;
mod block;
mod dir;
mod disk;
mod error;
mod fs;
mod hash;
mod path;
mod record;

pub use error::{Error, Result};
pub use fs::{Entry, FileHandle, FileStat, FileSystem};
pub use record::{BLOCK_SIZE, FileKind, OpenMode};

/// Disk size used when the caller does not pick one (1 MiB).
pub const DEFAULT_DISK_SIZE: u64 = 1 << 20;
