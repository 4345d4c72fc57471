//! The public facade: lifecycle, path-level operations, and handles.
//!
//! All state lives behind one [`FileSystem`] value, the explicit stand-in
//! for what the original emulator kept in process-wide globals. The
//! system is single-threaded and non-reentrant; every call runs to
//! completion synchronously.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::alloc;
use crate::block;
use crate::dir;
use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::hash::hash_name;
use crate::path;
use crate::record::{FILE_HEADER_SIZE, FileHeader, FileKind, OpenMode};

/// Name given to the root directory at format time.
const ROOT_NAME: &str = "root";

/// A borrowed reference to a file header inside the disk.
///
/// Handles are plain offsets and are revalidated on every use: a handle
/// that outlives `remove`, `load`, or `free` fails with
/// [`Error::BadTag`] (or [`Error::NotInitialized`]) instead of touching
/// stale bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle {
    offset: u64,
}

impl FileHandle {
    /// The disk offset of the underlying file header record.
    #[must_use]
    pub const fn offset(self) -> u64 {
        self.offset
    }
}

/// One line of a directory listing.
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct Entry {
    /// Offset of the entry's file header.
    pub offset: u64,
    /// Entry name; `.` and `..` for the self and parent slots.
    pub name: String,
    /// File or directory.
    pub kind: FileKind,
    /// Payload size in bytes.
    pub size: u64,
}

/// Metadata snapshot of one file, as reported by [`FileSystem::stat`].
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct FileStat {
    /// Offset of the file header record.
    pub offset: u64,
    /// Stored component name.
    pub name: String,
    /// File or directory.
    pub kind: FileKind,
    /// Current open mode.
    pub mode: OpenMode,
    /// Payload size in bytes.
    pub size: u64,
    /// Offset of the first data block (0 when empty).
    pub first_block: u64,
    /// Number of blocks in the payload chain.
    pub blocks: u64,
}

/// A POSIX-style hierarchical file system emulated on one contiguous
/// byte image.
///
/// Starts uninitialized; [`FileSystem::init`] formats a fresh disk and
/// [`FileSystem::load`] adopts a dumped image. [`FileSystem::free`]
/// returns to the uninitialized state.
#[derive(Debug, Default)]
pub struct FileSystem {
    disk: Option<Disk>,
}

impl FileSystem {
    /// Creates an uninitialized file system.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn disk(&self) -> Result<&Disk> {
        self.disk.as_ref().ok_or(Error::NotInitialized)
    }

    fn disk_mut(&mut self) -> Result<&mut Disk> {
        self.disk.as_mut().ok_or(Error::NotInitialized)
    }

    /// Whether a disk is currently live.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.disk.is_some()
    }

    /// Formats a fresh disk of `disk_size` bytes and creates the root
    /// directory.
    ///
    /// Fails with [`Error::AlreadyInitialized`] if a disk is live; call
    /// [`FileSystem::free`] first.
    pub fn init(&mut self, disk_size: u64) -> Result<()> {
        if self.disk.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        let mut disk = Disk::format(disk_size)?;

        // The root is built by hand: it has no parent directory to be
        // published in, and it is its own parent.
        let root = alloc::allocate(&mut disk, FILE_HEADER_SIZE)?;
        FileHeader::new(ROOT_NAME, hash_name(ROOT_NAME), FileKind::Dir)
            .write_at(&mut disk, root)?;
        block::write_data(&mut disk, root, &root.to_le_bytes())?;
        block::write_data(&mut disk, root, &root.to_le_bytes())?;
        disk.set_root_directory(root)?;
        disk.set_current_directory(root)?;

        self.disk = Some(disk);
        info!(disk_size, "formatted new disk");
        Ok(())
    }

    /// Loads a dumped image from a host file, replacing any live state.
    ///
    /// The image must carry the header magic; a rejected image leaves
    /// the current state untouched.
    pub fn load(&mut self, host_path: impl AsRef<Path>) -> Result<()> {
        let host_path = host_path.as_ref();
        let image = std::fs::read(host_path)?;
        let disk = Disk::from_image(image)?;
        self.disk = Some(disk);
        info!(path = %host_path.display(), "loaded disk image");
        Ok(())
    }

    /// Writes the entire disk image verbatim to a host file.
    pub fn dump(&self, host_path: impl AsRef<Path>) -> Result<()> {
        let host_path = host_path.as_ref();
        std::fs::write(host_path, self.disk()?.as_bytes())?;
        info!(path = %host_path.display(), "dumped disk image");
        Ok(())
    }

    /// Tears down the live disk, returning to the uninitialized state.
    /// Outstanding handles become invalid.
    pub fn free(&mut self) -> Result<()> {
        self.disk.take().map(|_| ()).ok_or(Error::NotInitialized)
    }

    /// Creates a new regular file and opens it for writing.
    ///
    /// Unlike [`FileSystem::open`] with [`OpenMode::Write`], this fails
    /// with [`Error::AlreadyExists`] when the name is already taken in
    /// the parent directory.
    pub fn create(&mut self, file_path: &str) -> Result<FileHandle> {
        let disk = self.disk_mut()?;
        let resolved = path::resolve(disk, file_path)?;
        if resolved.name.is_empty() {
            return Err(Error::InvalidPath {
                path: file_path.into(),
            });
        }
        if resolved.entry.is_some() {
            return Err(Error::AlreadyExists {
                name: resolved.name,
            });
        }
        let offset = dir::create_child(disk, resolved.dir, &resolved.name, FileKind::File)?;
        set_mode(disk, offset, OpenMode::Write)?;
        Ok(FileHandle { offset })
    }

    /// Opens a regular file.
    ///
    /// [`OpenMode::Write`] truncates an existing file (or creates a
    /// missing one); [`OpenMode::Read`] and [`OpenMode::Append`] require
    /// the file to exist. Directories cannot be opened.
    pub fn open(&mut self, file_path: &str, mode: OpenMode) -> Result<FileHandle> {
        let disk = self.disk_mut()?;
        let resolved = path::resolve(disk, file_path)?;
        match mode {
            OpenMode::Write => {
                if resolved.name.is_empty() {
                    return Err(Error::WrongType {
                        name: file_path.into(),
                        expected: "regular file",
                    });
                }
                if let Some(found) = resolved.entry {
                    let header = FileHeader::read_at(disk, found.header)?;
                    if header.kind != FileKind::File {
                        return Err(Error::WrongType {
                            name: header.name_str(),
                            expected: "regular file",
                        });
                    }
                    block::truncate(disk, found.header)?;
                    set_mode(disk, found.header, OpenMode::Write)?;
                    Ok(FileHandle {
                        offset: found.header,
                    })
                } else {
                    let offset =
                        dir::create_child(disk, resolved.dir, &resolved.name, FileKind::File)?;
                    set_mode(disk, offset, OpenMode::Write)?;
                    Ok(FileHandle { offset })
                }
            }
            OpenMode::Read | OpenMode::Append => {
                let target = resolved.target(file_path)?;
                let header = FileHeader::read_at(disk, target)?;
                if header.kind != FileKind::File {
                    return Err(Error::WrongType {
                        name: header.name_str(),
                        expected: "regular file",
                    });
                }
                set_mode(disk, target, mode)?;
                Ok(FileHandle { offset: target })
            }
            OpenMode::None => Err(Error::WrongType {
                name: file_path.into(),
                expected: "readable, writable, or appendable open mode",
            }),
        }
    }

    /// Clears the handle's open-mode bits. The header stays on the disk.
    pub fn close(&mut self, handle: FileHandle) -> Result<()> {
        let disk = self.disk_mut()?;
        set_mode(disk, handle.offset, OpenMode::None)
    }

    /// Appends `data` to a file opened with [`OpenMode::Write`] or
    /// [`OpenMode::Append`].
    pub fn write(&mut self, handle: FileHandle, data: &[u8]) -> Result<()> {
        let disk = self.disk_mut()?;
        let header = FileHeader::read_at(disk, handle.offset)?;
        if !header.mode.is_writable() {
            return Err(Error::WrongType {
                name: header.name_str(),
                expected: "writable file",
            });
        }
        block::write_data(disk, handle.offset, data)
    }

    /// Emits the file's full contents to `sink` and returns the byte
    /// count.
    pub fn read(&self, handle: FileHandle, sink: &mut impl Write) -> Result<u64> {
        let disk = self.disk()?;
        let header = FileHeader::read_at(disk, handle.offset)?;
        if header.kind != FileKind::File {
            return Err(Error::WrongType {
                name: header.name_str(),
                expected: "regular file",
            });
        }
        if header.first_block == 0 {
            return Ok(0);
        }
        block::read_contents(disk, header.first_block, sink)
    }

    /// Reads the file's full contents into a fresh buffer.
    pub fn read_to_vec(&self, handle: FileHandle) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.read(handle, &mut out)?;
        Ok(out)
    }

    /// Creates a directory at `dir_path`, initialized with its self and
    /// parent slots.
    pub fn create_dir(&mut self, dir_path: &str) -> Result<()> {
        let disk = self.disk_mut()?;
        let resolved = path::resolve(disk, dir_path)?;
        if resolved.name.is_empty() {
            return Err(Error::InvalidPath {
                path: dir_path.into(),
            });
        }
        if resolved.entry.is_some() {
            return Err(Error::AlreadyExists {
                name: resolved.name,
            });
        }
        dir::create_child(disk, resolved.dir, &resolved.name, FileKind::Dir)?;
        Ok(())
    }

    /// Rebinds the current working directory.
    pub fn change_dir(&mut self, dir_path: &str) -> Result<()> {
        let disk = self.disk_mut()?;
        let target = path::resolve_dir(disk, dir_path)?;
        disk.set_current_directory(target)
    }

    /// Removes a regular file.
    pub fn remove_file(&mut self, file_path: &str) -> Result<()> {
        self.remove(file_path, FileKind::File)
    }

    /// Removes an empty directory. Directories with live user entries
    /// fail with [`Error::NotEmpty`]; the current and root directories
    /// are never removable.
    pub fn remove_dir(&mut self, dir_path: &str) -> Result<()> {
        self.remove(dir_path, FileKind::Dir)
    }

    fn remove(&mut self, target_path: &str, kind: FileKind) -> Result<()> {
        let disk = self.disk_mut()?;
        let resolved = path::resolve(disk, target_path)?;
        let found = resolved.entry.ok_or_else(|| {
            if resolved.name.is_empty() {
                // "." / ".." / "/" never name a removable slot.
                Error::InvalidPath {
                    path: target_path.into(),
                }
            } else {
                Error::NotFound {
                    path: target_path.into(),
                }
            }
        })?;
        let header = FileHeader::read_at(disk, found.header)?;
        if header.kind != kind {
            return Err(Error::WrongType {
                name: header.name_str(),
                expected: match kind {
                    FileKind::File => "regular file",
                    FileKind::Dir => "directory",
                },
            });
        }
        if found.header == disk.current_directory() || found.header == disk.root_directory() {
            return Err(Error::InvalidPath {
                path: target_path.into(),
            });
        }
        if kind == FileKind::Dir && !dir::is_empty(disk, found.header)? {
            return Err(Error::NotEmpty {
                name: header.name_str(),
            });
        }
        dir::remove_child(disk, found)
    }

    /// Lists a directory, or the cwd when `dir_path` is `None`.
    ///
    /// Tombstone slots are skipped; the self and parent slots come back
    /// named `.` and `..`.
    pub fn list(&self, dir_path: Option<&str>) -> Result<Vec<Entry>> {
        let disk = self.disk()?;
        let target = match dir_path {
            Some(p) => path::resolve_dir(disk, p)?,
            None => disk.current_directory(),
        };
        let mut entries = Vec::new();
        for (index, slot) in dir::slots(disk, target)?.iter().enumerate() {
            if slot.value == 0 {
                continue;
            }
            let header = FileHeader::read_at(disk, slot.value)?;
            let name = match index {
                0 => ".".to_owned(),
                1 => "..".to_owned(),
                _ => header.name_str(),
            };
            entries.push(Entry {
                offset: slot.value,
                name,
                kind: header.kind,
                size: header.size,
            });
        }
        Ok(entries)
    }

    /// Renders the absolute path of the current working directory.
    pub fn pwd(&self) -> Result<String> {
        let disk = self.disk()?;
        let mut current = disk.current_directory();
        disk.check_access(current)?;
        let mut names = Vec::new();
        loop {
            names.push(FileHeader::read_at(disk, current)?.name_str());
            let parent = dir::parent_of(disk, current)?;
            if parent == current {
                break;
            }
            current = parent;
        }
        names.reverse();
        Ok(format!("/{}", names.join("/")))
    }

    /// Reports a file's metadata.
    pub fn stat(&self, handle: FileHandle) -> Result<FileStat> {
        let disk = self.disk()?;
        let header = FileHeader::read_at(disk, handle.offset)?;
        Ok(FileStat {
            offset: handle.offset,
            name: header.name_str(),
            kind: header.kind,
            mode: header.mode,
            size: header.size,
            first_block: header.first_block,
            blocks: block::chain_len(disk, header.first_block)?,
        })
    }
}

/// Rewrites the mode bits of the header at `offset`.
fn set_mode(disk: &mut Disk, offset: u64, mode: OpenMode) -> Result<()> {
    let mut header = FileHeader::read_at(disk, offset)?;
    header.mode = mode;
    header.write_at(disk, offset)
}
