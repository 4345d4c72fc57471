//! CLI driver for the flatfs file-system emulator.
//!
//! Without arguments a fresh disk image is formatted at the data path.
//! With arguments the image is loaded, the requested operations are
//! applied in a fixed order (`-p -c -d -w -a -v -x -z -r -i -l -o`), and
//! the image is dumped back, including state mutated by operations that
//! succeeded before a later one failed.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use colored::Colorize;
use flatfs::{DEFAULT_DISK_SIZE, Entry, FileKind, FileStat, FileSystem, OpenMode};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "flatfs",
    version,
    about = "File system emulator on a single disk image"
)]
struct Cli {
    /// Create a new file.
    #[arg(short = 'c', long = "create", value_name = "FILE")]
    create: Option<String>,

    /// Read a file's contents to stdout.
    #[arg(short = 'r', long = "read", value_name = "FILE")]
    read: Option<String>,

    /// Create a new directory.
    #[arg(short = 'd', long = "create-dir", value_name = "DIR")]
    create_dir: Option<String>,

    /// Remove a regular file.
    #[arg(short = 'x', long = "remove", value_name = "FILE")]
    remove: Option<String>,

    /// Remove an empty directory.
    #[arg(short = 'z', long = "remove-dir", value_name = "DIR")]
    remove_dir: Option<String>,

    /// Change the working directory.
    #[arg(short = 'v', long = "change-dir", value_name = "DIR")]
    change_dir: Option<String>,

    /// List directory contents (the working directory when DIR is
    /// omitted).
    #[arg(
        short = 'l',
        long = "list",
        value_name = "DIR",
        num_args = 0..=1,
        default_missing_value = ""
    )]
    list: Option<String>,

    /// Write data to a file, truncating it first.
    #[arg(
        short = 'w',
        long = "write",
        value_names = ["FILE", "DATA"],
        num_args = 2
    )]
    write: Option<Vec<String>>,

    /// Append data to an existing file.
    #[arg(
        short = 'a',
        long = "append",
        value_names = ["FILE", "DATA"],
        num_args = 2
    )]
    append: Option<Vec<String>>,

    /// Print file info.
    #[arg(short = 'i', long = "info", value_name = "FILE")]
    info: Option<String>,

    /// Persist a new directory for the disk image.
    #[arg(short = 'p', long = "path", value_name = "PATH")]
    path: Option<PathBuf>,

    /// Enumerate all options on one line.
    #[arg(short = 'o', long = "options")]
    options: bool,

    /// Output format for list and info.
    #[arg(long, default_value = "table")]
    format: OutputFormat,

    /// Generate shell completion scripts.
    #[arg(long, value_name = "SHELL", hide = true)]
    completion: Option<Shell>,
}

/// Output format for list/info commands.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    /// Human-readable table.
    #[default]
    Table,
    /// Machine-readable JSON.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("flatfs: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completion {
        clap_complete::generate(
            shell,
            &mut Cli::command(),
            "flatfs",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    if let Some(new_path) = &cli.path {
        persist_data_path(new_path)?;
    }

    let image = disk_image_path()?;
    let mut fs = FileSystem::new();

    if !cli.has_ops() {
        fs.init(DEFAULT_DISK_SIZE)?;
        dump(&fs, &image)?;
        println!("formatted {} ({DEFAULT_DISK_SIZE} bytes)", image.display());
        return Ok(());
    }

    if image.exists() {
        fs.load(&image)
            .with_context(|| format!("failed to load {}", image.display()))?;
    } else {
        fs.init(DEFAULT_DISK_SIZE)?;
    }

    // Dump even when an operation failed: everything that succeeded
    // before the failure is persisted, like the original driver.
    let outcome = cli.apply(&mut fs);
    dump(&fs, &image)?;
    outcome
}

fn dump(fs: &FileSystem, image: &Path) -> Result<()> {
    if let Some(parent) = image.parent() {
        std::fs::create_dir_all(parent)?;
    }
    fs.dump(image)
        .with_context(|| format!("failed to dump {}", image.display()))
}

impl Cli {
    /// Whether any disk operation was requested.
    fn has_ops(&self) -> bool {
        self.create.is_some()
            || self.read.is_some()
            || self.create_dir.is_some()
            || self.remove.is_some()
            || self.remove_dir.is_some()
            || self.change_dir.is_some()
            || self.list.is_some()
            || self.write.is_some()
            || self.append.is_some()
            || self.info.is_some()
            || self.path.is_some()
            || self.options
    }

    fn apply(&self, fs: &mut FileSystem) -> Result<()> {
        if let Some(path) = &self.create {
            let f = fs.create(path)?;
            fs.close(f)?;
        }
        if let Some(path) = &self.create_dir {
            fs.create_dir(path)?;
        }
        if let Some(args) = &self.write {
            let f = fs.open(&args[0], OpenMode::Write)?;
            fs.write(f, args[1].as_bytes())?;
            fs.close(f)?;
        }
        if let Some(args) = &self.append {
            let f = fs.open(&args[0], OpenMode::Append)?;
            fs.write(f, args[1].as_bytes())?;
            fs.close(f)?;
        }
        if let Some(path) = &self.change_dir {
            fs.change_dir(path)?;
        }
        if let Some(path) = &self.remove {
            fs.remove_file(path)?;
        }
        if let Some(path) = &self.remove_dir {
            fs.remove_dir(path)?;
        }
        if let Some(path) = &self.read {
            let f = fs.open(path, OpenMode::Read)?;
            let mut stdout = std::io::stdout().lock();
            fs.read(f, &mut stdout)?;
            writeln!(stdout)?;
            fs.close(f)?;
        }
        if let Some(path) = &self.info {
            let f = fs.open(path, OpenMode::Read)?;
            let stat = fs.stat(f)?;
            match self.format {
                OutputFormat::Table => print_stat(&stat),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stat)?),
            }
            fs.close(f)?;
        }
        if let Some(dir) = &self.list {
            let target = (!dir.is_empty()).then_some(dir.as_str());
            println!("{}", fs.pwd()?.blue().bold());
            let entries = fs.list(target)?;
            match self.format {
                OutputFormat::Table => {
                    for entry in &entries {
                        print_entry(entry);
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
            }
        }
        if self.options {
            print_options();
        }
        Ok(())
    }
}

/// One listing line: `<offset> <kind> <size> <name>`, directories
/// suffixed and coloured.
fn print_entry(entry: &Entry) {
    let name = match entry.kind {
        FileKind::Dir => format!("{}/", entry.name).blue().bold(),
        _ => entry.name.red(),
    };
    println!("{:<7} {:<4} {:>7} {name}", entry.offset, entry.kind, entry.size);
}

fn print_stat(stat: &FileStat) {
    println!("name:        {}", stat.name);
    println!("kind:        {}", stat.kind);
    println!("mode:        {}", stat.mode);
    println!("size:        {}", stat.size);
    println!("first block: {}", stat.first_block);
    println!("blocks:      {}", stat.blocks);
    println!("offset:      {}", stat.offset);
}

fn print_options() {
    let cmd = Cli::command();
    let mut line = String::new();
    for arg in cmd.get_arguments() {
        if let (Some(long), Some(short)) = (arg.get_long(), arg.get_short()) {
            line.push_str(&format!("--{long} -{short} "));
        }
    }
    line.push_str("--help -h");
    println!("{line}");
}

/// Directory holding the default image and the persisted path override.
fn data_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|dir| dir.join("flatfs"))
        .context("no data directory available on this platform")
}

/// Resolves where the disk image lives: `FLATFS_DISK`, then the
/// persisted `-p` override, then the default data directory.
fn disk_image_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("FLATFS_DISK") {
        return Ok(PathBuf::from(path));
    }
    let dir = data_dir()?;
    if let Ok(contents) = std::fs::read_to_string(dir.join("path")) {
        let saved = contents.trim();
        if !saved.is_empty() {
            return Ok(PathBuf::from(saved).join("flatfs.disk"));
        }
    }
    Ok(dir.join("flatfs.disk"))
}

/// Stores the `-p` override for later invocations.
fn persist_data_path(path: &Path) -> Result<()> {
    if !path.is_dir() {
        bail!("failed to set path ('{}'): not a directory", path.display());
    }
    let dir = data_dir()?;
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("path"), format!("{}\n", path.display()))?;
    Ok(())
}
