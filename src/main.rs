//! Smoke test for the virtual filesystem.
//!
//! Mounts `example.zip` and the working directory at the root, reads a
//! source file through the virtual namespace, then tears everything down:
//! ```bash
//! RUST_LOG=debug cargo run --bin layerfs-smoke
//! ```

use std::process::ExitCode;
use anyhow::{Context, Result};
use layerfs::VirtualFileSystem;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ARCHIVE: &str = "example.zip";
const DIRECTORY: &str = ".";
const TARGET: &str = "packages/physfs/physfs.go";

fn main() -> ExitCode {
    // Diagnostics go to stderr so stdout carries only the program output.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let argv0 = std::env::args().next().unwrap_or_default();
    let mut vfs = VirtualFileSystem::init(&argv0).context("Failed to initialize virtual filesystem")?;

    for format in vfs.supported_archive_types() {
        println!(
            "Supported archive: [{}], which is [{}].",
            format.extension, format.description
        );
    }

    vfs.mount(ARCHIVE, "/", true).context("Failed to mount archive")?;
    vfs.mount(DIRECTORY, "/", true).context("Failed to mount directory")?;

    let contents = {
        let mut file = vfs.open_read(TARGET).context("Failed to open file")?;
        let size = file.length().context("Failed to query file length")?;
        let size = usize::try_from(size).context("Failed to allocate memory")?;

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(size).context("Failed to allocate memory")?;
        buffer.resize(size, 0);
        let read = file.read_bytes(&mut buffer).context("Failed to read file")?;
        buffer.truncate(read);

        file.close().context("Failed to close file")?;
        buffer
    };
    println!("File contents: {}", String::from_utf8_lossy(&contents));

    vfs.unmount(ARCHIVE).context("Failed to unmount archive")?;
    vfs.unmount(DIRECTORY).context("Failed to unmount directory")?;

    vfs.deinit();
    Ok(())
}
