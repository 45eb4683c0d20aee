//! `node_modules` bundle archives.
//!
//! Bundles are plain tarballs with a single top-level `node_modules/`
//! directory, compressed with one of the supported codecs. Creation and
//! extraction run on the blocking pool.

use std::{
    fmt,
    fs::File,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{anyhow, Context, Result};
use tracing::debug;
use veendor_domain::NODE_MODULES;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    pub const NAMES: [&'static str; 3] = ["gzip", "bzip2", "xz"];

    pub fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Gzip => ".gz",
            Self::Bzip2 => ".bz2",
            Self::Xz => ".xz",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Compression {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "gzip" => Ok(Self::Gzip),
            "bzip2" => Ok(Self::Bzip2),
            "xz" => Ok(Self::Xz),
            other => Err(anyhow!(
                "unknown compression `{other}` (expected one of {})",
                Self::NAMES.join(", ")
            )),
        }
    }
}

/// `<hash>.tar<ext>`, shared by every backend that stores bundles as files.
pub fn bundle_file_name(hash: &str, compression: Compression) -> String {
    format!("{hash}.tar{}", compression.extension())
}

/// Archives `<project_dir>/node_modules` into `dest`.
pub async fn create_bundle(project_dir: &Path, dest: &Path, compression: Compression) -> Result<()> {
    let source = project_dir.join(NODE_MODULES);
    let dest = dest.to_path_buf();
    debug!(archive = %dest.display(), %compression, "creating bundle");
    tokio::task::spawn_blocking(move || {
        let file = File::create(&dest)
            .with_context(|| format!("creating archive {}", dest.display()))?;
        write_bundle(file, &source, compression)
            .with_context(|| format!("archiving {}", source.display()))
    })
    .await
    .context("archive task panicked")?
}

/// Unpacks a bundle into `project_dir`, recreating `node_modules`.
pub async fn extract_bundle(
    archive: &Path,
    project_dir: &Path,
    compression: Compression,
) -> Result<()> {
    let archive: PathBuf = archive.to_path_buf();
    let dest = project_dir.to_path_buf();
    debug!(archive = %archive.display(), %compression, "extracting bundle");
    tokio::task::spawn_blocking(move || {
        let file = File::open(&archive)
            .with_context(|| format!("opening archive {}", archive.display()))?;
        read_bundle(file, &dest, compression)
            .with_context(|| format!("extracting {}", archive.display()))
    })
    .await
    .context("extract task panicked")?
}

fn write_bundle(file: File, source: &Path, compression: Compression) -> io::Result<()> {
    let file = match compression {
        Compression::Gzip => write_tar(
            flate2::write::GzEncoder::new(file, flate2::Compression::default()),
            source,
        )?
        .finish()?,
        Compression::Bzip2 => write_tar(
            bzip2::write::BzEncoder::new(file, bzip2::Compression::default()),
            source,
        )?
        .finish()?,
        Compression::Xz => write_tar(xz2::write::XzEncoder::new(file, 6), source)?.finish()?,
    };
    file.sync_all()
}

fn write_tar<W: Write>(writer: W, source: &Path) -> io::Result<W> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);
    builder.append_dir_all(NODE_MODULES, source)?;
    builder.into_inner()
}

fn read_bundle(file: File, dest: &Path, compression: Compression) -> io::Result<()> {
    match compression {
        Compression::Gzip => unpack(flate2::read::GzDecoder::new(file), dest),
        Compression::Bzip2 => unpack(bzip2::read::BzDecoder::new(file), dest),
        Compression::Xz => unpack(xz2::read::XzDecoder::new(file), dest),
    }
}

fn unpack<R: Read>(reader: R, dest: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.unpack(dest)
}
