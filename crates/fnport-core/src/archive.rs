//! Zip packing and extraction for function artifacts.
//!
//! Both directions report coarse progress: a tenth of the budget when work
//! starts, a further 40% once half the entries are processed, and the rest
//! on completion. The sum never exceeds the budget handed in.

use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use tracing::debug;
use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::{PackError, UnpackError};
use crate::progress::ProgressBudget;

const START_SHARE: u32 = 10;
const MIDPOINT_SHARE: u32 = 40;

/// Summary of a finished extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackSummary {
    pub files: usize,
    pub directories: usize,
}

struct PackEntry {
    absolute: PathBuf,
    relative: String,
    is_dir: bool,
}

/// Pack every file under `root` into an in-memory zip.
pub fn pack_directory(root: &Path, progress: &ProgressBudget<'_>) -> Result<Vec<u8>, PackError> {
    let cursor = write_archive(root, Cursor::new(Vec::new()), None, progress)?;
    Ok(cursor.into_inner())
}

/// Pack `root` straight into a file; returns the archive size in bytes.
///
/// The output file is skipped if it lives inside `root`.
pub fn pack_to_file(
    root: &Path,
    out: &Path,
    progress: &ProgressBudget<'_>,
) -> Result<u64, PackError> {
    let write_err = |source: io::Error| PackError::Write {
        path: out.to_path_buf(),
        source,
    };
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let file = File::create(out).map_err(write_err)?;
    let exclude = fs::canonicalize(out).ok();
    let mut file = write_archive(root, file, exclude.as_deref(), progress)?;
    file.flush().map_err(write_err)?;
    let size = file.metadata().map_err(write_err)?.len();
    Ok(size)
}

fn write_archive<W: Write + Seek>(
    root: &Path,
    sink: W,
    exclude: Option<&Path>,
    progress: &ProgressBudget<'_>,
) -> Result<W, PackError> {
    if !root.is_dir() {
        return Err(PackError::NotADirectory {
            path: root.to_path_buf(),
        });
    }
    progress.advance(progress.portion(START_SHARE), Some("Packaging"));
    let entries = collect_entries(root, exclude)?;
    let midpoint = entries.len().div_ceil(2);

    let mut zip = ZipWriter::new(sink);
    let base = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (idx, entry) in entries.iter().enumerate() {
        let options = entry_options(base, &entry.absolute);
        if entry.is_dir {
            zip.add_directory(format!("{}/", entry.relative), options)
                .map_err(|source| PackError::Archive { source })?;
        } else {
            let data = fs::read(&entry.absolute).map_err(|source| PackError::Read {
                path: entry.absolute.clone(),
                source,
            })?;
            zip.start_file(entry.relative.as_str(), options)
                .map_err(|source| PackError::Archive { source })?;
            zip.write_all(&data).map_err(|source| PackError::Archive {
                source: source.into(),
            })?;
        }
        if idx + 1 == midpoint {
            progress.advance(progress.portion(MIDPOINT_SHARE), None);
        }
    }
    let sink = zip
        .finish()
        .map_err(|source| PackError::Archive { source })?;
    debug!(root = %root.display(), entries = entries.len(), "packed directory");
    progress.complete(None);
    Ok(sink)
}

fn collect_entries(root: &Path, exclude: Option<&Path>) -> Result<Vec<PackEntry>, PackError> {
    let canonical_root = fs::canonicalize(root).map_err(|source| PackError::Read {
        path: root.to_path_buf(),
        source,
    })?;
    let mut entries = Vec::new();
    for item in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let item = item.map_err(|source| PackError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        let absolute = item.path().to_path_buf();
        let Ok(relative) = absolute.strip_prefix(root) else {
            continue;
        };
        let relative = relative_name(relative);

        let file_type = item.file_type();
        let is_dir = if file_type.is_symlink() {
            match fs::canonicalize(&absolute) {
                Ok(target) if target.starts_with(&canonical_root) && target.is_file() => false,
                _ => {
                    debug!(path = %absolute.display(), "skipping symlink outside package root");
                    continue;
                }
            }
        } else {
            file_type.is_dir()
        };
        if !is_dir {
            if let (Some(exclude), Ok(canonical)) = (exclude, fs::canonicalize(&absolute)) {
                if canonical == exclude {
                    continue;
                }
            }
        }
        entries.push(PackEntry {
            absolute,
            relative,
            is_dir,
        });
    }
    Ok(entries)
}

fn relative_name(relative: &Path) -> String {
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn entry_options(base: FileOptions, path: &Path) -> FileOptions {
    match fs::metadata(path) {
        Ok(meta) => base.unix_permissions(meta.permissions().mode() & 0o777),
        Err(_) => base,
    }
}

#[cfg(not(unix))]
fn entry_options(base: FileOptions, _path: &Path) -> FileOptions {
    base
}

/// Expand the zip at `archive` into `dest`.
pub fn unpack_file(
    archive: &Path,
    dest: &Path,
    overwrite: bool,
    progress: &ProgressBudget<'_>,
) -> Result<UnpackSummary, UnpackError> {
    let file = File::open(archive).map_err(|source| UnpackError::Open {
        path: archive.to_path_buf(),
        source,
    })?;
    unpack_reader(file, dest, overwrite, progress)
}

/// Expand a zip stream into `dest`, creating intermediate directories.
///
/// With `overwrite` set, colliding files are truncated and rewritten. On
/// error the destination may hold a partial extraction.
pub fn unpack_reader<R: Read + Seek>(
    reader: R,
    dest: &Path,
    overwrite: bool,
    progress: &ProgressBudget<'_>,
) -> Result<UnpackSummary, UnpackError> {
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| UnpackError::Write { path, source }
    };
    let mut archive = ZipArchive::new(reader).map_err(|source| UnpackError::Archive { source })?;
    progress.advance(progress.portion(START_SHARE), Some("Extracting"));
    fs::create_dir_all(dest).map_err(write_err(dest))?;

    let total = archive.len();
    let midpoint = total.div_ceil(2);
    let mut summary = UnpackSummary::default();
    for idx in 0..total {
        let mut entry = archive
            .by_index(idx)
            .map_err(|source| UnpackError::Archive { source })?;
        let Some(target) = entry.enclosed_name().map(|p| dest.join(p)) else {
            return Err(UnpackError::UnsafeEntry {
                name: entry.name().to_string(),
            });
        };
        if entry.name().ends_with('/') || entry.is_dir() {
            fs::create_dir_all(&target).map_err(write_err(&target))?;
            summary.directories += 1;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(write_err(parent))?;
            }
            if !overwrite && target.exists() {
                return Err(UnpackError::Exists { path: target });
            }
            let mut outfile = File::create(&target).map_err(write_err(&target))?;
            io::copy(&mut entry, &mut outfile).map_err(write_err(&target))?;
            #[cfg(unix)]
            {
                if let Some(mode) = entry.unix_mode() {
                    fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))
                        .map_err(write_err(&target))?;
                }
            }
            summary.files += 1;
        }
        if idx + 1 == midpoint {
            progress.advance(progress.portion(MIDPOINT_SHARE), None);
        }
    }
    debug!(
        dest = %dest.display(),
        files = summary.files,
        directories = summary.directories,
        "extracted archive"
    );
    progress.complete(None);
    Ok(summary)
}
