use anyhow::{anyhow, Context, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Top-level entries starting with this prefix (planner checkouts, build
/// trees) stay out of archives.
const EXCLUDED_PREFIX: &str = "code";

#[derive(Debug, Clone)]
pub struct ArchiveResult {
    pub archive: PathBuf,
    pub files: usize,
}

pub fn default_archive_path(exp_dir: &Path) -> PathBuf {
    let name = exp_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "exp".to_string());
    exp_dir.with_file_name(format!("{}.zip", name))
}

fn is_excluded(rel: &Path) -> bool {
    rel.components()
        .next()
        .map(|c| c.as_os_str().to_string_lossy().starts_with(EXCLUDED_PREFIX))
        .unwrap_or(false)
}

/// Zips `exp_dir` into `out`; entries are stored under the directory's own
/// name so the archive unpacks into a single folder.
pub fn archive_experiment(exp_dir: &Path, out: &Path) -> Result<ArchiveResult> {
    if !exp_dir.is_dir() {
        return Err(anyhow!("experiment directory not found: {}", exp_dir.display()));
    }
    if out.starts_with(exp_dir) {
        return Err(anyhow!(
            "archive {} must not be written inside {}",
            out.display(),
            exp_dir.display()
        ));
    }
    let root_name = exp_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("cannot archive {}", exp_dir.display()))?;
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(out).with_context(|| format!("creating {}", out.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let walker = walkdir::WalkDir::new(exp_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let rel = e.path().strip_prefix(exp_dir).unwrap_or(e.path());
            rel.as_os_str().is_empty() || !is_excluded(rel)
        });
    let mut files = 0;
    for entry in walker {
        let entry = entry?;
        let rel = entry.path().strip_prefix(exp_dir)?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let mut name = root_name.clone();
        for part in rel.components() {
            name.push('/');
            name.push_str(&part.as_os_str().to_string_lossy());
        }
        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)?;
            let mut src = File::open(entry.path())
                .with_context(|| format!("reading {}", entry.path().display()))?;
            io::copy(&mut src, &mut zip)?;
            files += 1;
        }
    }
    zip.finish()?.flush()?;
    info!(archive = %out.display(), files, "archived experiment");
    Ok(ArchiveResult {
        archive: out.to_path_buf(),
        files,
    })
}
