//! File names: which files we touch, and how we pick collision-free names.

use std::{fs, io, sync::Mutex};

use crate::prelude::*;

/// Image extensions we process, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Split a file name into a stem and an extension. The extension keeps its
/// leading dot and its original case, and is empty if there isn't one.
///
/// `"张三.JPG"` becomes `("张三", ".JPG")`, and `"a.b.png"` becomes
/// `("a.b", ".png")`.
pub fn split_file_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name.split_at(idx),
        _ => (file_name, ""),
    }
}

/// Is this the name of an image file we should process?
pub fn is_eligible_image(file_name: &str) -> bool {
    let (_, ext) = split_file_name(file_name);
    let ext = ext.trim_start_matches('.');
    IMAGE_EXTENSIONS
        .iter()
        .any(|candidate| ext.eq_ignore_ascii_case(candidate))
}

/// Make a recognized name safe to use as a file name base. Path separators
/// and other characters that aren't allowed in file names become `_`.
pub fn sanitize_base(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Pick the first free name out of `base.ext`, `base_1.ext`, `base_2.ext`,
/// and so on. `is_occupied` is asked about each candidate in turn.
pub fn allocate(
    base: &str,
    ext: &str,
    mut is_occupied: impl FnMut(&str) -> bool,
) -> String {
    let candidate = format!("{base}{ext}");
    if !is_occupied(&candidate) {
        return candidate;
    }
    let mut n: u64 = 1;
    loop {
        let candidate = format!("{base}_{n}{ext}");
        if !is_occupied(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// List the eligible image files directly inside `folder`, sorted by name.
pub fn list_images(folder: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(folder)
        .with_context(|| format!("failed to list folder {}", folder.display()))?;
    let mut names = vec![];
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to list folder {}", folder.display()))?;
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        // Names that aren't valid Unicode can't be compared against our
        // labels anyway, so leave them alone.
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if is_eligible_image(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// The result of claiming a destination for a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The file was renamed to this name.
    Renamed(String),

    /// The file already had the name it would have been given.
    Kept(String),
}

impl Claim {
    /// The file's final name.
    pub fn file_name(&self) -> &str {
        match self {
            Claim::Renamed(name) | Claim::Kept(name) => name,
        }
    }
}

/// A folder whose namespace is shared between concurrent pipelines.
///
/// Choosing a name and renaming a file into it must happen as one step, or
/// two pipelines could pick the same free name and one would overwrite the
/// other. So every claim holds `claim_lock` from the first existence probe
/// until the rename is done. Nothing inside the lock awaits.
#[derive(Debug)]
pub struct DestinationFolder {
    /// The folder itself.
    path: PathBuf,

    /// Serializes "probe, then rename".
    claim_lock: Mutex<()>,
}

impl DestinationFolder {
    /// Wrap a folder.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            claim_lock: Mutex::new(()),
        }
    }

    /// Rename `source` (a file in this folder) to the first free name based on
    /// `base` and `ext`. The source file never counts as occupying its own
    /// candidate name, so a file that already has the right name is kept.
    pub fn claim(&self, source: &Path, base: &str, ext: &str) -> Result<Claim> {
        let _guard = self.claim_lock.lock().expect("lock poisoned");
        let source_name = source.file_name().and_then(|name| name.to_str());
        let file_name = allocate(base, ext, |candidate| {
            Some(candidate) != source_name && self.path.join(candidate).exists()
        });
        if source_name == Some(file_name.as_str()) {
            return Ok(Claim::Kept(file_name));
        }
        let destination = self.path.join(&file_name);
        fs::rename(source, &destination).with_context(|| {
            format!(
                "failed to rename {} to {}",
                source.display(),
                destination.display()
            )
        })?;
        Ok(Claim::Renamed(file_name))
    }

    /// Write `data` to a fresh file based on `file_name`, never replacing an
    /// existing file. Returns the path actually written.
    pub fn create_unique(&self, file_name: &str, data: &[u8]) -> Result<PathBuf> {
        let _guard = self.claim_lock.lock().expect("lock poisoned");
        let (base, ext) = split_file_name(file_name);
        let name = allocate(base, ext, |candidate| self.path.join(candidate).exists());
        let path = self.path.join(name);
        write_new(&path, data)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// Write a file that must not already exist.
fn write_new(path: &Path, data: &[u8]) -> io::Result<()> {
    use std::io::Write as _;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(data)
}
