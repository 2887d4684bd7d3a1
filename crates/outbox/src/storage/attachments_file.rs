//! File-based attachment storage with zstd compression

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::attachments::AttachmentStore;

/// Suffix of every stored payload
const COMPRESSED_EXT: &str = "zst";

/// Give up looking for a free name after this many collisions
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// File-based attachment storage with zstd compression
///
/// Directory structure:
/// ```text
/// mailviewer_attachments/
///   icon.gif.zst       # reference "icon.gif"
///   icon_1.gif.zst     # reference "icon_1.gif", a second icon.gif
///   report.pdf.zst
/// ```
pub struct FileAttachmentStore {
    root: PathBuf,
    compression_level: i32,
}

impl FileAttachmentStore {
    /// Create a new file attachment store at the given path
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).context("Failed to create attachment storage directory")?;
        Ok(Self {
            root,
            compression_level: 3,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the file path for a reference
    fn payload_path(&self, reference: &str) -> Result<PathBuf> {
        if reference.is_empty()
            || reference.starts_with('.')
            || reference.contains(['/', '\\'])
        {
            bail!("Invalid attachment reference {:?}", reference);
        }
        Ok(self.root.join(format!("{}.{}", reference, COMPRESSED_EXT)))
    }

    /// Claim a free reference for `filename` by creating its file
    ///
    /// `create_new` makes the claim atomic, so concurrent writers saving the
    /// same filename end up with distinct references.
    fn claim(&self, filename: &str) -> Result<(String, PathBuf)> {
        let name = sanitize_filename(filename);
        let (stem, ext) = split_extension(&name);

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let reference = match (attempt, ext) {
                (0, _) => name.clone(),
                (n, Some(ext)) => format!("{}_{}.{}", stem, n, ext),
                (n, None) => format!("{}_{}", stem, n),
            };
            let path = self.payload_path(&reference)?;

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok((reference, path)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to create attachment file {:?}", path));
                }
            }
        }

        bail!("No free attachment name for {:?}", filename)
    }
}

impl AttachmentStore for FileAttachmentStore {
    fn save(&self, filename: &str, data: &[u8]) -> Result<String> {
        let (reference, path) = self.claim(filename)?;

        let compressed = zstd::encode_all(data, self.compression_level)
            .context("Failed to compress attachment")?;

        // Write atomically (write to temp, then rename over the claimed file)
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &compressed)?;
        fs::rename(&temp_path, &path)?;

        Ok(reference)
    }

    fn open(&self, reference: &str) -> Result<Option<Vec<u8>>> {
        let path = self.payload_path(reference)?;

        if !path.exists() {
            return Ok(None);
        }

        let compressed = fs::read(&path)?;
        let mut decoder = zstd::Decoder::new(compressed.as_slice())?;
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .with_context(|| format!("Failed to decompress attachment {:?}", reference))?;

        Ok(Some(decompressed))
    }

    fn exists(&self, reference: &str) -> Result<bool> {
        Ok(self.payload_path(reference)?.exists())
    }

    fn delete(&self, reference: &str) -> Result<()> {
        let path = self.payload_path(reference)?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
            fs::create_dir_all(&self.root)?;
        }
        Ok(())
    }
}

/// Reduce a client-supplied filename to a safe single path component
fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `icon.gif` -> (`icon`, Some(`gif`)); `README` -> (`README`, None)
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}
