use std::path::Path;
use std::path::PathBuf;

use sha2::Digest;
use sha2::Sha256;

use crate::error::OutboxError;

/// Content-addressed attachment storage (spec §4.2). A blob lives at
/// `<root>/<first-2-hex-chars>/<sha256>`; identical bytes always resolve to
/// the same path, so multiple `Attachment` rows may share one file.
#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
    max_bytes: u64,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self { root: root.into(), max_bytes }
    }

    pub fn path_for(&self, sha256: &str) -> PathBuf {
        self.root.join(&sha256[..2]).join(sha256)
    }

    /// Store `bytes`, returning the digest and the path it lives at. Reuses
    /// an existing file for the same digest rather than rewriting it.
    pub async fn put(&self, bytes: &[u8]) -> Result<(String, PathBuf), OutboxError> {
        if bytes.len() as u64 > self.max_bytes {
            return Err(OutboxError::AttachmentTooLarge {
                size_bytes: bytes.len() as u64,
                max_bytes: self.max_bytes,
            });
        }

        let sha256 = hex::encode(Sha256::digest(bytes));
        let path = self.path_for(&sha256);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok((sha256, path));
        }

        let dir = path.parent().expect("blob path always has a parent");
        tokio::fs::create_dir_all(dir).await.map_err(anyhow::Error::from)?;

        write_atomic(&path, bytes).await.map_err(anyhow::Error::from)?;

        Ok((sha256, path))
    }
}

/// Write `bytes` to `dest` via a sibling temp file + rename, so a crash or a
/// racing second writer of the same content never observes a partial file
/// (spec §4.2's "write-and-rename").
async fn write_atomic(dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = dest.parent().expect("blob path always has a parent");
    let tmp_name = format!(".{}.tmp-{}", dest.file_name().unwrap().to_string_lossy(), uuid::Uuid::new_v4());
    let tmp_path = dir.join(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await?;
    match tokio::fs::rename(&tmp_path, dest).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            // Another writer may have already placed the same content; that's fine.
            if tokio::fs::try_exists(dest).await.unwrap_or(false) {
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}
