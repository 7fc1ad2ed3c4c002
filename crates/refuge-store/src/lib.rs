use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use refuge_types::Error;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

/// Extensions accepted for uploaded attachments unless overridden by
/// configuration: images, common documents, common audio/video containers.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "pdf", "doc", "docx", "txt", "mp3", "mp4", "wav", "webm", "ogg",
];

/// Recorded audio clips are always stored under this extension.
const AUDIO_CLIP_EXTENSION: &str = "webm";

/// Flat-directory blob store for chat attachments.
///
/// Every blob lives at `{dir}/{handle}` where the handle is a generated
/// `<32 hex chars>.<ext>` name, never derived from client input. The
/// original filename is not leaked and a handle can be validated before any
/// filesystem access.
pub struct Storage {
    dir: PathBuf,
    allowed_exts: HashSet<String>,
}

impl Storage {
    pub async fn new(dir: PathBuf, allowed_exts: HashSet<String>) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Attachment storage directory: {}", dir.display());
        Ok(Self { dir, allowed_exts })
    }

    pub fn default_extensions() -> HashSet<String> {
        DEFAULT_ALLOWED_EXTENSIONS
            .iter()
            .map(|e| e.to_string())
            .collect()
    }

    /// Store an uploaded blob under a fresh opaque handle.
    pub async fn store(&self, bytes: &[u8], extension_hint: &str) -> Result<String, Error> {
        let ext = extension_hint
            .trim()
            .trim_start_matches('.')
            .to_ascii_lowercase();
        if !self.allowed_exts.contains(&ext) {
            return Err(Error::validation(format!(
                "attachment type '{ext}' is not allowed"
            )));
        }
        if bytes.is_empty() {
            return Err(Error::validation("attachment is empty"));
        }

        let handle = format!("{}.{}", Uuid::new_v4().simple(), ext);
        fs::write(self.dir.join(&handle), bytes)
            .await
            .map_err(Error::internal)?;
        info!("Stored attachment {} ({} bytes)", handle, bytes.len());
        Ok(handle)
    }

    /// Decode and store a recorded clip sent as a `data:audio/...;base64,`
    /// URI. The extension is fixed for the codec family, not client-chosen.
    pub async fn store_audio_data_uri(&self, uri: &str) -> Result<String, Error> {
        let rest = uri
            .strip_prefix("data:audio/")
            .ok_or_else(|| Error::validation("audio payload must be a data:audio URI"))?;
        let (_codec, encoded) = rest
            .split_once(";base64,")
            .ok_or_else(|| Error::validation("audio payload must be base64 encoded"))?;

        let bytes = B64
            .decode(encoded.trim())
            .map_err(|_| Error::validation("audio payload is not valid base64"))?;
        if bytes.is_empty() {
            return Err(Error::validation("audio payload is empty"));
        }

        let handle = format!("{}.{}", Uuid::new_v4().simple(), AUDIO_CLIP_EXTENSION);
        fs::write(self.dir.join(&handle), &bytes)
            .await
            .map_err(Error::internal)?;
        info!("Stored audio clip {} ({} bytes)", handle, bytes.len());
        Ok(handle)
    }

    /// Resolve a handle to its on-disk path. The handle shape is validated
    /// structurally first, so client-supplied values can never escape the
    /// storage directory.
    pub fn path_for(&self, handle: &str) -> Result<PathBuf, Error> {
        let (stem, ext) = handle
            .split_once('.')
            .ok_or_else(|| Error::validation("malformed attachment handle"))?;

        if stem.len() != 32 || !stem.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::validation("malformed attachment handle"));
        }
        if ext != AUDIO_CLIP_EXTENSION && !self.allowed_exts.contains(ext) {
            return Err(Error::validation("malformed attachment handle"));
        }

        Ok(self.dir.join(handle))
    }

    pub async fn exists(&self, handle: &str) -> Result<bool, Error> {
        let path = self.path_for(handle)?;
        fs::try_exists(&path).await.map_err(Error::internal)
    }

    /// Serve a blob back by handle only, never by a client-supplied path.
    pub async fn read(&self, handle: &str) -> Result<Vec<u8>, Error> {
        let path = self.path_for(handle)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound),
            Err(e) => Err(Error::internal(e)),
        }
    }
}
