//! Animal photo storage
//!
//! Photos live under `<media dir>/animals/` named
//! `{tenant}_{animal}_{sha256-hex16}.{ext}` so re-uploading the same image
//! yields the same file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, warn};

use super::animal_service::AnimalService;
use crate::db::models::Animal;
use crate::db::TenantContext;
use crate::error::AppError;

/// URL prefix the HTTP layer serves photos from
pub const PHOTO_URL_PREFIX: &str = "/media/animals/";

const ALLOWED_TYPES: &[(&str, &str)] = &[("image/jpeg", "jpg"), ("image/png", "png"), ("image/webp", "webp")];

/// Extension for an accepted image content type
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    ALLOWED_TYPES
        .iter()
        .find(|(t, _)| *t == mime)
        .map(|(_, ext)| *ext)
}

/// Content type to serve a stored file with
pub fn content_type_for(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    ALLOWED_TYPES
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(t, _)| *t)
}

/// First 16 hex chars of the SHA-256 of `data`
pub fn short_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(16);
    hex
}

pub fn photo_file_name(ctx: &TenantContext, animal_id: i64, data: &[u8], ext: &str) -> String {
    format!("{}_{}_{}.{}", ctx.tenant_id, animal_id, short_hash(data), ext)
}

/// Stored file names are flat; anything else is rejected before touching disk
fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

pub struct MediaService {
    root_dir: PathBuf,
    max_bytes: usize,
    animals: Arc<AnimalService>,
}

impl MediaService {
    pub fn new<P: AsRef<Path>>(root_dir: P, max_bytes: usize, animals: Arc<AnimalService>) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
            max_bytes,
            animals,
        }
    }

    /// Create the photo directory
    pub async fn init(&self) -> Result<(), AppError> {
        fs::create_dir_all(self.photo_dir()).await?;
        info!(path = %self.photo_dir().display(), "Initialized media store");
        Ok(())
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn photo_dir(&self) -> PathBuf {
        self.root_dir.join("animals")
    }

    /// Only files named for this tenant and animal may be removed
    fn path_for_url(&self, ctx: &TenantContext, animal_id: i64, url: &str) -> Option<PathBuf> {
        let name = url.strip_prefix(PHOTO_URL_PREFIX)?;
        let owned = name.starts_with(&format!("{}_{}_", ctx.tenant_id, animal_id));
        (owned && is_safe_name(name)).then(|| self.photo_dir().join(name))
    }

    async fn remove_url(&self, ctx: &TenantContext, animal_id: i64, url: &str) {
        if let Some(path) = self.path_for_url(ctx, animal_id, url) {
            match fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed photo"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove photo"),
            }
        }
    }

    /// Store a new photo for an animal and drop the one it replaces
    pub async fn upload_photo(
        &self,
        ctx: TenantContext,
        animal_id: i64,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<Animal, AppError> {
        let ext = extension_for(content_type).ok_or_else(|| {
            AppError::InvalidInput("photo must be image/jpeg, image/png or image/webp".into())
        })?;
        if data.len() > self.max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "photo exceeds {} bytes",
                self.max_bytes
            )));
        }
        if data.is_empty() {
            return Err(AppError::InvalidInput("photo is empty".into()));
        }

        let animals = Arc::clone(&self.animals);
        tokio::task::spawn_blocking(move || animals.get(&ctx, animal_id)).await??;

        let file_name = photo_file_name(&ctx, animal_id, &data, ext);
        let path = self.photo_dir().join(&file_name);
        fs::create_dir_all(self.photo_dir()).await?;
        fs::write(&path, &data).await?;
        let url = format!("{}{}", PHOTO_URL_PREFIX, file_name);

        let animals = Arc::clone(&self.animals);
        let new_url = url.clone();
        let result =
            tokio::task::spawn_blocking(move || animals.set_photo_url(&ctx, animal_id, Some(new_url))).await?;
        let (animal, previous) = match result {
            Ok(done) => done,
            Err(e) => {
                self.remove_url(&ctx, animal_id, &url).await;
                return Err(e);
            }
        };

        if let Some(previous) = previous.filter(|p| *p != url) {
            self.remove_url(&ctx, animal_id, &previous).await;
        }
        info!(tenant = ctx.tenant_id, animal = animal_id, file = %file_name, size = data.len(), "Stored photo");
        Ok(animal)
    }

    /// Clear an animal's photo and remove its file
    pub async fn delete_photo(&self, ctx: TenantContext, animal_id: i64) -> Result<Animal, AppError> {
        let animals = Arc::clone(&self.animals);
        let (animal, previous) =
            tokio::task::spawn_blocking(move || animals.set_photo_url(&ctx, animal_id, None)).await??;
        if let Some(previous) = previous {
            self.remove_url(&ctx, animal_id, &previous).await;
        }
        Ok(animal)
    }

    /// Read a stored photo with its content type
    pub async fn read_photo(&self, file_name: &str) -> Result<(Vec<u8>, &'static str), AppError> {
        let not_found = || AppError::NotFound("Photo not found".into());
        if !is_safe_name(file_name) {
            return Err(not_found());
        }
        let content_type = content_type_for(file_name).ok_or_else(not_found)?;
        match fs::read(self.photo_dir().join(file_name)).await {
            Ok(bytes) => Ok((bytes, content_type)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(e.into()),
        }
    }
}
