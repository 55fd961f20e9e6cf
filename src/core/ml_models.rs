// ML Model loader and manager utilities
// Handles model downloading, caching, and path resolution

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

type ModelError = Box<dyn std::error::Error + Send + Sync>;

/// Model source configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    /// Local file path
    LocalFile(PathBuf),
    /// Direct URL
    Url(String),
}

impl ModelSource {
    /// `http(s)://` locations are downloaded, anything else is a local path
    pub fn from_location(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            ModelSource::Url(location.to_string())
        } else {
            ModelSource::LocalFile(PathBuf::from(location))
        }
    }
}

/// ML model metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub source: ModelSource,
    pub size_bytes: Option<u64>,
}

impl ModelInfo {
    /// Describe a model by where it comes from; the cache name is the file name
    pub fn from_source(source: ModelSource) -> Result<Self, ModelError> {
        let name = match &source {
            ModelSource::LocalFile(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            ModelSource::Url(url) => reqwest::Url::parse(url)?
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|segment| !segment.is_empty())
                .map(str::to_string),
        }
        .ok_or_else(|| format!("Cannot derive a model name from {:?}", source))?;

        Ok(Self {
            name,
            source,
            size_bytes: None,
        })
    }

    /// Expected file size; a fetched model of any other size is rejected
    pub fn with_size_bytes(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }
}

/// Model manager for caching and loading ML models
pub struct ModelManager {
    cache_dir: PathBuf,
    client: reqwest::Client,
}

impl ModelManager {
    /// Create a new model manager with cache directory
    pub fn new(cache_dir: PathBuf) -> Result<Self, ModelError> {
        fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            client: reqwest::Client::new(),
        })
    }

    /// Get the cache directory path
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Check if a model is cached
    pub fn is_cached(&self, model: &ModelInfo) -> bool {
        self.get_model_path(&model.name).exists()
    }

    /// Get the local path for a model
    pub fn get_model_path(&self, model_name: &str) -> PathBuf {
        self.cache_dir.join(model_name)
    }

    /// Copy or download a model into the cache if it is not there yet
    pub async fn ensure_model(&self, model: &ModelInfo) -> Result<PathBuf, ModelError> {
        let model_path = self.get_model_path(&model.name);

        if self.is_cached(model) {
            info!(model = %model.name, path = %model_path.display(), "Model already cached");
            return Ok(model_path);
        }

        info!(model = %model.name, source = ?model.source, "Fetching model");

        let partial = model_path.with_extension("part");
        if let Err(e) = self.fetch_to(model, &partial).await {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
        if let Err(e) = fs::rename(&partial, &model_path) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }

        Ok(model_path)
    }

    /// Write the model to `partial` and check its size
    async fn fetch_to(&self, model: &ModelInfo, partial: &Path) -> Result<(), ModelError> {
        match &model.source {
            ModelSource::LocalFile(path) => {
                tokio::fs::copy(path, partial).await?;
            }
            ModelSource::Url(url) => {
                let bytes = self
                    .client
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .bytes()
                    .await?;
                tokio::fs::write(partial, &bytes).await?;
            }
        }

        if let Some(expected) = model.size_bytes {
            let actual = tokio::fs::metadata(partial).await?.len();
            if actual != expected {
                return Err(format!(
                    "Fetched {} bytes for {}, expected {}",
                    actual, model.name, expected
                )
                .into());
            }
        }

        Ok(())
    }

    /// Clear the model cache
    pub fn clear_cache(&self) -> Result<(), ModelError> {
        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir)?;
            fs::create_dir_all(&self.cache_dir)?;
        }
        Ok(())
    }

    /// Get cache size in bytes
    pub fn get_cache_size(&self) -> Result<u64, ModelError> {
        let mut total_size = 0u64;

        if self.cache_dir.exists() {
            for entry in fs::read_dir(&self.cache_dir)? {
                let entry = entry?;
                let metadata = entry.metadata()?;
                if metadata.is_file() {
                    total_size += metadata.len();
                }
            }
        }

        Ok(total_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pawpose_test_models_{}", name));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_model_manager_creation() {
        let temp_dir = temp_cache("create");
        let manager = ModelManager::new(temp_dir.clone()).unwrap();
        assert_eq!(manager.cache_dir(), temp_dir.as_path());
        assert_eq!(manager.get_cache_size().unwrap(), 0);
        let _ = fs::remove_dir_all(&temp_dir);
    }

    #[test]
    fn test_source_from_location() {
        assert_eq!(
            ModelSource::from_location("https://example.com/pose.onnx"),
            ModelSource::Url("https://example.com/pose.onnx".to_string())
        );
        assert_eq!(
            ModelSource::from_location("models/pose.onnx"),
            ModelSource::LocalFile(PathBuf::from("models/pose.onnx"))
        );
    }

    #[test]
    fn test_model_names() {
        let local = ModelInfo::from_source(ModelSource::LocalFile(PathBuf::from("/models/ap10k.onnx"))).unwrap();
        assert_eq!(local.name, "ap10k.onnx");

        let remote =
            ModelInfo::from_source(ModelSource::Url("https://example.com/m/hrnet_w32.onnx?dl=1".to_string()))
                .unwrap();
        assert_eq!(remote.name, "hrnet_w32.onnx");

        assert!(ModelInfo::from_source(ModelSource::Url("https://example.com/".to_string())).is_err());
    }

    #[tokio::test]
    async fn test_local_model_is_cached() {
        let temp_dir = temp_cache("local");
        let manager = ModelManager::new(temp_dir.join("cache")).unwrap();

        let source_file = temp_dir.join("pose.onnx");
        fs::write(&source_file, b"onnx-bytes").unwrap();
        let model = ModelInfo::from_source(ModelSource::LocalFile(source_file)).unwrap();

        assert!(!manager.is_cached(&model));
        let path = manager.ensure_model(&model).await.unwrap();
        assert!(manager.is_cached(&model));
        assert_eq!(fs::read(&path).unwrap(), b"onnx-bytes");
        assert_eq!(manager.get_cache_size().unwrap(), 10);

        manager.clear_cache().unwrap();
        assert!(!manager.is_cached(&model));

        let _ = fs::remove_dir_all(&temp_dir);
    }

    #[tokio::test]
    async fn test_size_mismatch_leaves_nothing_behind() {
        let temp_dir = temp_cache("size");
        let manager = ModelManager::new(temp_dir.join("cache")).unwrap();

        let source_file = temp_dir.join("pose.onnx");
        fs::write(&source_file, b"onnx-bytes").unwrap();
        let model = ModelInfo::from_source(ModelSource::LocalFile(source_file.clone()))
            .unwrap()
            .with_size_bytes(99);

        assert!(manager.ensure_model(&model).await.is_err());
        assert!(!manager.is_cached(&model));
        assert_eq!(manager.get_cache_size().unwrap(), 0);

        let model = ModelInfo::from_source(ModelSource::LocalFile(source_file))
            .unwrap()
            .with_size_bytes(10);
        assert!(manager.ensure_model(&model).await.is_ok());

        let _ = fs::remove_dir_all(&temp_dir);
    }

    #[tokio::test]
    async fn test_missing_source_leaves_nothing_behind() {
        let temp_dir = temp_cache("missing");
        let manager = ModelManager::new(temp_dir.join("cache")).unwrap();

        let model =
            ModelInfo::from_source(ModelSource::LocalFile(temp_dir.join("absent.onnx"))).unwrap();
        assert!(manager.ensure_model(&model).await.is_err());
        assert_eq!(fs::read_dir(manager.cache_dir()).unwrap().count(), 0);

        let _ = fs::remove_dir_all(&temp_dir);
    }
}
