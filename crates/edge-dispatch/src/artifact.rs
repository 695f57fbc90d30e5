//! The compiled module artifact

use std::fmt;
use std::path::Path;

use bytes::Bytes;

/// An opaque, immutable module payload.
///
/// Read once at process start and shared read-only afterwards; cloning only
/// bumps a reference count.
#[derive(Clone)]
pub struct ModuleArtifact {
    name: String,
    bytes: Bytes,
}

impl ModuleArtifact {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read an artifact from disk, naming it after the file stem
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "module".to_string());
        Ok(Self::new(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ModuleArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleArtifact")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_from_path() {
        let mut file = tempfile::Builder::new()
            .prefix("libecho")
            .suffix(".so")
            .tempfile()
            .unwrap();
        file.write_all(b"\x7fELF").unwrap();

        let artifact = ModuleArtifact::from_path(file.path()).await.unwrap();
        assert!(artifact.name().starts_with("libecho"));
        assert_eq!(artifact.bytes().as_ref(), b"\x7fELF");
        assert_eq!(artifact.len(), 4);
    }

    #[tokio::test]
    async fn test_from_missing_path() {
        let result = ModuleArtifact::from_path(Path::new("/nonexistent/module.so")).await;
        assert!(result.is_err());
    }
}
