use crate::domain::models::TimeWindow;
use crate::domain::repository::{
    DocumentIdStream, DocumentRecord, RepositoryClient, RepositoryError, RepositoryResult,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const DESCRIPTOR_FILE: &str = "repository.json";
const DOCUMENTS_DIR: &str = "documents";

/// Repository descriptor stored at the root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    #[serde(default)]
    pub metadata_names: Vec<String>,
}

/// Per-document sidecar stored next to the content file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSidecar {
    #[serde(default)]
    pub url: Option<String>,
    pub updated_at: i64,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub disallowed: Vec<String>,
}

impl DocumentSidecar {
    fn matches(&self, window: &TimeWindow, criteria: &HashMap<String, String>) -> bool {
        window.contains(self.updated_at)
            && criteria.iter().all(|(name, value)| {
                self.metadata
                    .get(name)
                    .map_or(false, |values| values.iter().any(|v| v == value))
            })
    }
}

/// Directory-backed repository.
///
/// Layout under the root:
/// - `repository.json` holds the [`RepositoryDescriptor`]
/// - `documents/<id>.json` holds the [`DocumentSidecar`]
/// - `documents/<id>.data` holds the content body
pub struct FsRepository {
    root: PathBuf,
}

impl FsRepository {
    /// Open a repository rooted at `root`. Fails if the directory is missing.
    pub async fn open(root: impl AsRef<Path>) -> RepositoryResult<Self> {
        let root = root.as_ref().to_path_buf();
        match tokio::fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => {
                info!("Opened filesystem repository at {}", root.display());
                Ok(Self { root })
            }
            Ok(_) => Err(RepositoryError::Invalid(format!(
                "not a directory: {}",
                root.display()
            ))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(RepositoryError::Absent(root.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn documents_dir(&self) -> PathBuf {
        self.root.join(DOCUMENTS_DIR)
    }

    /// Path for a document file, or `None` if the identifier cannot name a file.
    fn document_path(&self, id: &str, extension: &str) -> Option<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return None;
        }
        Some(self.documents_dir().join(format!("{}.{}", id, extension)))
    }

    async fn read_descriptor(&self) -> RepositoryResult<RepositoryDescriptor> {
        let path = self.root.join(DESCRIPTOR_FILE);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RepositoryError::Invalid(format!(
                    "missing {}",
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw).map_err(|e| {
            RepositoryError::Invalid(format!("malformed {}: {}", path.display(), e))
        })
    }

    async fn read_sidecar(&self, id: &str) -> RepositoryResult<Option<DocumentSidecar>> {
        let Some(path) = self.document_path(id, "json") else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(raw) => parse_sidecar(&path, &raw).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_sidecar(path: &Path, raw: &[u8]) -> RepositoryResult<DocumentSidecar> {
    serde_json::from_slice(raw)
        .map_err(|e| RepositoryError::Failed(format!("malformed {}: {}", path.display(), e)))
}

/// Walk the documents directory and collect matching identifiers in name order.
fn scan_documents(
    dir: &Path,
    window: &TimeWindow,
    criteria: &HashMap<String, String>,
) -> RepositoryResult<Vec<String>> {
    if !dir.is_dir() {
        return Err(RepositoryError::Invalid(format!("missing {}", dir.display())));
    }

    let mut ids = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| RepositoryError::Failed(format!("scan error: {}", e)))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let raw = std::fs::read(path)?;
        let sidecar = parse_sidecar(path, &raw)?;
        if sidecar.matches(window, criteria) {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

#[async_trait]
impl RepositoryClient for FsRepository {
    async fn sanity_check(&self) -> RepositoryResult<()> {
        self.read_descriptor().await?;
        match tokio::fs::metadata(self.documents_dir()).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(RepositoryError::Invalid(format!(
                "{} is not a directory",
                self.documents_dir().display()
            ))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(RepositoryError::Invalid(
                format!("missing {}", self.documents_dir().display()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn metadata_names(&self) -> RepositoryResult<Vec<String>> {
        Ok(self.read_descriptor().await?.metadata_names)
    }

    async fn find_documents(
        &self,
        window: TimeWindow,
        criteria: HashMap<String, String>,
    ) -> RepositoryResult<DocumentIdStream> {
        let dir = self.documents_dir();
        debug!("Scanning {} for window {}", dir.display(), window);

        let ids = tokio::task::spawn_blocking(move || scan_documents(&dir, &window, &criteria))
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    RepositoryError::Interrupted
                } else {
                    RepositoryError::Failed(format!("scan task failed: {}", e))
                }
            })??;

        Ok(stream::iter(ids.into_iter().map(Ok)).boxed())
    }

    async fn document_url(&self, id: &str) -> RepositoryResult<Option<String>> {
        Ok(self.read_sidecar(id).await?.and_then(|s| s.url))
    }

    async fn get_document(&self, id: &str) -> RepositoryResult<Option<DocumentRecord>> {
        let Some(sidecar) = self.read_sidecar(id).await? else {
            return Ok(None);
        };

        let mime_type = sidecar.mime_type.clone().or_else(|| {
            sidecar
                .url
                .as_deref()
                .and_then(|url| mime_guess::from_path(url).first())
                .map(|m| m.essence_str().to_string())
        });

        let record = match self.document_path(id, "data") {
            Some(path) => match tokio::fs::File::open(&path).await {
                Ok(file) => {
                    let length = file.metadata().await?.len();
                    DocumentRecord::new(Box::new(file), length)
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => DocumentRecord::empty(),
                Err(e) => return Err(e.into()),
            },
            None => return Ok(None),
        };

        Ok(Some(
            record
                .with_mime_type(mime_type)
                .with_metadata(sidecar.metadata)
                .with_allowed(sidecar.allowed)
                .with_disallowed(sidecar.disallowed),
        ))
    }

    async fn document_updated_time(&self, id: &str) -> RepositoryResult<Option<i64>> {
        Ok(self.read_sidecar(id).await?.map(|s| s.updated_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tokio::io::AsyncReadExt;

    fn write_document(root: &Path, id: &str, sidecar: serde_json::Value, content: Option<&[u8]>) {
        let dir = root.join(DOCUMENTS_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}.json", id)), sidecar.to_string()).unwrap();
        if let Some(content) = content {
            std::fs::write(dir.join(format!("{}.data", id)), content).unwrap();
        }
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DESCRIPTOR_FILE),
            r#"{"metadata_names": ["title", "author"]}"#,
        )
        .unwrap();
        write_document(
            dir.path(),
            "d1",
            serde_json::json!({
                "url": "http://repo/d1.txt",
                "updated_at": 100,
                "metadata": {"author": ["alice"], "title": ["One"]},
                "allowed": ["u1"],
                "disallowed": ["u2"]
            }),
            Some(b"hello"),
        );
        write_document(
            dir.path(),
            "d2",
            serde_json::json!({
                "url": "http://repo/d2.html",
                "updated_at": 2000,
                "metadata": {"author": ["bob", "alice"]}
            }),
            Some(b"<p>two</p>"),
        );
        write_document(
            dir.path(),
            "d3",
            serde_json::json!({"updated_at": 50, "metadata": {"author": ["carol"]}}),
            None,
        );
        dir
    }

    #[tokio::test]
    async fn sanity_check_requires_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRepository::open(dir.path()).await.unwrap();
        assert!(matches!(
            repo.sanity_check().await,
            Err(RepositoryError::Invalid(_))
        ));

        let dir = fixture();
        let repo = FsRepository::open(dir.path()).await.unwrap();
        repo.sanity_check().await.unwrap();
        assert_eq!(repo.metadata_names().await.unwrap(), vec!["title", "author"]);
    }

    #[tokio::test]
    async fn find_filters_by_window_and_criteria() {
        let dir = fixture();
        let repo = FsRepository::open(dir.path()).await.unwrap();

        let criteria = HashMap::from([("author".to_string(), "alice".to_string())]);
        let ids: Vec<String> = repo
            .find_documents(TimeWindow::new(Some(0), Some(1000)), criteria.clone())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids, vec!["d1"]);

        let ids: Vec<String> = repo
            .find_documents(TimeWindow::unbounded(), criteria)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids, vec!["d1", "d2"]);
    }

    #[tokio::test]
    async fn get_document_reads_content_and_acls() {
        let dir = fixture();
        let repo = FsRepository::open(dir.path()).await.unwrap();

        let mut record = repo.get_document("d1").await.unwrap().unwrap();
        assert_eq!(record.declared_length(), 5);
        assert_eq!(record.mime_type(), Some("text/plain"));
        assert_eq!(record.metadata("author"), Some(&["alice".to_string()][..]));
        assert_eq!(record.allowed(), ["u1".to_string()]);
        assert_eq!(record.disallowed(), ["u2".to_string()]);

        let mut body = Vec::new();
        record.take_content().unwrap().read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn missing_documents_are_absent_not_errors() {
        let dir = fixture();
        let repo = FsRepository::open(dir.path()).await.unwrap();

        assert!(repo.get_document("nope").await.unwrap().is_none());
        assert!(repo.document_updated_time("nope").await.unwrap().is_none());
        assert!(repo.document_url("../etc").await.unwrap().is_none());
        // d3 has no url and no content file
        assert!(repo.document_url("d3").await.unwrap().is_none());
        assert_eq!(repo.document_updated_time("d3").await.unwrap(), Some(50));
        let record = repo.get_document("d3").await.unwrap().unwrap();
        assert_eq!(record.declared_length(), 0);
    }

    #[tokio::test]
    async fn find_without_documents_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DESCRIPTOR_FILE), r#"{"metadata_names": []}"#).unwrap();
        let repo = FsRepository::open(dir.path()).await.unwrap();

        let result = repo
            .find_documents(TimeWindow::new(Some(0), Some(1000)), HashMap::new())
            .await;
        assert!(matches!(result, Err(RepositoryError::Invalid(_))));
    }
}
