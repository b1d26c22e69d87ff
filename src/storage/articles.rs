use crate::storage::traits::{ArticleStore, StorageError, StorageResult};
use crate::storage::{write_json_atomic, ArticleRecord};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hex characters of the URL hash used as the article file name
const ID_LEN: usize = 16;

/// Writes each article to `<dir>/<category>/<sha256(url) prefix>.json`
///
/// Saving the same URL twice overwrites the earlier file.
#[derive(Debug, Clone)]
pub struct JsonArticleStore {
    dir: PathBuf,
}

impl JsonArticleStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Returns the file an article for `url` is written to
    pub fn article_path(&self, category: &str, url: &str) -> PathBuf {
        self.dir
            .join(category)
            .join(format!("{}.json", article_id(url)))
    }
}

/// Stable identifier of an article derived from its URL
pub fn article_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(ID_LEN);
    id
}

impl ArticleStore for JsonArticleStore {
    fn save(&self, article: &ArticleRecord) -> StorageResult<PathBuf> {
        let path = self.article_path(&article.category, &article.url);
        write_json_atomic(&path, article)?;
        Ok(path)
    }

    fn count(&self, category: &str) -> StorageResult<usize> {
        let dir = self.dir.join(category);
        if !dir.is_dir() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in std::fs::read_dir(&dir).map_err(|e| StorageError::io(&dir, e))? {
            let path = entry.map_err(|e| StorageError::io(&dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                count += 1;
            }
        }
        Ok(count)
    }

    fn ensure_category(&self, category: &str) -> StorageResult<()> {
        let dir = self.dir.join(category);
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))
    }
}
