// dbsnapshot/src/storage/mod.rs
pub(crate) mod s3;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

pub use s3::S3Gateway;

/// One object as reported by a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    /// `None` when the service did not report a modification time.
    pub last_modified: Option<DateTime<Utc>>,
}

/// The object-storage operations the snapshot and retention tasks rely on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads the whole file under `key`. Either the object exists afterwards or the call fails.
    async fn upload(&self, local_path: &Path, key: &str) -> Result<()>;

    /// Every object in the bucket, across all listing pages.
    async fn list_all(&self) -> Result<Vec<StoredObject>>;

    /// Deletes `keys` in quiet batch mode. An empty slice is a no-op.
    async fn delete_batch(&self, keys: &[String]) -> Result<()>;
}

/// A single page of a listing plus the token for the next one.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<StoredObject>,
    pub next_token: Option<String>,
}

/// Source of listing pages addressed by continuation token.
#[async_trait]
pub trait ObjectPager: Send + Sync {
    async fn list_page(&self, continuation_token: Option<String>) -> Result<ObjectPage>;
}

/// Follows the continuation chain until it is exhausted.
///
/// An error on any page aborts the whole listing.
pub async fn collect_all_pages<P>(pager: &P) -> Result<Vec<StoredObject>>
where
    P: ObjectPager + ?Sized,
{
    let mut page = pager.list_page(None).await?;
    let mut objects = std::mem::take(&mut page.objects);
    let mut pages = 1usize;

    while let Some(token) = page.next_token.take() {
        page = pager.list_page(Some(token)).await?;
        objects.append(&mut page.objects);
        pages += 1;
    }

    tracing::debug!(pages, objects = objects.len(), "listed bucket");
    Ok(objects)
}

/// Object key for a local artifact: its base name, no prefix.
pub fn object_key_from_path(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    struct PagedFake {
        pages: Vec<Vec<&'static str>>,
        fail_on: Option<usize>,
        tokens_seen: Mutex<Vec<Option<String>>>,
    }

    impl PagedFake {
        fn new(pages: Vec<Vec<&'static str>>) -> Self {
            Self {
                pages,
                fail_on: None,
                tokens_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ObjectPager for PagedFake {
        async fn list_page(&self, token: Option<String>) -> Result<ObjectPage> {
            self.tokens_seen.lock().unwrap().push(token.clone());
            let index = match token {
                None => 0,
                Some(t) => t.strip_prefix("page-").unwrap().parse::<usize>().unwrap(),
            };
            if self.fail_on == Some(index) {
                return Err(anyhow!("listing page {index} failed"));
            }
            let objects = self.pages[index]
                .iter()
                .map(|key| StoredObject {
                    key: key.to_string(),
                    last_modified: None,
                })
                .collect();
            let next_token = (index + 1 < self.pages.len()).then(|| format!("page-{}", index + 1));
            Ok(ObjectPage { objects, next_token })
        }
    }

    #[tokio::test]
    async fn aggregates_every_page() {
        let pager = PagedFake::new(vec![vec!["a", "b"], vec!["c", "d"], vec!["e", "f"]]);

        let objects = collect_all_pages(&pager).await.unwrap();

        let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c", "d", "e", "f"]);
        assert_eq!(
            *pager.tokens_seen.lock().unwrap(),
            vec![None, Some("page-1".to_string()), Some("page-2".to_string())]
        );
    }

    #[tokio::test]
    async fn single_page_without_token() {
        let pager = PagedFake::new(vec![vec![]]);
        assert!(collect_all_pages(&pager).await.unwrap().is_empty());
        assert_eq!(pager.tokens_seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_page_aborts_listing() {
        let mut pager = PagedFake::new(vec![vec!["a"], vec!["b"], vec!["c"]]);
        pager.fail_on = Some(1);

        assert!(collect_all_pages(&pager).await.is_err());
        assert_eq!(pager.tokens_seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn key_is_base_name() {
        assert_eq!(
            object_key_from_path(Path::new("./tmp/run-x/dump-2024-01-01T00:00:00Z.sql.gzip")),
            Some("dump-2024-01-01T00:00:00Z.sql.gzip".to_string())
        );
        assert_eq!(object_key_from_path(Path::new("/")), None);
    }
}
