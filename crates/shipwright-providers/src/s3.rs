//! Object storage (S3) for static files.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{AwsError, AwsResult};

/// One page of a `ListObjectsV2` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub common_prefixes: Vec<String>,
    /// Set when more pages follow.
    pub next_token: Option<String>,
}

/// Object store operations.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> AwsResult<()>;

    async fn delete_object(&self, bucket: &str, key: &str) -> AwsResult<()>;

    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        continuation: Option<String>,
    ) -> AwsResult<ListPage>;
}

/// Every key under `prefix`.
pub async fn list_keys(store: &dyn ObjectStore, bucket: &str, prefix: &str) -> AwsResult<Vec<String>> {
    let mut keys = Vec::new();
    let mut token = None;
    loop {
        let page = store.list_objects_v2(bucket, prefix, None, token).await?;
        keys.extend(page.keys);
        match page.next_token {
            Some(next) => token = Some(next),
            None => return Ok(keys),
        }
    }
}

/// Names directly below `prefix`, using `/` as the delimiter.
pub async fn list_immediate_children(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
) -> AwsResult<Vec<String>> {
    let prefix = if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    };

    let mut children: Vec<String> = Vec::new();
    let mut token = None;
    loop {
        let page = store.list_objects_v2(bucket, &prefix, Some("/"), token).await?;
        for common in page.common_prefixes {
            let name = common
                .strip_prefix(&prefix)
                .unwrap_or(&common)
                .trim_end_matches('/');
            if !name.is_empty() && !children.iter().any(|c| c == name) {
                children.push(name.to_string());
            }
        }
        match page.next_token {
            Some(next) => token = Some(next),
            None => return Ok(children),
        }
    }
}

/// Delete every key under `prefix` not matching one of `exclude`.
/// Returns the number of deleted objects.
pub async fn delete_prefix(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    exclude: &[Regex],
) -> AwsResult<usize> {
    let mut deleted = 0;
    for key in list_keys(store, bucket, prefix).await? {
        if exclude.iter().any(|re| re.is_match(&key)) {
            debug!(key = %key, "Skipping delete (excluded)");
            continue;
        }
        store.delete_object(bucket, &key).await?;
        deleted += 1;
    }
    debug!(bucket = %bucket, prefix = %prefix, deleted, "Deleted prefix");
    Ok(deleted)
}

/// Upload every regular file under `dir` to `prefix/<relative path>`.
/// Returns the uploaded keys in walk order.
pub async fn upload_directory(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    dir: &Path,
) -> AwsResult<Vec<String>> {
    info!(bucket = %bucket, prefix = %prefix, dir = %dir.display(), "Uploading directory");
    let mut uploaded = Vec::new();
    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| AwsError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| AwsError::S3(e.to_string()))?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let key = join_key(prefix, &rel);
        let content_type = content_type(entry.path());
        let body = tokio::fs::read(entry.path()).await?;

        debug!(path = %entry.path().display(), key = %key, content_type, "Uploading file");
        store.put_object(bucket, &key, body, content_type).await?;
        uploaded.push(key);
    }
    Ok(uploaded)
}

/// Join key segments with a single `/`.
pub fn join_key(prefix: &str, rest: &str) -> String {
    match (prefix.trim_end_matches('/'), rest.trim_start_matches('/')) {
        ("", rest) => rest.to_string(),
        (prefix, "") => prefix.to_string(),
        (prefix, rest) => format!("{}/{}", prefix, rest),
    }
}

/// Content type by file extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" | "map" => "application/json",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "xml" => "text/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/vnd.microsoft.icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "gz" => "application/gzip",
        _ => "application/octet-stream",
    }
}

/// S3 client.
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> AwsResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AwsError::S3(format!("put s3://{}/{}: {}", bucket, key, e)))?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> AwsResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AwsError::S3(format!("delete s3://{}/{}: {}", bucket, key, e)))?;
        Ok(())
    }

    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        continuation: Option<String>,
    ) -> AwsResult<ListPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_delimiter(delimiter.map(String::from))
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| AwsError::S3(format!("list s3://{}/{}: {}", bucket, prefix, e)))?;

        let truncated = output.is_truncated().unwrap_or(false);
        Ok(ListPage {
            keys: output
                .contents()
                .iter()
                .filter_map(|o| o.key().map(String::from))
                .collect(),
            common_prefixes: output
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(String::from))
                .collect(),
            next_token: output
                .next_continuation_token()
                .filter(|_| truncated)
                .map(String::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory bucket returning pages of two keys.
    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<BTreeMap<String, (Vec<u8>, String)>>,
    }

    impl MemoryStore {
        fn with_keys(keys: &[&str]) -> Self {
            let store = Self::default();
            for key in keys {
                store
                    .objects
                    .lock()
                    .unwrap()
                    .insert(key.to_string(), (Vec::new(), String::new()));
            }
            store
        }

        fn keys(&self) -> Vec<String> {
            self.objects.lock().unwrap().keys().cloned().collect()
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn put_object(&self, _: &str, key: &str, body: Vec<u8>, ct: &str) -> AwsResult<()> {
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), (body, ct.to_string()));
            Ok(())
        }

        async fn delete_object(&self, _: &str, key: &str) -> AwsResult<()> {
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        async fn list_objects_v2(
            &self,
            _: &str,
            prefix: &str,
            delimiter: Option<&str>,
            continuation: Option<String>,
        ) -> AwsResult<ListPage> {
            let mut entries: Vec<(bool, String)> = Vec::new();
            for key in self.objects.lock().unwrap().keys() {
                let Some(rest) = key.strip_prefix(prefix) else {
                    continue;
                };
                match delimiter.and_then(|d| rest.find(d).map(|i| (d, i))) {
                    Some((d, i)) => {
                        let common = format!("{}{}", prefix, &rest[..i + d.len()]);
                        if !entries.iter().any(|(c, e)| *c && *e == common) {
                            entries.push((true, common));
                        }
                    }
                    None => entries.push((false, key.clone())),
                }
            }
            let start: usize = continuation.map(|t| t.parse().unwrap()).unwrap_or(0);
            let end = (start + 2).min(entries.len());
            let mut page = ListPage::default();
            for (common, entry) in &entries[start..end] {
                if *common {
                    page.common_prefixes.push(entry.clone());
                } else {
                    page.keys.push(entry.clone());
                }
            }
            page.next_token = (end < entries.len()).then(|| end.to_string());
            Ok(page)
        }
    }

    #[tokio::test]
    async fn test_delete_prefix_paginates_and_excludes() {
        let store = MemoryStore::with_keys(&[
            "docs/site/index.html",
            "docs/site/a.css",
            "docs/site/b/feature/index.html",
            "docs/site/keep.txt",
            "docs/other/index.html",
        ]);
        let exclude = vec![Regex::new(r"keep\.txt$").unwrap()];

        let deleted = delete_prefix(&store, "b", "docs/site/", &exclude).await.unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(store.keys(), vec!["docs/other/index.html", "docs/site/keep.txt"]);
    }

    #[tokio::test]
    async fn test_list_immediate_children() {
        let store = MemoryStore::with_keys(&[
            "docs/site/b/feature-a/index.html",
            "docs/site/b/feature-a/app.js",
            "docs/site/b/feature-b/index.html",
            "docs/site/b/fix/index.html",
            "docs/site/b/stray.txt",
        ]);
        let children = list_immediate_children(&store, "b", "docs/site/b").await.unwrap();
        assert_eq!(children, vec!["feature-a", "feature-b", "fix"]);
    }

    #[tokio::test]
    async fn test_upload_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<html/>").unwrap();
        std::fs::write(dir.path().join("assets/app.js"), "x").unwrap();
        std::fs::write(dir.path().join("assets/blob.bin"), "x").unwrap();

        let store = MemoryStore::default();
        let keys = upload_directory(&store, "b", "docs/site", dir.path()).await.unwrap();
        assert_eq!(
            keys,
            vec!["docs/site/assets/app.js", "docs/site/assets/blob.bin", "docs/site/index.html"]
        );
        let objects = store.objects.lock().unwrap();
        assert_eq!(objects["docs/site/index.html"].1, "text/html");
        assert_eq!(objects["docs/site/assets/blob.bin"].1, "application/octet-stream");
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("docs/site/", "/index.html"), "docs/site/index.html");
        assert_eq!(join_key("", "index.html"), "index.html");
        assert_eq!(join_key("docs", ""), "docs");
    }
}
