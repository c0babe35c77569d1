//! Unified access to dataset files on local disk, S3-compatible storage, and
//! plain HTTPS hosts.
//!
//! Every locator in the registry resolves through [`get_object_store`] to an
//! `ObjectStore` plus the path of the file within it. Remote stores are
//! cached globally (per S3 bucket, per HTTP origin) so repeated staging and
//! metadata calls do not recreate clients or refetch credentials.
//!
//! # Supported locator formats
//!
//! * **S3**: `"s3://bucket/key"` or `"s3://bucket/key?anon=true"` for public
//!   buckets. Credentials come from the AWS environment chain and refresh
//!   automatically for IAM roles, ECS/EKS identities, and SSO sessions.
//! * **HTTP(S)**: `"https://host/path/file.parquet"` (R2/Blob public URLs).
//! * **Local**: absolute or relative filesystem paths.

use dashmap::DashMap;
use futures::StreamExt;
use object_store::http::HttpBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{aws::AmazonS3Builder, local::LocalFileSystem, ObjectMeta, ObjectStore};
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use url::Url;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Cache key distinguishing remote store instances.
#[derive(Hash, Eq, PartialEq, Clone, Debug)]
enum StoreKey {
    S3 { bucket: String, anonymous: bool },
    Http { origin: String },
}

/// Global cache of remote stores. Lock-free concurrent access; entries live
/// for the process lifetime.
static STORE_CACHE: Lazy<DashMap<StoreKey, Arc<dyn ObjectStore>>> = Lazy::new(DashMap::new);

/// Gets or creates a cached S3 store for the given bucket.
///
/// The first access to a bucket builds the store (which may query the
/// credential chain); later accesses with the same `anonymous` flag reuse it.
pub fn get_cached_s3_store(bucket: &str, anonymous: bool) -> Result<Arc<dyn ObjectStore>, BoxError> {
    let key = StoreKey::S3 {
        bucket: bucket.to_string(),
        anonymous,
    };
    let entry = STORE_CACHE.entry(key);
    let store = entry.or_try_insert_with(|| -> Result<Arc<dyn ObjectStore>, BoxError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if anonymous {
            // Skip credential loading and request signing for public buckets
            builder = builder.with_skip_signature(true);
        }
        Ok(Arc::new(builder.build()?))
    })?;
    Ok(Arc::clone(store.value()))
}

/// Gets or creates a cached HTTP store rooted at an origin
/// (`scheme://host[:port]`).
pub fn get_cached_http_store(origin: &str) -> Result<Arc<dyn ObjectStore>, BoxError> {
    let key = StoreKey::Http {
        origin: origin.to_string(),
    };
    let entry = STORE_CACHE.entry(key);
    let store = entry.or_try_insert_with(|| -> Result<Arc<dyn ObjectStore>, BoxError> {
        Ok(Arc::new(HttpBuilder::new().with_url(origin).build()?))
    })?;
    Ok(Arc::clone(store.value()))
}

/// The base URL a locator's store is rooted at, for engines that register
/// object stores by URL. Local paths have no base URL.
pub fn base_url(locator: &str) -> Result<Option<Url>, BoxError> {
    if locator.starts_with("s3://") {
        let url = Url::parse(locator)?;
        let bucket = url.host_str().ok_or("invalid S3 URL - no bucket specified")?;
        return Ok(Some(Url::parse(&format!("s3://{}", bucket))?));
    }
    if locator.starts_with("http://") || locator.starts_with("https://") {
        let url = Url::parse(locator)?;
        let origin = url.origin().ascii_serialization();
        return Ok(Some(Url::parse(&origin)?));
    }
    Ok(None)
}

/// Creates an `ObjectStore` and in-store path from a locator string.
///
/// S3 and HTTP stores come from the global cache; local paths get a
/// `LocalFileSystem` rooted at the filesystem root with the path normalized
/// to be relative to it.
pub async fn get_object_store(
    locator: &str,
) -> Result<(Arc<dyn ObjectStore>, ObjectPath), BoxError> {
    if locator.starts_with("s3://") {
        let url = Url::parse(locator)?;
        let bucket = url.host_str().ok_or("invalid S3 URL - no bucket specified")?;
        let key = url.path().trim_start_matches('/');
        let anonymous = url
            .query_pairs()
            .any(|(k, v)| k == "anon" && (v == "true" || v == "1"));

        let store = get_cached_s3_store(bucket, anonymous)?;
        return Ok((store, ObjectPath::from(key)));
    }

    if locator.starts_with("http://") || locator.starts_with("https://") {
        let url = Url::parse(locator)?;
        let origin = url.origin().ascii_serialization();
        let key = url.path().trim_start_matches('/');

        let store = get_cached_http_store(&origin)?;
        return Ok((store, ObjectPath::from(key)));
    }

    let std_path = Path::new(locator);
    let absolute_path = if std_path.is_absolute() {
        std_path.to_path_buf()
    } else {
        std::env::current_dir()?.join(std_path)
    };

    #[cfg(windows)]
    let (root, relative) = {
        let path_str = absolute_path.to_string_lossy();
        match path_str.find(":\\") {
            Some(pos) => {
                let root = format!("{}:\\", &path_str[..pos]);
                let relative = path_str[pos + 2..].trim_start_matches('\\').replace('\\', "/");
                (root, relative)
            }
            None => return Err("invalid Windows path".into()),
        }
    };

    #[cfg(not(windows))]
    let (root, relative) = {
        let path_str = absolute_path.to_string_lossy();
        ("/".to_string(), path_str.trim_start_matches('/').to_string())
    };

    let store: Arc<dyn ObjectStore> = Arc::new(LocalFileSystem::new_with_prefix(root)?);
    Ok((store, ObjectPath::from(relative)))
}

/// Fetches size/etag/modified metadata for a locator without reading it.
pub async fn fetch_metadata(locator: &str) -> Result<ObjectMeta, BoxError> {
    let (store, path) = get_object_store(locator).await?;
    Ok(store.head(&path).await?)
}

/// File name a staged copy of this locator gets, derived from the last path
/// segment with a slug fallback for extension-less locators.
pub fn staged_filename(locator: &str, fallback: &str) -> String {
    let tail = locator
        .split(['?', '#'])
        .next()
        .unwrap_or(locator)
        .rsplit('/')
        .next()
        .unwrap_or("");
    if tail.is_empty() {
        fallback.to_string()
    } else {
        tail.to_string()
    }
}

/// Downloads a locator into `dest_dir`, returning the local path.
///
/// The transfer streams into a `.download` temp file and is renamed into
/// place only when complete, so readers never observe a partial file. A
/// non-empty file already present at the destination is reused as-is.
pub async fn stage_to_local(locator: &str, dest_dir: &Path) -> Result<PathBuf, BoxError> {
    tokio::fs::create_dir_all(dest_dir).await?;

    let filename = staged_filename(locator, "dataset.parquet");
    let dest_path = dest_dir.join(&filename);

    if let Ok(meta) = tokio::fs::metadata(&dest_path).await {
        if meta.is_file() && meta.len() > 0 {
            println!("Staging reuses existing file: {}", dest_path.display());
            return Ok(dest_path);
        }
    }

    let (store, path) = get_object_store(locator).await?;
    let temp_path = dest_dir.join(format!("{}.download", filename));

    let result: Result<(), BoxError> = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        let mut stream = store.get(&path).await?.into_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }
    .await;

    if let Err(err) = result {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(err);
    }

    tokio::fs::rename(&temp_path, &dest_path).await?;
    println!("Staged {} -> {}", locator, dest_path.display());
    Ok(dest_path)
}
