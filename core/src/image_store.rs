// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};

use core_macros::sql_text;
use url::Url;

use crate::{
    config,
    db::{
        deterministic_id::content_hash,
        models::{Image, Link, NewImage},
        ConnectionPool, DeferredTxConnection,
    },
    fetch::Fetcher,
    utils::{dotted_extension, rfc3339_timestamp},
    Error,
};

const IMAGE_SCOPE: &str = "image";
const FILE_SCHEME_PREFIX: &str = "file://";

/// How an image is kept.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum_macros::EnumString,
    strum_macros::Display,
    strum_macros::IntoStaticStr,
    // Diesel traits
    AsExpression,
    FromSqlRow,
)]
#[diesel(sql_type = diesel::sql_types::Text)]
#[strum(serialize_all = "snake_case")]
pub enum ImageMode {
    /// The bytes are stored in the database.
    Save,
    /// Only the hash and origin uri are stored, the serving layer redirects to the origin.
    Link,
}

sql_text!(ImageMode);

/// The image mode selected on the command line or in the environment.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum_macros::EnumString,
    strum_macros::Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum ImageModeSetting {
    #[default]
    Save,
    Link,
    /// Decide per provider.
    Mixed,
}

/// The mode to store images of a provider with.
///
/// | setting | provider in `LINK_BY_DEFAULT_PROVIDERS` | other providers |
/// |---------|-----------------------------------------|-----------------|
/// | save    | save                                    | save            |
/// | link    | link                                    | link            |
/// | mixed   | link                                    | save            |
pub fn mode_for(setting: ImageModeSetting, provider_key: &str) -> ImageMode {
    match setting {
        ImageModeSetting::Save => ImageMode::Save,
        ImageModeSetting::Link => ImageMode::Link,
        ImageModeSetting::Mixed => {
            if config::LINK_BY_DEFAULT_PROVIDERS.contains(&provider_key) {
                ImageMode::Link
            } else {
                ImageMode::Save
            }
        }
    }
}

/// Reference to a stored image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredImage {
    pub image_hash: String,
    pub ext: String,
    /// Where the serving layer exposes the image.
    pub path: String,
}

#[derive(Clone, Debug)]
pub struct StoreImageParams<'a> {
    pub uri: &'a str,
    pub mode: ImageMode,
}

/// An image that is ready to be written in a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadedImage {
    /// The uri was resolved earlier in this run.
    Cached(StoredImage),
    Fetched {
        uri: String,
        bytes: Vec<u8>,
        mode: ImageMode,
    },
}

/// Content addressed image store with a uri link cache.
///
/// Loading (network, filesystem) and storing (database) are separate steps so that callers can
/// store an image in the same short transaction as the entity that references it.
#[derive(Clone)]
pub struct ImageStore {
    pool: ConnectionPool,
    fetcher: Arc<Fetcher>,
    root_uri: Url,
    setting: ImageModeSetting,
    // Links written before this are stale and the uri is fetched again.
    session_started_at: String,
}

impl ImageStore {
    pub fn new(
        pool: ConnectionPool,
        fetcher: Arc<Fetcher>,
        root_uri: Url,
        setting: ImageModeSetting,
    ) -> Self {
        Self {
            pool,
            fetcher,
            root_uri,
            setting,
            session_started_at: rfc3339_timestamp(),
        }
    }

    pub fn setting(&self) -> ImageModeSetting {
        self.setting
    }

    /// Read the image from the filesystem or the network. Failures, including empty bodies,
    /// are recorded in the failure ledger and return `None`.
    pub async fn fetch_image(&self, uri: &str, provider_key: &str) -> Option<Vec<u8>> {
        let uri = uri.trim();
        let result = match local_path(uri) {
            Some(path) => tokio::fs::read(path).await.map_err(Error::from),
            // The fetcher records its own failures.
            None => match self.fetcher.fetch_bytes(uri).await {
                Ok(bytes) => Ok(bytes),
                Err(err) => {
                    log::debug!("Failed to fetch image of {provider_key} from '{uri}': {err}");
                    return None;
                }
            },
        };
        match result {
            Ok(bytes) if bytes.is_empty() => {
                self.fetcher
                    .ledger()
                    .record(IMAGE_SCOPE, uri, format!("Empty image from {provider_key}"));
                None
            }
            Ok(bytes) => Some(bytes),
            Err(err) => {
                self.fetcher.ledger().record(IMAGE_SCOPE, uri, &err);
                None
            }
        }
    }

    /// Resolve the uri from the link cache or load it. `Ok(None)` means the image couldn't be
    /// loaded and the failure was recorded.
    pub async fn load(
        &self,
        uri: &str,
        provider_key: &str,
    ) -> Result<Option<LoadedImage>, Error> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Ok(None);
        }
        if let Some(stored) = self.cached(uri).await? {
            return Ok(Some(LoadedImage::Cached(stored)));
        }
        let loaded = self
            .fetch_image(uri, provider_key)
            .await
            .map(|bytes| LoadedImage::Fetched {
                uri: uri.to_string(),
                bytes,
                mode: mode_for(self.setting, provider_key),
            });
        Ok(loaded)
    }

    async fn cached(&self, uri: &str) -> Result<Option<StoredImage>, Error> {
        let uri = uri.to_string();
        let session_started_at = self.session_started_at.clone();
        let root_uri = self.root_uri.clone();
        self.pool
            .deferred_transaction_async(move |mut tx_conn| {
                let link = match Link::find(tx_conn.as_mut(), &uri)? {
                    Some(link) => link,
                    None => return Ok(None),
                };
                // RFC 3339 UTC timestamps with fixed precision sort lexicographically.
                let refreshed_at = link.updated_at.as_deref().unwrap_or(&link.created_at);
                if refreshed_at < session_started_at.as_str() {
                    return Ok(None);
                }
                let image = Image::find(tx_conn.as_mut(), &link.image_hash, None)?;
                Ok(image.map(|image| StoredImage {
                    path: image_path(&root_uri, &image.image_hash, &image.ext),
                    image_hash: image.image_hash,
                    ext: image.ext,
                }))
            })
            .await
    }

    /// Write a loaded image and its link in the transaction.
    pub fn store_loaded(
        &self,
        tx_conn: &mut DeferredTxConnection,
        loaded: &LoadedImage,
    ) -> Result<StoredImage, Error> {
        match loaded {
            LoadedImage::Cached(stored) => Ok(stored.clone()),
            LoadedImage::Fetched { uri, bytes, mode } => self.store_image(
                tx_conn,
                bytes,
                StoreImageParams {
                    uri,
                    mode: *mode,
                },
            ),
        }
    }

    /// Insert the image unless its content is already stored and point the uri at it. Saving
    /// bytes that were only linked so far fills in the content.
    pub fn store_image(
        &self,
        tx_conn: &mut DeferredTxConnection,
        bytes: &[u8],
        params: StoreImageParams,
    ) -> Result<StoredImage, Error> {
        let image_hash = content_hash(bytes);
        let ext = sniff_extension(bytes).unwrap_or_else(|| dotted_extension(params.uri));
        let content = match params.mode {
            ImageMode::Save => Some(bytes),
            ImageMode::Link => None,
        };

        let written = NewImage::builder()
            .image_hash(&image_hash)
            .content(content)
            .uri(params.uri)
            .ext(&ext)
            .mode(params.mode)
            .build()
            .upsert(tx_conn)?;
        if !written {
            log::trace!("Image {image_hash} from '{}' is already stored", params.uri);
        }
        Link::upsert(tx_conn, params.uri, &image_hash)?;

        // The first writer determines the extension of the image.
        let ext = match Image::find(tx_conn.as_mut(), &image_hash, None)? {
            Some(image) => image.ext,
            None => ext,
        };
        Ok(StoredImage {
            path: image_path(&self.root_uri, &image_hash, &ext),
            image_hash,
            ext,
        })
    }

    /// Load the image and store it in its own transaction.
    pub async fn resolve(
        &self,
        uri: &str,
        provider_key: &str,
    ) -> Result<Option<StoredImage>, Error> {
        let loaded = match self.load(uri, provider_key).await? {
            Some(loaded) => loaded,
            None => return Ok(None),
        };
        let store = self.clone();
        let stored = self
            .pool
            .deferred_transaction_async(move |mut tx_conn| store.store_loaded(&mut tx_conn, &loaded))
            .await?;
        Ok(Some(stored))
    }
}

impl Debug for ImageStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageStore")
            .field("root_uri", &self.root_uri.as_str())
            .field("setting", &self.setting)
            .finish()
    }
}

fn local_path(uri: &str) -> Option<&str> {
    if let Some(path) = uri.strip_prefix(FILE_SCHEME_PREFIX) {
        Some(path)
    } else if uri.starts_with('/') || uri.starts_with("./") || uri.starts_with("../") {
        Some(uri)
    } else {
        None
    }
}

/// Url of a stored image on the serving layer.
pub fn image_path(root_uri: &Url, image_hash: &str, ext: &str) -> String {
    format!(
        "{}/{}/{image_hash}{ext}",
        root_uri.as_str().trim_end_matches('/'),
        config::IMAGE_PATH_PREFIX
    )
}

/// Detect the image format from magic bytes.
fn sniff_extension(bytes: &[u8]) -> Option<String> {
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
    const JPG: &[u8] = b"\xff\xd8\xff";
    const ICO: &[u8] = b"\x00\x00\x01\x00";

    let ext = if bytes.starts_with(PNG) {
        ".png"
    } else if bytes.starts_with(JPG) {
        ".jpg"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        ".gif"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        ".webp"
    } else if bytes.starts_with(ICO) {
        ".ico"
    } else if is_svg(bytes) {
        ".svg"
    } else {
        return None;
    };
    Some(ext.to_string())
}

fn is_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    let head = String::from_utf8_lossy(head);
    let head = head.trim_start_matches('\u{feff}').trim_start();
    (head.starts_with("<svg") || head.starts_with("<?xml")) && head.contains("<svg")
}

#[cfg(test)]
pub mod tests {
    use anyhow::Result;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::{
        db::TmpDb,
        failure_ledger::FailureLedger,
        fetch::tests::test_fetcher,
    };

    pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    pub fn test_store(
        db: &TmpDb,
        ledger: Arc<FailureLedger>,
        setting: ImageModeSetting,
    ) -> Result<ImageStore> {
        Ok(ImageStore::new(
            db.pool.clone(),
            Arc::new(test_fetcher(ledger)?),
            Url::parse("http://localhost:3000/")?,
            setting,
        ))
    }

    #[test]
    fn mode_policy_table() {
        use ImageMode as M;
        use ImageModeSetting as S;

        let cases = [
            (S::Save, "pumptires", M::Save),
            (S::Save, "uniswap", M::Save),
            (S::Link, "pumptires", M::Link),
            (S::Link, "uniswap", M::Link),
            (S::Mixed, "pumptires", M::Link),
            (S::Mixed, "coingecko", M::Link),
            (S::Mixed, "uniswap", M::Save),
        ];
        for (setting, provider, expected) in cases {
            assert_eq!(mode_for(setting, provider), expected, "{setting} {provider}");
        }
    }

    #[test]
    fn sniffs_formats() {
        assert_eq!(sniff_extension(PNG_BYTES).as_deref(), Some(".png"));
        assert_eq!(sniff_extension(b"\xff\xd8\xff\xe0").as_deref(), Some(".jpg"));
        assert_eq!(sniff_extension(b"GIF89a...").as_deref(), Some(".gif"));
        assert_eq!(
            sniff_extension(b"RIFF\x00\x00\x00\x00WEBPVP8 ").as_deref(),
            Some(".webp")
        );
        assert_eq!(
            sniff_extension(b"  <?xml version=\"1.0\"?><svg></svg>").as_deref(),
            Some(".svg")
        );
        assert_eq!(sniff_extension(b"not an image"), None);
    }

    #[test]
    fn local_paths() {
        assert_eq!(local_path("file:///tmp/logo.png"), Some("/tmp/logo.png"));
        assert_eq!(local_path("./assets/logo.png"), Some("./assets/logo.png"));
        assert_eq!(local_path("https://x.example/logo.png"), None);
        assert_eq!(local_path("ipfs://QmCid"), None);
    }

    #[tokio::test]
    async fn identical_content_is_stored_once() -> Result<()> {
        let server = MockServer::start().await;
        for p in ["/a.png", "/b"] {
            Mock::given(method("GET"))
                .and(path(p))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_BYTES))
                .mount(&server)
                .await;
        }
        let db = TmpDb::new()?;
        let store = test_store(&db, Default::default(), ImageModeSetting::Save)?;

        let a = store
            .resolve(&format!("{}/a.png", server.uri()), "uniswap")
            .await?
            .expect("image a");
        let b = store
            .resolve(&format!("{}/b", server.uri()), "coingecko")
            .await?
            .expect("image b");
        assert_eq!(a.image_hash, b.image_hash);
        assert_eq!(a.ext, ".png");
        assert_eq!(
            a.path,
            format!("http://localhost:3000/image/{}.png", a.image_hash)
        );

        let mut conn = db.pool.connection()?;
        assert_eq!(Image::count(&mut conn)?, 1);
        assert!(Link::find(&mut conn, &format!("{}/a.png", server.uri()))?.is_some());
        assert!(Link::find(&mut conn, &format!("{}/b", server.uri()))?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn saving_fills_content_of_linked_image() -> Result<()> {
        let server = MockServer::start().await;
        for p in ["/linked.png", "/saved.png"] {
            Mock::given(method("GET"))
                .and(path(p))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_BYTES))
                .mount(&server)
                .await;
        }
        let db = TmpDb::new()?;
        let store = test_store(&db, Default::default(), ImageModeSetting::Mixed)?;

        let linked = store
            .resolve(&format!("{}/linked.png", server.uri()), "pumptires")
            .await?
            .expect("linked image");
        let mut conn = db.pool.connection()?;
        let image = Image::find(&mut conn, &linked.image_hash, None)?.expect("image");
        assert_eq!(image.content, None);
        assert_eq!(image.mode, ImageMode::Link);

        let saved = store
            .resolve(&format!("{}/saved.png", server.uri()), "uniswap")
            .await?
            .expect("saved image");
        assert_eq!(saved.image_hash, linked.image_hash);
        let image = Image::find(&mut conn, &saved.image_hash, None)?.expect("image");
        assert_eq!(image.content.as_deref(), Some(PNG_BYTES));
        assert_eq!(image.mode, ImageMode::Save);
        assert_eq!(Image::count(&mut conn)?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn link_cache_skips_download() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_BYTES))
            .expect(1)
            .mount(&server)
            .await;
        let db = TmpDb::new()?;
        let store = test_store(&db, Default::default(), ImageModeSetting::Save)?;
        let uri = format!("{}/logo.png", server.uri());

        let first = store.resolve(&uri, "uniswap").await?;
        let second = store.resolve(&uri, "uniswap").await?;
        assert!(first.is_some());
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn missing_image_is_recorded() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let db = TmpDb::new()?;
        let ledger = Arc::new(FailureLedger::new());
        let store = test_store(&db, ledger.clone(), ImageModeSetting::Save)?;

        let stored = store
            .resolve(&format!("{}/img.png", server.uri()), "uniswap")
            .await?;
        assert!(stored.is_none());
        assert_eq!(ledger.len()?, 1);
        let mut conn = db.pool.connection()?;
        assert_eq!(Image::count(&mut conn)?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn empty_body_is_recorded() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let db = TmpDb::new()?;
        let ledger = Arc::new(FailureLedger::new());
        let store = test_store(&db, ledger.clone(), ImageModeSetting::Save)?;

        let stored = store
            .resolve(&format!("{}/empty.png", server.uri()), "uniswap")
            .await?;
        assert!(stored.is_none());
        assert_eq!(ledger.entries()?[0].scope, IMAGE_SCOPE);
        Ok(())
    }

    #[tokio::test]
    async fn linked_image_has_no_content() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("logo.png");
        std::fs::write(&file, PNG_BYTES)?;
        let db = TmpDb::new()?;
        let store = test_store(&db, Default::default(), ImageModeSetting::Mixed)?;

        let stored = store
            .resolve(&format!("file://{}", file.display()), "pumptires")
            .await?
            .expect("image from file");

        let mut conn = db.pool.connection()?;
        let image = Image::find(&mut conn, &stored.image_hash, Some(".png"))?.expect("image");
        assert_eq!(image.mode, ImageMode::Link);
        assert!(image.content.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_file_is_recorded() -> Result<()> {
        let db = TmpDb::new()?;
        let ledger = Arc::new(FailureLedger::new());
        let store = test_store(&db, ledger.clone(), ImageModeSetting::Save)?;

        let stored = store
            .resolve("/nonexistent/assets/logo.png", "trustwallet")
            .await?;
        assert!(stored.is_none());
        assert_eq!(ledger.len()?, 1);
        Ok(())
    }
}
