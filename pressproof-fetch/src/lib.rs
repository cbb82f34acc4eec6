//! HTTP client for the rendering/preflight service.
//!
//! The viewer never rasterizes PDFs itself: the service holds the documents
//! and replies with pre-rendered page images as base64 data URIs. This crate
//! implements [`RasterSource`] over that API and runs the fetches on a tokio
//! pool, reporting results back to the event loop over a channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, instrument};
use url::Url;

use pressproof_core::{DocumentRef, FetchRequest, PageRaster, RasterSource};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not a data URI")]
    NotADataUri,
    #[error("data URI is not base64-encoded")]
    UnsupportedEncoding,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Decodes a `data:image/...;base64,` URI into the raw image bytes.
pub fn decode_data_uri(uri: &str) -> Result<Bytes, PayloadError> {
    let rest = uri.strip_prefix("data:").ok_or(PayloadError::NotADataUri)?;
    let (meta, payload) = rest.split_once(',').ok_or(PayloadError::NotADataUri)?;
    if !meta.ends_with(";base64") {
        return Err(PayloadError::UnsupportedEncoding);
    }
    Ok(Bytes::from(BASE64.decode(payload.trim())?))
}

#[derive(Debug, Deserialize)]
struct PdfInfoResponse {
    page_count: u32,
}

#[derive(Debug, Deserialize)]
struct ThumbnailResponse {
    thumbnail: Option<String>,
    #[serde(default)]
    placeholder: bool,
    error: Option<String>,
}

/// [`RasterSource`] backed by the rendering service's HTTP API.
pub struct HttpRasterSource {
    client: reqwest::Client,
    base: Url,
}

impl HttpRasterSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .with_context(|| format!("invalid server URL {:?}", base_url))?;
        // Url::join treats a path without a trailing slash as a file.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, base })
    }

    fn info_url(&self, document: &DocumentRef) -> Result<Url> {
        self.base
            .join(&format!(
                "projects/{}/pdf-info/{}",
                document.project_id, document.filename
            ))
            .context("failed to build pdf-info URL")
    }

    fn page_url(&self, document: &DocumentRef, page: u32, width: u32) -> Result<Url> {
        let mut url = self
            .base
            .join(&format!(
                "projects/{}/thumbnail/{}/page/{}",
                document.project_id, document.filename, page
            ))
            .context("failed to build thumbnail URL")?;
        url.query_pairs_mut()
            .append_pair("width", &width.to_string());
        Ok(url)
    }
}

#[async_trait]
impl RasterSource for HttpRasterSource {
    #[instrument(skip(self), fields(project = %document.project_id, file = %document.filename))]
    async fn document_info(&self, document: &DocumentRef) -> Result<u32> {
        let url = self.info_url(document)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("pdf-info request to {} failed", url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("pdf-info request to {} returned {}", url, status);
        }
        let info: PdfInfoResponse = response
            .json()
            .await
            .context("failed to decode pdf-info response")?;
        debug!(page_count = info.page_count, "document info fetched");
        Ok(info.page_count)
    }

    #[instrument(skip(self), fields(project = %document.project_id, file = %document.filename))]
    async fn fetch_page(
        &self,
        document: &DocumentRef,
        page: u32,
        width: u32,
    ) -> Result<PageRaster> {
        let url = self.page_url(document, page, width)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("thumbnail request to {} failed", url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("thumbnail request to {} returned {}", url, status);
        }
        let body: ThumbnailResponse = response
            .json()
            .await
            .context("failed to decode thumbnail response")?;
        if let Some(error) = body.error {
            bail!("rendering service rejected page {}: {}", page, error);
        }
        let Some(thumbnail) = body.thumbnail else {
            bail!("rendering service returned no image for page {}", page);
        };
        let payload = decode_data_uri(&thumbnail)
            .with_context(|| format!("invalid image payload for page {}", page))?;
        Ok(PageRaster {
            payload,
            placeholder: body.placeholder,
        })
    }
}

/// A fetch result tagged with the epoch it was issued under; the session
/// drops results from superseded epochs.
#[derive(Debug)]
pub enum FetchEvent {
    Info {
        epoch: u64,
        outcome: Result<u32>,
    },
    Page {
        epoch: u64,
        page: u32,
        outcome: Result<PageRaster>,
    },
}

/// Spawns fetches on the tokio runtime and funnels results to the event
/// loop. Tasks outlive document changes; staleness is handled by the epoch
/// tag, never by cancelling tasks.
pub struct FetchPool {
    source: Arc<dyn RasterSource>,
    tx: mpsc::UnboundedSender<FetchEvent>,
}

impl FetchPool {
    pub fn new(source: Arc<dyn RasterSource>) -> (Self, mpsc::UnboundedReceiver<FetchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { source, tx }, rx)
    }

    pub fn spawn_info(&self, epoch: u64, document: DocumentRef) {
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = source.document_info(&document).await;
            // Send fails only when the viewer is shutting down.
            let _ = tx.send(FetchEvent::Info { epoch, outcome });
        });
    }

    pub fn spawn_pages(&self, epoch: u64, document: DocumentRef, plan: Vec<FetchRequest>) {
        for request in plan {
            let source = Arc::clone(&self.source);
            let tx = self.tx.clone();
            let document = document.clone();
            tokio::spawn(async move {
                let outcome = source
                    .fetch_page(&document, request.page, request.width)
                    .await;
                let _ = tx.send(FetchEvent::Page {
                    epoch,
                    page: request.page,
                    outcome,
                });
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn data_uri_round_trips_through_base64() {
        let uri = format!("data:image/jpeg;base64,{}", BASE64.encode(b"proof-page"));
        let decoded = decode_data_uri(&uri).unwrap();
        assert_eq!(decoded.as_ref(), b"proof-page");
    }

    #[test]
    fn plain_strings_are_rejected() {
        assert!(matches!(
            decode_data_uri("not a uri"),
            Err(PayloadError::NotADataUri)
        ));
        assert!(matches!(
            decode_data_uri("data:image/jpeg,rawbytes"),
            Err(PayloadError::UnsupportedEncoding)
        ));
        assert!(matches!(
            decode_data_uri("data:image/jpeg;base64,@@@"),
            Err(PayloadError::Base64(_))
        ));
    }

    #[test]
    fn urls_follow_the_service_layout() {
        let source = HttpRasterSource::new("http://render.internal:9000").unwrap();
        let document = DocumentRef::new("proj-42", "brochure.pdf");

        let info = source.info_url(&document).unwrap();
        assert_eq!(
            info.as_str(),
            "http://render.internal:9000/projects/proj-42/pdf-info/brochure.pdf"
        );

        let page = source.page_url(&document, 3, 400).unwrap();
        assert_eq!(
            page.as_str(),
            "http://render.internal:9000/projects/proj-42/thumbnail/brochure.pdf/page/3?width=400"
        );
    }

    #[test]
    fn base_paths_keep_their_prefix() {
        let source = HttpRasterSource::new("http://render.internal:9000/api/v1").unwrap();
        let document = DocumentRef::new("p", "f.pdf");
        let info = source.info_url(&document).unwrap();
        assert_eq!(
            info.as_str(),
            "http://render.internal:9000/api/v1/projects/p/pdf-info/f.pdf"
        );
    }

    struct FakeSource;

    #[async_trait]
    impl RasterSource for FakeSource {
        async fn document_info(&self, _document: &DocumentRef) -> Result<u32> {
            Ok(12)
        }

        async fn fetch_page(
            &self,
            _document: &DocumentRef,
            page: u32,
            width: u32,
        ) -> Result<PageRaster> {
            if page == 7 {
                return Err(anyhow!("page 7 is broken"));
            }
            Ok(PageRaster::new(Bytes::from(vec![page as u8, width as u8])))
        }
    }

    #[tokio::test]
    async fn pool_reports_every_request_with_its_epoch() {
        let (pool, mut rx) = FetchPool::new(Arc::new(FakeSource));
        let document = DocumentRef::new("proj-1", "run.pdf");

        pool.spawn_info(3, document.clone());
        pool.spawn_pages(
            3,
            document,
            vec![
                FetchRequest { page: 1, width: 800 },
                FetchRequest { page: 7, width: 800 },
            ],
        );

        let mut infos = 0;
        let mut ok_pages = 0;
        let mut failed_pages = 0;
        for _ in 0..3 {
            match rx.recv().await.expect("pool sends one event per request") {
                FetchEvent::Info { epoch, outcome } => {
                    assert_eq!(epoch, 3);
                    assert_eq!(outcome.unwrap(), 12);
                    infos += 1;
                }
                FetchEvent::Page { epoch, page, outcome } => {
                    assert_eq!(epoch, 3);
                    if page == 7 {
                        assert!(outcome.is_err());
                        failed_pages += 1;
                    } else {
                        assert!(outcome.is_ok());
                        ok_pages += 1;
                    }
                }
            }
        }
        assert_eq!((infos, ok_pages, failed_pages), (1, 1, 1));
    }
}
