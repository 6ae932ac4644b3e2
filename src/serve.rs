//! The HTTP front end.
//!
//! Serves the asset tree under `files_prefix` and intercepts the not-found
//! path: a request for a derived filename that does not exist on disk but
//! has a pending queue record triggers materialization, and the freshly
//! rendered bytes are served from the same request. Subsequent requests hit
//! the file directly.
//!
//! Queue records and focus sidecars are internal bookkeeping and are never
//! served, even though they live inside the asset tree.

use crate::imaging::ImageBackend;
use crate::materialize::{self, MaterializedImage, mime_for_path};
use crate::queue;
use crate::sizer::Sizer;
use crate::source;
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode, header};
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Run the server until the process is killed.
pub async fn run<B: ImageBackend + 'static>(sizer: Sizer<B>) -> io::Result<()> {
    let sizer = Arc::new(sizer);
    let listener = TcpListener::bind(&sizer.config().listen).await?;
    info!(listen = %sizer.config().listen, root = %sizer.config().root.display(), "serving");

    loop {
        let (stream, peer) = listener.accept().await?;
        let sizer = Arc::clone(&sizer);
        tokio::task::spawn(async move {
            let service = service_fn({
                let sizer = Arc::clone(&sizer);
                move |req| {
                    let sizer = Arc::clone(&sizer);
                    async move { Ok::<_, Infallible>(handle(sizer, req).await) }
                }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                warn!(peer = %peer, error = %e, "connection error");
            }
        });
    }
}

/// Handle one request. Generic over the body type — the handler never reads
/// request bodies, and tests construct requests with empty ones.
async fn handle<B: ImageBackend + 'static, R>(
    sizer: Arc<Sizer<B>>,
    req: Request<R>,
) -> Response<Full<Bytes>> {
    if req.method() != Method::GET {
        return status_response(StatusCode::METHOD_NOT_ALLOWED);
    }
    let url_path = match urlencoding::decode(req.uri().path()) {
        Ok(p) => p.into_owned(),
        Err(_) => return status_response(StatusCode::BAD_REQUEST),
    };

    // Disk IO and pixel work stay off the runtime threads
    let result = tokio::task::spawn_blocking(move || lookup(&sizer, &url_path)).await;
    match result {
        Ok(Ok(Some(img))) => image_response(&img),
        Ok(Ok(None)) => status_response(StatusCode::NOT_FOUND),
        // A failed materialization (bad record, render error) is not the
        // client's problem; it falls through to an ordinary not-found
        Ok(Err(e)) => {
            warn!(error = %e, "materialization failed, treating as not found");
            status_response(StatusCode::NOT_FOUND)
        }
        Err(e) => {
            error!(error = %e, "worker task failed");
            status_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Resolve a URL to servable bytes: the file itself when it exists, a fresh
/// materialization when a pending record covers it, `None` otherwise.
fn lookup<B: ImageBackend>(
    sizer: &Sizer<B>,
    url_path: &str,
) -> Result<Option<MaterializedImage>, materialize::MaterializeError> {
    if let Some(path) = sizer.config().url_to_path(url_path) {
        if is_internal(&path) {
            return Ok(None);
        }
        if path.is_file() {
            let bytes = std::fs::read(&path)?;
            return Ok(Some(MaterializedImage {
                mime: mime_for_path(&path),
                path,
                bytes,
            }));
        }
    }
    materialize::materialize(sizer, url_path)
}

/// Paths the server refuses to expose: pending records and focus sidecars.
fn is_internal(path: &Path) -> bool {
    queue::is_record_path(path)
        || path.extension().and_then(|e| e.to_str()) == Some(source::FOCUS_EXT)
}

fn image_response(img: &MaterializedImage) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, img.mime)
        .header(header::CONTENT_LENGTH, img.bytes.len())
        .body(Full::new(Bytes::copy_from_slice(&img.bytes)))
        .unwrap_or_else(|_| status_response(StatusCode::INTERNAL_SERVER_ERROR))
}

fn status_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(
        status.canonical_reason().unwrap_or("error").to_string(),
    )));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::imaging::backend::tests::MockBackend;
    use crate::options::SizeOptions;
    use crate::source::SourceImage;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<Sizer<MockBackend>>) {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("photo.jpg"), "jpeg bytes").unwrap();
        let mut config = ServerConfig::default();
        config.root = tmp.path().to_path_buf();
        (tmp, Arc::new(Sizer::new(config, MockBackend::new())))
    }

    fn get(path: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn serves_existing_files() {
        let (_tmp, sizer) = setup();
        let response = handle(Arc::clone(&sizer), get("/files/photo.jpg")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "image/jpeg"
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
    }

    #[tokio::test]
    async fn failed_materialization_degrades_to_404() {
        let (tmp, sizer) = setup();
        fs::write(tmp.path().join("photo.300x200.jpg.queue"), "{not json").unwrap();

        let response = handle(sizer, get("/files/photo.300x200.jpg")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_file_without_record_is_404() {
        let (_tmp, sizer) = setup();
        let response = handle(sizer, get("/files/photo.300x200.jpg")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deferred_variation_materializes_on_first_hit() {
        let (tmp, sizer) = setup();
        let source = SourceImage::resolve(sizer.config(), "/files/photo.jpg").unwrap();
        let v = sizer
            .size(&source, 300, 200, &SizeOptions::default())
            .unwrap();
        assert!(!tmp.path().join("photo.300x200.jpg").exists());

        let response = handle(Arc::clone(&sizer), get(&v.url)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert!(tmp.path().join("photo.300x200.jpg").is_file());
        assert!(!tmp.path().join("photo.300x200.jpg.queue").exists());

        // Second hit serves the file straight from disk
        let response = handle(Arc::clone(&sizer), get(&v.url)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(sizer.backend.get_renders().len(), 1);
    }

    #[tokio::test]
    async fn non_get_is_rejected() {
        let (_tmp, sizer) = setup();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/files/photo.jpg")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = handle(sizer, req).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn internal_files_are_never_served() {
        let (tmp, sizer) = setup();
        let source = SourceImage::resolve(sizer.config(), "/files/photo.jpg").unwrap();
        sizer
            .size(&source, 300, 200, &SizeOptions::default())
            .unwrap();
        fs::write(tmp.path().join("photo.jpg.focus"), r#"{"left":50,"top":50}"#).unwrap();

        let response = handle(Arc::clone(&sizer), get("/files/photo.300x200.jpg.queue")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = handle(sizer, get("/files/photo.jpg.focus")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn traversal_is_404() {
        let (_tmp, sizer) = setup();
        let response = handle(sizer, get("/files/%2e%2e/secret.jpg")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn outside_namespace_is_404() {
        let (_tmp, sizer) = setup();
        let response = handle(sizer, get("/elsewhere/photo.jpg")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
