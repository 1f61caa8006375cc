use std::{
    io,
    net::SocketAddr,
    path::{Path as FsPath, PathBuf},
    sync::Arc,
};

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::put,
    Router,
};
use tokio::{net::TcpListener, task::JoinHandle};
use url::Url;

use crate::{distributor::tails_hash, http_client::TAILS_FORM_FIELD};

const MAX_TAILS_FILE_SIZE: usize = 64 * 1024 * 1024;

/// Directory holding one file per tails hash.
#[derive(Debug)]
pub struct TailsStore {
    dir: PathBuf,
}

impl TailsStore {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &FsPath {
        &self.dir
    }

    /// Only base58 encoded SHA-256 digests address a slot, which also keeps paths inside `dir`.
    fn slot(&self, hash: &str) -> Option<PathBuf> {
        match bs58::decode(hash).into_vec() {
            Ok(digest) if digest.len() == 32 => Some(self.dir.join(hash)),
            _ => None,
        }
    }

    pub async fn load(&self, hash: &str) -> io::Result<Option<Vec<u8>>> {
        let Some(path) = self.slot(hash) else {
            return Ok(None);
        };
        match tokio::fs::read(path).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn store(&self, path: &FsPath, content: &[u8]) -> io::Result<()> {
        if tokio::fs::try_exists(path).await? {
            return Ok(());
        }
        let partial = path.with_extension(format!("partial-{}", std::process::id()));
        tokio::fs::write(&partial, content).await?;
        tokio::fs::rename(&partial, path).await
    }
}

fn reject(status: StatusCode, msg: impl Into<String>) -> Response {
    let msg = msg.into();
    warn!("tails server rejected request; status: {}, reason: {}", status, msg);
    (status, msg).into_response()
}

pub async fn put_tails(
    State(store): State<Arc<TailsStore>>,
    Path(hash): Path<String>,
    mut multipart: Multipart,
) -> Response {
    let Some(path) = store.slot(&hash) else {
        return reject(StatusCode::BAD_REQUEST, format!("invalid tails hash: {hash}"));
    };
    let mut content = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(TAILS_FORM_FIELD) => match field.bytes().await {
                Ok(bytes) => {
                    content = Some(bytes);
                    break;
                }
                Err(err) => return reject(StatusCode::BAD_REQUEST, err.body_text()),
            },
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(err) => return reject(StatusCode::BAD_REQUEST, err.body_text()),
        }
    }
    let Some(content) = content else {
        return reject(StatusCode::BAD_REQUEST, "missing multipart field 'file'");
    };
    if tails_hash(&content) != hash {
        return reject(StatusCode::BAD_REQUEST, "tails hash does not match file content");
    }
    match store.store(&path, &content).await {
        Ok(()) => {
            info!("tails server stored {} ({} bytes)", hash, content.len());
            (StatusCode::OK, hash).into_response()
        }
        Err(err) => reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to store tails file: {err}"),
        ),
    }
}

pub async fn get_tails(State(store): State<Arc<TailsStore>>, Path(hash): Path<String>) -> Response {
    match store.load(&hash).await {
        Ok(Some(content)) => (StatusCode::OK, content).into_response(),
        Ok(None) => reject(StatusCode::NOT_FOUND, format!("tails file {hash} not found")),
        Err(err) => reject(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

pub fn build_router(store: Arc<TailsStore>) -> Router {
    Router::new()
        .route("/:hash", put(put_tails).get(get_tails))
        .layer(DefaultBodyLimit::max(MAX_TAILS_FILE_SIZE))
        .with_state(store)
}

pub struct TailsServerHandle {
    base_url: Url,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl TailsServerHandle {
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

/// Serves `store` on `addr` from a background task. Bind to port 0 to get an ephemeral port.
pub async fn spawn_tails_server(addr: SocketAddr, store: TailsStore) -> io::Result<TailsServerHandle> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let base_url = Url::parse(&format!("http://{local_addr}"))
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    let router = build_router(Arc::new(store));
    let task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            error!("tails server stopped; err: {}", err);
        }
    });
    info!("tails server listening on {}", base_url);
    Ok(TailsServerHandle {
        base_url,
        local_addr,
        task,
    })
}
