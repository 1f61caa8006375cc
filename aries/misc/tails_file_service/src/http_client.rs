use std::{path::Path, time::Duration};

use reqwest::{
    header::USER_AGENT,
    multipart::{Form, Part},
    Client, Response, StatusCode,
};
use url::Url;

use crate::errors::error::{TailsFileError, TailsResult};

pub const TAILS_FORM_FIELD: &str = "file";
pub const TAILS_MIME_TYPE: &str = "application/octet-stream";

lazy_static! {
    static ref HTTP_CLIENT: Client = {
        match reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(50))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Some(Duration::from_secs(4)))
            .build()
        {
            Ok(client) => client,
            Err(e) => panic!("Building reqwest client failed: {:?}", e),
        }
    };
}

/// Streams the file at `tails_file_path` to `url` as the single `file` field of a multipart
/// form using `PUT`.
pub async fn put_tails_file(url: &Url, tails_file_path: &Path) -> TailsResult<()> {
    debug!(
        "put_tails_file >> http client sending request PUT {}, file: {}",
        url,
        tails_file_path.display()
    );
    let form = build_form(tails_file_path).await?;
    let response = HTTP_CLIENT
        .put(url.clone())
        .multipart(form)
        .header(USER_AGENT, "reqwest")
        .send()
        .await
        .map_err(|err| TailsFileError::Transport {
            url: url.clone(),
            cause: format!("HTTP Client could not connect, err: {}", err),
        })?;
    process_response(url, response).await
}

async fn build_form(tails_file_path: &Path) -> TailsResult<Form> {
    let io_err = |source| TailsFileError::Io {
        path: tails_file_path.to_path_buf(),
        source,
    };
    let file = tokio::fs::File::open(tails_file_path).await.map_err(io_err)?;
    let length = file.metadata().await.map_err(io_err)?.len();
    let file_name = tails_file_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| TAILS_FORM_FIELD.to_string());

    let part = Part::stream_with_length(file, length)
        .file_name(file_name)
        .mime_str(TAILS_MIME_TYPE)
        .map_err(|err| TailsFileError::InvalidRequest(err.to_string()))?;
    Ok(Form::new().part(TAILS_FORM_FIELD, part))
}

async fn process_response(url: &Url, response: Response) -> TailsResult<()> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| TailsFileError::Transport {
            url: url.clone(),
            cause: format!(
                "PUT response body could not be read, HTTP status: {}, error: {}",
                status, err
            ),
        })?;
    if status == StatusCode::OK {
        trace!("put_tails_file << tails server accepted upload, body: {}", body);
        Ok(())
    } else {
        warn!(
            "put_tails_file << tails server rejected upload, HTTP status: {}, response body: {}",
            status, body
        );
        Err(TailsFileError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
