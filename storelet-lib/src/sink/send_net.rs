use std::fs::File;
use std::path::Path;

use log::info;
use reqwest::header::CONTENT_TYPE;

use crate::error::{Error, Result};

/// Streams the archive file to `url` as the body of an HTTP POST.
/// Any non-2xx response is an error.
pub fn send_http(url: &str, archive: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| Error::io(archive, e))?;

    let client = reqwest::blocking::Client::new();
    let resp = client
        .post(url)
        .header(CONTENT_TYPE, "application/zip")
        .body(file)
        .send()?;

    info!("HTTP upload to {url} answered {}", resp.status());
    resp.error_for_status()?;
    Ok(())
}
