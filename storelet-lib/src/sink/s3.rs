use std::path::Path;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, Config};
use log::{debug, info};
use tokio::runtime::Builder;

use crate::error::{Error, Result};
use crate::sink::S3Credentials;

fn client(credentials: &S3Credentials) -> Client {
    let static_credentials = Credentials::new(
        credentials.access_key.clone(),
        credentials.secret_key.clone(),
        None,
        None,
        "storelet",
    );

    let mut builder = Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(credentials.region().to_string()))
        .credentials_provider(static_credentials);

    if let Some(endpoint) = &credentials.endpoint {
        // Path-style addressing for S3-compatible stores.
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }

    Client::from_conf(builder.build())
}

/// Copies the local `archive` to `bucket/key`, blocking until done.
///
/// A private current-thread runtime drives the SDK for the duration of the
/// call, so callers stay fully synchronous. No retries beyond the SDK's own.
pub fn upload_file(
    bucket: &str,
    key: &str,
    archive: &Path,
    credentials: &S3Credentials,
) -> Result<()> {
    let target = format!("s3://{bucket}/{key}");
    let upload_error = |source: Box<dyn std::error::Error + Send + Sync>| Error::Upload {
        target: target.clone(),
        source,
    };

    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| upload_error(e.into()))?;

    rt.block_on(async {
        let body = ByteStream::from_path(archive)
            .await
            .map_err(|e| upload_error(e.into()))?;

        debug!("uploading {} to {target}", archive.display());
        client(credentials)
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("application/zip")
            .body(body)
            .send()
            .await
            .map_err(|e| upload_error(DisplayErrorContext(&e).to_string().into()))?;

        info!("uploaded backup to {target}");
        Ok::<(), Error>(())
    })
}
