/*
 * Responsibility
 * - POST /v1/tavern/upload (behind the publish gate)
 * - Stream every `upload[]` part into the publisher's subtree
 * - All-or-nothing: the first bad part aborts the request and nothing from it
 *   is published
 */
use axum::extract::{
    Multipart, State,
    multipart::{Field, MultipartRejection},
};
use tracing::{debug, info};

use crate::api::v1::extractors::Publisher;
use crate::error::AppError;
use crate::services::storage::{PublishPath, UploadBatch};
use crate::state::AppState;

/// Multipart field name every published file is sent under.
pub const UPLOAD_FIELD: &str = "upload[]";

pub async fn upload(
    State(state): State<AppState>,
    Publisher(identity): Publisher,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<String, AppError> {
    let mut multipart = multipart.map_err(|rejection| {
        debug!(%rejection, "request body is not multipart");
        AppError::no_files()
    })?;

    let mut batch = state.store.batch(&identity);
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            debug!(field = ?field.name(), "ignoring non-upload field");
            continue;
        }
        stage_field(&mut batch, field).await?;
    }

    if batch.is_empty() {
        return Err(AppError::no_files());
    }

    let count = batch.commit().await?;
    info!(subject = identity.subject(), files = count, "upload published");

    Ok(format!("{count} files uploaded!"))
}

async fn stage_field(batch: &mut UploadBatch, mut field: Field<'_>) -> Result<(), AppError> {
    let declared = field.file_name().ok_or_else(|| {
        AppError::bad_request("invalid content-disposition: missing filename")
    })?;
    let path = PublishPath::parse(declared)?;

    let mut staged = batch.stage(&path).await?;
    while let Some(chunk) = field.chunk().await? {
        staged.write_chunk(&chunk).await?;
    }
    debug!(path = ?staged.destination(), bytes = staged.written(), "part staged");
    batch.push(staged).await?;

    Ok(())
}
