use snafu::ensure;

use crate::error::{StreamResult, UploadRejectedSnafu};
use crate::transport::BoxFuture;

const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Answer of the blob-store upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub path: String,
    pub success: bool,
}

/// Image ready to be sent with a prompt: the storage path goes to the backend,
/// the preview stays in the local transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedImage {
    pub path: String,
    pub preview: String,
}

pub trait ImageUploader: Send + Sync {
    fn upload<'a>(
        &'a self,
        bytes: &'a [u8],
        mime_type: &'a str,
    ) -> BoxFuture<'a, StreamResult<UploadedImage>>;
}

/// Uploads one image and pairs the stored path with its preview.
pub async fn attach_image(
    uploader: &dyn ImageUploader,
    bytes: &[u8],
    mime_type: &str,
    preview: impl Into<String>,
) -> StreamResult<AttachedImage> {
    let uploaded = uploader.upload(bytes, mime_type).await?;
    ensure!(
        uploaded.success && !uploaded.path.is_empty(),
        UploadRejectedSnafu {
            stage: "attach-image",
            mime_type: mime_type.to_string(),
        }
    );

    tracing::debug!(path = %uploaded.path, mime_type, "image uploaded");
    Ok(AttachedImage {
        path: uploaded.path,
        preview: preview.into(),
    })
}

/// Reads the MIME type out of a `data:` URL, defaulting to PNG.
pub fn content_type_from_data_url(data_url: &str) -> &str {
    data_url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(';'))
        .map(|(mime, _)| mime)
        .filter(|mime| !mime.is_empty())
        .unwrap_or(DEFAULT_IMAGE_MIME)
}
