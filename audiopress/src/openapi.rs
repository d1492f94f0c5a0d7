//! OpenAPI documentation for the HTTP surface, served at `/api-docs/openapi.json`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "audiopress",
        description = "Shrinks uploaded media to a 64 kbps MP3 so it fits under transcription API upload limits."
    ),
    paths(api::handlers::compress::compress_audio),
    components(schemas(api::models::ErrorBody)),
    tags((name = "compress", description = "Audio compression"))
)]
pub struct ApiDoc;
