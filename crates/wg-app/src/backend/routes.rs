use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get};

use crate::backend::routes::config::{base_resolution, presets, validate_resolution};
use crate::backend::routes::gallery::{
    delete_image, export_zip, image_info, list_gallery, list_resolutions, serve_image,
    thumbnail,
};
use crate::backend::routes::generate::ws_generate;
use crate::backend::state::AppState;

mod config;
mod gallery;
mod generate;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/config/presets", get(presets))
        .route("/api/config/validate", get(validate_resolution))
        .route("/api/config/base-resolution", get(base_resolution))
        .route("/api/gallery", get(list_gallery))
        .route("/api/gallery/resolutions", get(list_resolutions))
        .route("/api/gallery/export", get(export_zip))
        .route("/api/gallery/{filename}", delete(delete_image))
        .route("/api/gallery/{filename}/info", get(image_info))
        .route("/api/gallery/{filename}/thumbnail", get(thumbnail))
        .route("/images/{filename}", get(serve_image))
        .route("/ws/generate", get(ws_generate))
}
