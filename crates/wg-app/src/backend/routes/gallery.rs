use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use tokio::task::spawn_blocking;
use wg_core::StoreError;
use wg_core::gallery::{Gallery, Page, filter_history, paginate};
use wg_core::imaging::{self, ImageInfo, THUMBNAIL_SIZE};

use crate::backend::schemas::{ExportQuery, GalleryItem, GalleryQuery};
use crate::backend::state::AppState;
use crate::error::AppError;

const ZIP_DISPOSITION: &str = "attachment; filename=wallpapers.zip";

pub async fn list_gallery(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GalleryQuery>,
) -> Result<Json<Page<GalleryItem>>, AppError> {
    query.validate()?;
    let gallery = state.gallery.clone();
    let page = spawn_blocking(move || -> Result<_, AppError> {
        let history = filter_history(gallery.history()?, &query.search, &query.resolution);
        Ok(paginate(history, query.page, query.per_page).map(GalleryItem::from))
    })
    .await??;
    Ok(Json(page))
}

pub async fn list_resolutions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, AppError> {
    let gallery = state.gallery.clone();
    let resolutions = spawn_blocking(move || gallery.resolutions()).await??;
    Ok(Json(resolutions))
}

pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<StatusCode, AppError> {
    let gallery = state.gallery.clone();
    spawn_blocking(move || gallery.delete(&filename)).await??;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn image_info(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Json<ImageInfo>, AppError> {
    let gallery = state.gallery.clone();
    let info = spawn_blocking(move || -> Result<_, AppError> {
        let path = existing(&gallery, &filename)?;
        Ok(imaging::image_info(&path)?)
    })
    .await??;
    Ok(Json(info))
}

pub async fn thumbnail(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let gallery = state.gallery.clone();
    let png = spawn_blocking(move || -> Result<_, AppError> {
        let path = existing(&gallery, &filename)?;
        let image = image::open(&path)?.to_rgb8();
        Ok(imaging::encode_png(&imaging::thumbnail(&image, THUMBNAIL_SIZE))?)
    })
    .await??;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

pub async fn serve_image(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let gallery = state.gallery.clone();
    let bytes = spawn_blocking(move || -> Result<_, AppError> {
        let path = existing(&gallery, &filename)?;
        Ok(std::fs::read(path).map_err(StoreError::from)?)
    })
    .await??;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}

pub async fn export_zip(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let names = query.names();
    if names.is_empty() {
        return Err(AppError::Validation("No files specified".into()));
    }
    let gallery = state.gallery.clone();
    let archive = spawn_blocking(move || gallery.export_zip(&names)).await??;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip"),
            (header::CONTENT_DISPOSITION, ZIP_DISPOSITION),
        ],
        archive,
    ))
}

fn existing(gallery: &Gallery, filename: &str) -> Result<PathBuf, AppError> {
    let path = gallery.resolve(filename)?;
    if !path.is_file() {
        return Err(AppError::NotFound);
    }
    Ok(path)
}
