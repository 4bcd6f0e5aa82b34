use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use wg_core::UpscalerModel;
use wg_core::presets::{DeviceCategory, presets_in};
use wg_core::resolution::{calculate_base_resolution, check_resolution};
use wg_core::settings::GenerationDefaults;

use crate::backend::schemas::{
    BaseResolutionResponse, PresetEntry, PresetsResponse, PublicDefaults, ResolutionQuery,
    UpscalerInfo, ValidationResponse,
};
use crate::backend::state::AppState;

pub async fn presets(State(state): State<Arc<AppState>>) -> Json<PresetsResponse> {
    Json(presets_response(&state.defaults))
}

pub async fn validate_resolution(Query(query): Query<ResolutionQuery>) -> Json<ValidationResponse> {
    let (valid, error) = check_resolution(query.w, query.h);
    Json(ValidationResponse { valid, error })
}

pub async fn base_resolution(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResolutionQuery>,
) -> Json<BaseResolutionResponse> {
    Json(base_for(query, state.defaults.base_size))
}

fn presets_response(defaults: &GenerationDefaults) -> PresetsResponse {
    let presets = DeviceCategory::all()
        .into_iter()
        .map(|category| (category.label(), presets_in(category).map(PresetEntry::from).collect()))
        .collect();

    let upscaler_models = UpscalerModel::all()
        .into_iter()
        .map(|model| {
            let info = UpscalerInfo {
                scale: model.scale(),
                description: model.description(),
            };
            (model.name(), info)
        })
        .collect::<BTreeMap<_, _>>();

    PresetsResponse {
        presets,
        upscaler_models,
        default_settings: PublicDefaults::from(defaults),
    }
}

fn base_for(query: ResolutionQuery, base_size: u32) -> BaseResolutionResponse {
    let base = calculate_base_resolution(wg_core::Resolution::new(query.w, query.h), base_size);
    BaseResolutionResponse {
        base_width: base.width,
        base_height: base.height,
    }
}
