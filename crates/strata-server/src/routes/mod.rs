//! API route handlers

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use strata_core::{ConfigMap, ConfigValue, RemoveOptions, StateCodec};

use crate::error::ApiResult;
use crate::state::AppState;

const SECRET_MASK: &str = "[secret]";

// ========== Stack Routes ==========

#[derive(Deserialize, Default)]
pub struct ListStacksQuery {
    #[serde(default)]
    all: bool,
}

/// List stacks
pub async fn list_stacks(
    State(state): State<AppState>,
    Query(query): Query<ListStacksQuery>,
) -> ApiResult<impl IntoResponse> {
    let (stacks, current) = state
        .blocking(move |manager| {
            let stacks = manager.list_stacks(query.all)?;
            let current = manager.stack()?.map(|s| s.name);
            Ok((stacks, current))
        })
        .await?;

    Ok(Json(serde_json::json!({
        "stacks": stacks,
        "current": current
    })))
}

#[derive(Deserialize)]
pub struct CreateStackRequest {
    name: String,
}

/// Create a stack and select it
pub async fn create_stack(
    State(state): State<AppState>,
    Json(req): Json<CreateStackRequest>,
) -> ApiResult<impl IntoResponse> {
    let summary = state
        .blocking(move |manager| manager.create_stack(&req.name))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "stack": summary
        })),
    ))
}

/// Get the selected stack
pub async fn current_stack(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let current = state.blocking(|manager| manager.stack()).await?;
    Ok(Json(serde_json::json!({ "stack": current })))
}

/// Select a stack
pub async fn select_stack(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .blocking(move |manager| manager.select_stack(&name))
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Remove a stack (`?force=true&preserve_config=true`)
pub async fn remove_stack(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(options): Query<RemoveOptions>,
) -> ApiResult<impl IntoResponse> {
    state
        .blocking(move |manager| manager.remove_stack(&name, options))
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

// ========== Config Routes ==========

#[derive(Deserialize, Default)]
pub struct ConfigQuery {
    #[serde(default)]
    path: bool,
    #[serde(default)]
    show_secrets: bool,
}

fn mask_secrets(config: ConfigMap) -> ConfigMap {
    config
        .into_iter()
        .map(|(key, value)| {
            if value.secret {
                (key, ConfigValue::secret(SECRET_MASK))
            } else {
                (key, value)
            }
        })
        .collect()
}

/// Get a stack's working config; secrets are masked unless `show_secrets`
pub async fn get_all_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ConfigQuery>,
) -> ApiResult<impl IntoResponse> {
    let config = state
        .blocking(move |manager| manager.get_all_config(&name))
        .await?;
    let config = if query.show_secrets {
        config
    } else {
        mask_secrets(config)
    };
    Ok(Json(serde_json::json!({ "config": config })))
}

#[derive(Deserialize)]
pub struct SetAllConfigRequest {
    config: ConfigMap,
    #[serde(default)]
    path: bool,
}

/// Set many config values at once; all or nothing
pub async fn set_all_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SetAllConfigRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .blocking(move |manager| manager.set_all_config(&name, &req.config, req.path))
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
pub struct RemoveConfigRequest {
    keys: Vec<String>,
    #[serde(default)]
    path: bool,
}

/// Remove many config keys at once; all or nothing
pub async fn remove_all_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<RemoveConfigRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .blocking(move |manager| manager.remove_all_config(&name, &req.keys, req.path))
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Reset the working config to the last applied one
pub async fn refresh_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let config = state
        .blocking(move |manager| manager.refresh_config(&name))
        .await?;
    Ok(Json(serde_json::json!({ "config": mask_secrets(config) })))
}

/// Get one config value
pub async fn get_config(
    State(state): State<AppState>,
    Path((name, key)): Path<(String, String)>,
    Query(query): Query<ConfigQuery>,
) -> ApiResult<impl IntoResponse> {
    let value = state
        .blocking(move |manager| manager.get_config(&name, &key, query.path))
        .await?;
    let value = if value.secret && !query.show_secrets {
        ConfigValue::secret(SECRET_MASK)
    } else {
        value
    };
    Ok(Json(serde_json::json!({ "value": value })))
}

#[derive(Deserialize)]
pub struct SetConfigRequest {
    value: String,
    #[serde(default)]
    secret: bool,
}

/// Set one config value
pub async fn set_config(
    State(state): State<AppState>,
    Path((name, key)): Path<(String, String)>,
    Query(query): Query<ConfigQuery>,
    Json(req): Json<SetConfigRequest>,
) -> ApiResult<impl IntoResponse> {
    let value = if req.secret {
        ConfigValue::secret(req.value)
    } else {
        ConfigValue::new(req.value)
    };
    state
        .blocking(move |manager| manager.set_config(&name, &key, value, query.path))
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Remove one config value; missing keys are a no-op
pub async fn remove_config(
    State(state): State<AppState>,
    Path((name, key)): Path<(String, String)>,
    Query(query): Query<ConfigQuery>,
) -> ApiResult<impl IntoResponse> {
    state
        .blocking(move |manager| manager.remove_config(&name, &key, query.path))
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

// ========== Tag Routes ==========

pub async fn list_tags(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let tags = state
        .blocking(move |manager| manager.list_tags(&name))
        .await?;
    Ok(Json(serde_json::json!({ "tags": tags })))
}

pub async fn get_tag(
    State(state): State<AppState>,
    Path((name, key)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let value = state
        .blocking(move |manager| manager.get_tag(&name, &key))
        .await?;
    Ok(Json(serde_json::json!({ "value": value })))
}

#[derive(Deserialize)]
pub struct SetTagRequest {
    value: String,
}

pub async fn set_tag(
    State(state): State<AppState>,
    Path((name, key)): Path<(String, String)>,
    Json(req): Json<SetTagRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .blocking(move |manager| manager.set_tag(&name, &key, &req.value))
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn remove_tag(
    State(state): State<AppState>,
    Path((name, key)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    state
        .blocking(move |manager| manager.remove_tag(&name, &key))
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

// ========== State Routes ==========

/// Export a stack as a deployment document
pub async fn export_stack(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state
        .blocking(move |manager| StateCodec::encode(&manager.export_stack(&name)?))
        .await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes))
}

/// Import a deployment document into a stack
///
/// The raw body goes to the core unparsed: a missing stack is a 404 and a
/// malformed document a 400.
pub async fn import_stack(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    state
        .blocking(move |manager| manager.import_stack_document(&name, &body))
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Outputs recorded by the last update
pub async fn stack_outputs(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ConfigQuery>,
) -> ApiResult<impl IntoResponse> {
    let mut outputs = state
        .blocking(move |manager| manager.stack_outputs(&name))
        .await?;
    if !query.show_secrets {
        for output in outputs.values_mut().filter(|o| o.secret) {
            output.value = serde_json::Value::String(SECRET_MASK.to_string());
        }
    }
    Ok(Json(serde_json::json!({ "outputs": outputs })))
}
