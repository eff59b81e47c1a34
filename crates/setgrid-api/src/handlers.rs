//! REST API handlers.
//!
//! Each handler runs one engine call through [`call`] and wraps the result
//! in the `{success, data, error}` envelope.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use setgrid_core::{Pagination, PercentRule, SettingFilter, SettingUpdate};
use setgrid_rollout::{RolloutEngine, RolloutError, RolloutResult};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn rollout_error_response(err: &RolloutError) -> Response {
    let status = match err {
        RolloutError::NotFound(_) => StatusCode::NOT_FOUND,
        RolloutError::Validation(_) => StatusCode::BAD_REQUEST,
        RolloutError::Conflict(_) => StatusCode::CONFLICT,
        RolloutError::Store(_) => {
            error!(error = %err, "store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(&err.to_string(), status)
}

/// Run one engine call on the blocking pool under the request deadline.
///
/// On deadline expiry the caller gets 504, but the call itself is not
/// cancelled and may still commit.
async fn call<T, F>(state: &ApiState, op: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(RolloutEngine) -> RolloutResult<T> + Send + 'static,
{
    let engine = state.engine.clone();
    let task = tokio::task::spawn_blocking(move || op(engine));
    match tokio::time::timeout(state.timeout, task).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(rollout_error_response(&e)),
        Ok(Err(e)) => {
            error!(error = %e, "engine task failed");
            Err(error_response("internal error", StatusCode::INTERNAL_SERVER_ERROR))
        }
        Err(_) => {
            warn!(timeout_ms = state.timeout.as_millis() as u64, "request deadline exceeded");
            Err(error_response("request deadline exceeded", StatusCode::GATEWAY_TIMEOUT))
        }
    }
}

async fn respond<T, F>(state: &ApiState, status: StatusCode, op: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(RolloutEngine) -> RolloutResult<T> + Send + 'static,
{
    match call(state, op).await {
        Ok(data) => (status, ApiResponse::ok(data)).into_response(),
        Err(resp) => resp,
    }
}

// ── Request bodies ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateModuleRequest {
    pub name: String,
    #[serde(default)]
    pub desc: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSettingRequest {
    pub name: String,
    #[serde(default)]
    pub desc: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub value: String,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecallRequest {
    pub release: u64,
}

#[derive(Debug, Deserialize)]
pub struct UsersRequest {
    pub users: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub kind: String,
    pub uid: String,
    #[serde(default)]
    pub desc: String,
}

// ── Statistics ─────────────────────────────────────────────────

/// GET /api/v1/statistics
pub async fn statistics(State(state): State<ApiState>) -> impl IntoResponse {
    respond(&state, StatusCode::OK, |engine| engine.statistics()).await
}

// ── Modules ────────────────────────────────────────────────────

/// POST /api/v1/modules
pub async fn create_module(
    State(state): State<ApiState>,
    Json(req): Json<CreateModuleRequest>,
) -> impl IntoResponse {
    respond(&state, StatusCode::CREATED, move |engine| {
        engine.create_module(&req.name, &req.desc)
    })
    .await
}

/// GET /api/v1/modules/:id
pub async fn get_module(State(state): State<ApiState>, Path(id): Path<u64>) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| engine.get_module(id)).await
}

// ── Settings ───────────────────────────────────────────────────

/// GET /api/v1/modules/:id/settings
pub async fn list_settings(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    Query(pg): Query<Pagination>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| engine.list_settings(id, &pg)).await
}

/// POST /api/v1/modules/:id/settings
pub async fn create_setting(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    Json(req): Json<CreateSettingRequest>,
) -> impl IntoResponse {
    respond(&state, StatusCode::CREATED, move |engine| {
        engine.create_setting(id, &req.name, &req.desc)
    })
    .await
}

/// GET /api/v1/modules/:id/settings/:name
pub async fn get_active_setting(
    State(state): State<ApiState>,
    Path((id, name)): Path<(u64, String)>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| {
        engine.acquire_active_setting(id, &name)
    })
    .await
}

/// POST /api/v1/modules/:id/settings/:name/offline
pub async fn offline_setting(
    State(state): State<ApiState>,
    Path((id, name)): Path<(u64, String)>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| {
        let setting = engine.acquire_active_setting(id, &name)?;
        engine.offline(id, setting.id)
    })
    .await
}

/// GET /api/v1/settings/:id
pub async fn get_setting(State(state): State<ApiState>, Path(id): Path<u64>) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| engine.get_setting(id)).await
}

/// PATCH /api/v1/settings/:id
pub async fn update_setting(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    Json(update): Json<SettingUpdate>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| engine.update_setting(id, update)).await
}

/// DELETE /api/v1/settings/:id
pub async fn delete_setting(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| engine.delete(id)).await
}

// ── Rollout ────────────────────────────────────────────────────

/// POST /api/v1/settings/:id/assign
pub async fn assign(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    Json(req): Json<AssignRequest>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| {
        engine.assign(id, &req.value, &req.users, &req.groups)
    })
    .await
}

/// POST /api/v1/settings/:id/recall
pub async fn recall(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    Json(req): Json<RecallRequest>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| {
        let removed = engine.recall(id, req.release)?;
        Ok(serde_json::json!({ "release": req.release, "removed": removed }))
    })
    .await
}

/// POST /api/v1/settings/:id/releases
pub async fn acquire_release(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| {
        let release = engine.acquire_release(id)?;
        Ok(serde_json::json!({ "release": release }))
    })
    .await
}

/// GET /api/v1/settings/:id/rules
pub async fn list_rules(State(state): State<ApiState>, Path(id): Path<u64>) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| engine.list_rules(id)).await
}

/// POST /api/v1/settings/:id/rules
pub async fn create_rule(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    Json(rule): Json<PercentRule>,
) -> impl IntoResponse {
    respond(&state, StatusCode::CREATED, move |engine| engine.create_rule(id, rule)).await
}

/// GET /api/v1/settings/:id/users
pub async fn list_setting_users(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    Query(pg): Query<Pagination>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| {
        engine.list_setting_users(id, &pg)
    })
    .await
}

/// GET /api/v1/settings/:id/groups
pub async fn list_setting_groups(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    Query(pg): Query<Pagination>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| {
        engine.list_setting_groups(id, &pg)
    })
    .await
}

// ── Users ──────────────────────────────────────────────────────

/// POST /api/v1/users
pub async fn ensure_users(
    State(state): State<ApiState>,
    Json(req): Json<UsersRequest>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| {
        let created = engine.ensure_users(&req.users)?;
        Ok(serde_json::json!({ "created": created }))
    })
    .await
}

/// GET /api/v1/users/:uid/settings?module_id=&setting_id=&channel=&client=
pub async fn list_user_settings(
    State(state): State<ApiState>,
    Path(uid): Path<String>,
    Query(filter): Query<SettingFilter>,
    Query(pg): Query<Pagination>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| {
        engine.list_user_settings(&uid, &filter, &pg)
    })
    .await
}

/// POST /api/v1/users/:uid/settings/:id/rollback
pub async fn rollback_user(
    State(state): State<ApiState>,
    Path((uid, id)): Path<(String, u64)>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| {
        let changed = engine.rollback_user(&uid, id)?;
        Ok(serde_json::json!({ "changed": changed }))
    })
    .await
}

/// DELETE /api/v1/users/:uid/settings/:id
pub async fn remove_user_setting(
    State(state): State<ApiState>,
    Path((uid, id)): Path<(String, u64)>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| {
        let removed = engine.remove_user_setting(&uid, id)?;
        Ok(serde_json::json!({ "removed": removed }))
    })
    .await
}

// ── Groups ─────────────────────────────────────────────────────

/// POST /api/v1/groups
pub async fn create_group(
    State(state): State<ApiState>,
    Json(req): Json<CreateGroupRequest>,
) -> impl IntoResponse {
    respond(&state, StatusCode::CREATED, move |engine| {
        engine.create_group(&req.kind, &req.uid, &req.desc)
    })
    .await
}

/// GET /api/v1/groups/:uid/settings?module_id=&setting_id=&channel=&client=
pub async fn list_group_settings(
    State(state): State<ApiState>,
    Path(uid): Path<String>,
    Query(filter): Query<SettingFilter>,
    Query(pg): Query<Pagination>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| {
        engine.list_group_settings(&uid, &filter, &pg)
    })
    .await
}

/// POST /api/v1/groups/:uid/settings/:id/rollback
pub async fn rollback_group(
    State(state): State<ApiState>,
    Path((uid, id)): Path<(String, u64)>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| {
        let changed = engine.rollback_group(&uid, id)?;
        Ok(serde_json::json!({ "changed": changed }))
    })
    .await
}

/// DELETE /api/v1/groups/:uid/settings/:id
pub async fn remove_group_setting(
    State(state): State<ApiState>,
    Path((uid, id)): Path<(String, u64)>,
) -> impl IntoResponse {
    respond(&state, StatusCode::OK, move |engine| {
        let removed = engine.remove_group_setting(&uid, id)?;
        Ok(serde_json::json!({ "removed": removed }))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::to_bytes;
    use setgrid_core::config::{SettingsConfig, StatusConfig};
    use setgrid_rollout::StatusMaintainer;
    use setgrid_state::{StateError, StateStore};

    fn test_state(timeout: Duration) -> (ApiState, StatusMaintainer) {
        let store = StateStore::open_in_memory().unwrap();
        let maintainer = StatusMaintainer::spawn(store.clone(), &StatusConfig::default());
        let engine = RolloutEngine::new(store, SettingsConfig::default(), maintainer.handle());
        (ApiState { engine, timeout }, maintainer)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn error_kinds_map_to_status() {
        let cases = [
            (RolloutError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                RolloutError::Validation(setgrid_core::ValidationError::EmptyUpdate),
                StatusCode::BAD_REQUEST,
            ),
            (RolloutError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                RolloutError::Store(StateError::Write("disk".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(rollout_error_response(&err).status(), status);
        }
    }

    #[tokio::test]
    async fn deadline_expiry_is_gateway_timeout() {
        let (state, maintainer) = test_state(Duration::from_millis(10));
        let result = call(&state, |_| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        })
        .await;
        let resp = result.unwrap_err();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        maintainer.shutdown().await;
    }

    #[tokio::test]
    async fn create_module_then_get() {
        let (state, maintainer) = test_state(Duration::from_secs(5));
        let resp = create_module(
            State(state.clone()),
            Json(CreateModuleRequest {
                name: "app".into(),
                desc: "demo".into(),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = body_json(resp).await;
        let id = body["data"]["id"].as_u64().unwrap();

        let resp = get_module(State(state.clone()), Path(id)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = get_module(State(state), Path(id + 1)).await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        maintainer.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_setting_is_conflict() {
        let (state, maintainer) = test_state(Duration::from_secs(5));
        let module = state.engine.create_module("app", "").unwrap();
        let req = || CreateSettingRequest {
            name: "beta".into(),
            desc: String::new(),
        };

        let resp = create_setting(State(state.clone()), Path(module.id), Json(req()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let resp = create_setting(State(state), Path(module.id), Json(req()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        maintainer.shutdown().await;
    }

    #[tokio::test]
    async fn assign_returns_release_info() {
        let (state, maintainer) = test_state(Duration::from_secs(5));
        let module = state.engine.create_module("app", "").unwrap();
        let setting = state.engine.create_setting(module.id, "beta", "").unwrap();
        state.engine.ensure_users(&["u1".to_string()]).unwrap();

        let resp = assign(
            State(state.clone()),
            Path(setting.id),
            Json(AssignRequest {
                value: "on".into(),
                users: vec!["u1".into()],
                groups: vec![],
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["release"], 1);
        assert_eq!(body["data"]["users"][0], "u1");
        assert_eq!(body["data"]["groups"].as_array().unwrap().len(), 0);

        let resp = assign(
            State(state),
            Path(999),
            Json(AssignRequest {
                value: "on".into(),
                users: vec![],
                groups: vec![],
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        maintainer.shutdown().await;
    }

    #[tokio::test]
    async fn empty_update_is_bad_request() {
        let (state, maintainer) = test_state(Duration::from_secs(5));
        let module = state.engine.create_module("app", "").unwrap();
        let setting = state.engine.create_setting(module.id, "beta", "").unwrap();

        let resp = update_setting(State(state), Path(setting.id), Json(SettingUpdate::default()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        maintainer.shutdown().await;
    }
}
