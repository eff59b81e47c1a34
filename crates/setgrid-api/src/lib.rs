//! setgrid-api — REST API for SetGrid.
//!
//! Thin axum layer over [`RolloutEngine`]. Engine calls are blocking redb
//! transactions, so every handler runs its call on the blocking pool under
//! the configured request deadline.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/statistics` | Global counters |
//! | POST | `/api/v1/modules` | Create a module |
//! | GET | `/api/v1/modules/{id}` | Get a module |
//! | GET | `/api/v1/modules/{id}/settings` | List a module's settings |
//! | POST | `/api/v1/modules/{id}/settings` | Create a setting |
//! | GET | `/api/v1/modules/{id}/settings/{name}` | Get a live setting by name |
//! | POST | `/api/v1/modules/{id}/settings/{name}/offline` | Retire a setting |
//! | GET | `/api/v1/settings/{id}` | Get a setting, offline included |
//! | PATCH | `/api/v1/settings/{id}` | Partial update |
//! | DELETE | `/api/v1/settings/{id}` | Hard delete |
//! | POST | `/api/v1/settings/{id}/assign` | Assign a value under a new release |
//! | POST | `/api/v1/settings/{id}/recall` | Recall one release |
//! | POST | `/api/v1/settings/{id}/releases` | Allocate a release |
//! | GET/POST | `/api/v1/settings/{id}/rules` | List / create rollout rules |
//! | GET | `/api/v1/settings/{id}/users` | Users holding the setting |
//! | GET | `/api/v1/settings/{id}/groups` | Groups holding the setting |
//! | POST | `/api/v1/users` | Register users |
//! | GET | `/api/v1/users/{uid}/settings` | A user's settings |
//! | DELETE | `/api/v1/users/{uid}/settings/{id}` | Remove one user assignment |
//! | POST | `/api/v1/users/{uid}/settings/{id}/rollback` | Roll one user back |
//! | POST | `/api/v1/groups` | Create a group |
//! | GET | `/api/v1/groups/{uid}/settings` | A group's settings |
//! | DELETE | `/api/v1/groups/{uid}/settings/{id}` | Remove one group assignment |
//! | POST | `/api/v1/groups/{uid}/settings/{id}/rollback` | Roll one group back |

pub mod handlers;

use std::time::Duration;

use axum::Router;
use axum::routing::{delete, get, post};
use setgrid_rollout::RolloutEngine;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: RolloutEngine,
    /// Deadline for the engine call behind each request.
    pub timeout: Duration,
}

/// Build the complete API router.
pub fn build_router(engine: RolloutEngine, timeout: Duration) -> Router {
    let state = ApiState { engine, timeout };

    let api_routes = Router::new()
        .route("/statistics", get(handlers::statistics))
        .route("/modules", post(handlers::create_module))
        .route("/modules/{id}", get(handlers::get_module))
        .route(
            "/modules/{id}/settings",
            get(handlers::list_settings).post(handlers::create_setting),
        )
        .route("/modules/{id}/settings/{name}", get(handlers::get_active_setting))
        .route("/modules/{id}/settings/{name}/offline", post(handlers::offline_setting))
        .route(
            "/settings/{id}",
            get(handlers::get_setting)
                .patch(handlers::update_setting)
                .delete(handlers::delete_setting),
        )
        .route("/settings/{id}/assign", post(handlers::assign))
        .route("/settings/{id}/recall", post(handlers::recall))
        .route("/settings/{id}/releases", post(handlers::acquire_release))
        .route(
            "/settings/{id}/rules",
            get(handlers::list_rules).post(handlers::create_rule),
        )
        .route("/settings/{id}/users", get(handlers::list_setting_users))
        .route("/settings/{id}/groups", get(handlers::list_setting_groups))
        .route("/users", post(handlers::ensure_users))
        .route("/users/{uid}/settings", get(handlers::list_user_settings))
        .route(
            "/users/{uid}/settings/{id}",
            delete(handlers::remove_user_setting),
        )
        .route("/users/{uid}/settings/{id}/rollback", post(handlers::rollback_user))
        .route("/groups", post(handlers::create_group))
        .route("/groups/{uid}/settings", get(handlers::list_group_settings))
        .route(
            "/groups/{uid}/settings/{id}",
            delete(handlers::remove_group_setting),
        )
        .route("/groups/{uid}/settings/{id}/rollback", post(handlers::rollback_group))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
