use axum::{Router, middleware, routing::get};

use crate::middleware::{require_admin, require_admin_or_self, require_auth};
use crate::state::AppState;

use super::controller::{create_user, delete_user, get_user, list_users, update_user};

/// Every route needs a bearer token. Reading a single user is also open to
/// that user; everything else is admin only.
pub fn init_users_router(state: AppState) -> Router<AppState> {
    let admin = middleware::from_fn_with_state(state.clone(), require_admin);

    Router::new()
        .route(
            "/",
            get(list_users).post(create_user).route_layer(admin.clone()),
        )
        .route(
            "/{id}",
            get(get_user)
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    require_admin_or_self,
                ))
                .merge(
                    axum::routing::patch(update_user)
                        .delete(delete_user)
                        .route_layer(admin),
                ),
        )
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}
