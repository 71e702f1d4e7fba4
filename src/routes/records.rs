//! Record routes. Paths carry the module id; handlers resolve the module per request.

use crate::handlers::records::{create, delete as delete_handler, filtered, grouped, list, read, update};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn record_routes(state: AppState) -> Router {
    Router::new()
        .route("/modules/:module_id/records", get(list).post(create))
        .route("/modules/:module_id/records/filter", get(filtered))
        .route("/modules/:module_id/records/grouped/:field", get(grouped))
        .route(
            "/modules/:module_id/records/:id",
            get(read).patch(update).delete(delete_handler),
        )
        .with_state(state)
}
