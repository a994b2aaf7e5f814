//! HTTP surface: routes under `/api`, one handler per operation.

mod ambulances;
mod entries;
pub mod rooms;
pub mod schedules;
pub mod waiting_list;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::updater::AmbulanceUpdater;

#[derive(Clone)]
pub struct AppState {
    pub updater: Arc<AmbulanceUpdater>,
}

impl AppState {
    pub fn new(updater: AmbulanceUpdater) -> Self {
        Self {
            updater: Arc::new(updater),
        }
    }
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::PUT,
            Method::POST,
            Method::DELETE,
            Method::PATCH,
        ])
        .allow_headers([header::ORIGIN, header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(12 * 60 * 60))
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/ambulance", post(ambulances::create_ambulance))
        .route(
            "/ambulance/{ambulance_id}",
            axum::routing::delete(ambulances::delete_ambulance),
        )
        .route(
            "/waiting-list/{ambulance_id}/entries",
            get(waiting_list::list_entries).post(waiting_list::create_entry),
        )
        .route(
            "/waiting-list/{ambulance_id}/entries/{entry_id}",
            get(waiting_list::get_entry)
                .put(waiting_list::update_entry)
                .delete(waiting_list::delete_entry),
        )
        .route(
            "/waiting-list/{ambulance_id}/condition",
            get(waiting_list::list_conditions),
        )
        .route(
            "/rooms/{ambulance_id}/entries",
            get(rooms::list_rooms).post(rooms::create_room),
        )
        .route(
            "/rooms/{ambulance_id}/entries/{room_id}",
            get(rooms::get_room)
                .put(rooms::update_room)
                .delete(rooms::delete_room),
        )
        .route(
            "/schedules/{ambulance_id}/entries",
            get(schedules::list_schedules).post(schedules::create_schedule),
        )
        .route(
            "/schedules/{ambulance_id}/entries/{schedule_id}",
            get(schedules::get_schedule)
                .put(schedules::update_schedule)
                .delete(schedules::delete_schedule),
        );

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}
