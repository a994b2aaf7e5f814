use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;

use super::entries::{self, overwrite, overwrite_opt, Entry};
use super::AppState;
use crate::model::{Ambulance, Room};
use crate::updater::{ApiError, Mutation, Reply};

impl Entry for Room {
    const KIND: &'static str = "Room";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), ApiError> {
        if self.width.is_empty() {
            return Err(ApiError::validation("Room width is required"));
        }
        if self.height.is_empty() {
            return Err(ApiError::validation("Room height is required"));
        }
        if self.equipment.is_empty() {
            return Err(ApiError::validation("Room equipment is required"));
        }
        Ok(())
    }

    fn merge(&mut self, patch: Self) {
        overwrite(&mut self.width, patch.width);
        overwrite(&mut self.height, patch.height);
        overwrite(&mut self.equipment, patch.equipment);
        overwrite_opt(&mut self.reference, patch.reference);
        overwrite_opt(&mut self.name, patch.name);
        if let Some(cost) = patch.typical_cost_to_operate.filter(|c| *c != 0) {
            self.typical_cost_to_operate = Some(cost);
        }
    }
}

// ── Mutations ───────────────────────────────────────────────────

pub fn list(ambulance: Ambulance) -> Result<Mutation<Vec<Room>>, ApiError> {
    Ok(Mutation::ReadOnly(Reply::ok(ambulance.rooms)))
}

pub fn get(ambulance: Ambulance, room_id: &str) -> Result<Mutation<Room>, ApiError> {
    let room = entries::lookup(&ambulance.rooms, room_id)?.clone();
    Ok(Mutation::ReadOnly(Reply::ok(room)))
}

pub fn create(mut ambulance: Ambulance, room: Room) -> Result<Mutation<Room>, ApiError> {
    let id = entries::insert(&mut ambulance.rooms, room)?;
    let stored = entries::lookup(&ambulance.rooms, &id)?.clone();
    Ok(Mutation::Persist(ambulance, Reply::ok(stored)))
}

pub fn update(mut ambulance: Ambulance, room_id: &str, patch: Room) -> Result<Mutation<Room>, ApiError> {
    let id = entries::patch(&mut ambulance.rooms, room_id, patch)?;
    let stored = entries::lookup(&ambulance.rooms, &id)?.clone();
    Ok(Mutation::Persist(ambulance, Reply::ok(stored)))
}

pub fn delete(mut ambulance: Ambulance, room_id: &str) -> Result<Mutation<()>, ApiError> {
    entries::remove(&mut ambulance.rooms, room_id)?;
    Ok(Mutation::Persist(ambulance, Reply::no_content()))
}

// ── Handlers ────────────────────────────────────────────────────

pub async fn list_rooms(
    State(state): State<AppState>,
    Path(ambulance_id): Path<String>,
) -> Result<Reply<Vec<Room>>, ApiError> {
    state.updater.run("list_rooms", &ambulance_id, list).await
}

pub async fn get_room(
    State(state): State<AppState>,
    Path((ambulance_id, room_id)): Path<(String, String)>,
) -> Result<Reply<Room>, ApiError> {
    state
        .updater
        .run("get_room", &ambulance_id, |ambulance| get(ambulance, &room_id))
        .await
}

pub async fn create_room(
    State(state): State<AppState>,
    Path(ambulance_id): Path<String>,
    body: Result<Json<Room>, JsonRejection>,
) -> Result<Reply<Room>, ApiError> {
    state
        .updater
        .run("create_room", &ambulance_id, move |ambulance| {
            let Json(room) = body.map_err(ApiError::invalid_body)?;
            create(ambulance, room)
        })
        .await
}

pub async fn update_room(
    State(state): State<AppState>,
    Path((ambulance_id, room_id)): Path<(String, String)>,
    body: Result<Json<Room>, JsonRejection>,
) -> Result<Reply<Room>, ApiError> {
    state
        .updater
        .run("update_room", &ambulance_id, move |ambulance| {
            let Json(patch) = body.map_err(ApiError::invalid_body)?;
            update(ambulance, &room_id, patch)
        })
        .await
}

pub async fn delete_room(
    State(state): State<AppState>,
    Path((ambulance_id, room_id)): Path<(String, String)>,
) -> Result<Reply<()>, ApiError> {
    state
        .updater
        .run("delete_room", &ambulance_id, |ambulance| delete(ambulance, &room_id))
        .await
}
