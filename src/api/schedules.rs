use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;

use super::entries::{self, overwrite, overwrite_opt, Entry};
use super::AppState;
use crate::model::{Ambulance, Schedule};
use crate::updater::{ApiError, Mutation, Reply};

impl Entry for Schedule {
    const KIND: &'static str = "Schedule";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), ApiError> {
        if self.patient_id.is_empty() {
            return Err(ApiError::validation("Patient ID is required"));
        }
        // room_id is not checked against the ambulance's rooms
        if self.room_id.is_empty() {
            return Err(ApiError::validation("Room ID is required"));
        }
        if self.start == 0 {
            return Err(ApiError::validation("Schedule start date is required"));
        }
        self.validate_update()
    }

    fn merge(&mut self, patch: Self) {
        overwrite(&mut self.patient_id, patch.patient_id);
        overwrite(&mut self.room_id, patch.room_id);
        if patch.start != 0 {
            self.start = patch.start;
        }
        if let Some(end) = patch.end.filter(|e| *e != 0) {
            self.end = Some(end);
        }
        overwrite_opt(&mut self.note, patch.note);
    }

    fn validate_update(&self) -> Result<(), ApiError> {
        match self.end {
            Some(end) if end <= self.start => {
                Err(ApiError::validation("Schedule end must be after its start"))
            }
            _ => Ok(()),
        }
    }
}

// ── Mutations ───────────────────────────────────────────────────

pub fn list(ambulance: Ambulance) -> Result<Mutation<Vec<Schedule>>, ApiError> {
    Ok(Mutation::ReadOnly(Reply::ok(ambulance.schedules)))
}

pub fn get(ambulance: Ambulance, schedule_id: &str) -> Result<Mutation<Schedule>, ApiError> {
    let schedule = entries::lookup(&ambulance.schedules, schedule_id)?.clone();
    Ok(Mutation::ReadOnly(Reply::ok(schedule)))
}

pub fn create(mut ambulance: Ambulance, schedule: Schedule) -> Result<Mutation<Schedule>, ApiError> {
    let id = entries::insert(&mut ambulance.schedules, schedule)?;
    let stored = entries::lookup(&ambulance.schedules, &id)?.clone();
    Ok(Mutation::Persist(ambulance, Reply::ok(stored)))
}

pub fn update(
    mut ambulance: Ambulance,
    schedule_id: &str,
    patch: Schedule,
) -> Result<Mutation<Schedule>, ApiError> {
    let id = entries::patch(&mut ambulance.schedules, schedule_id, patch)?;
    let stored = entries::lookup(&ambulance.schedules, &id)?.clone();
    Ok(Mutation::Persist(ambulance, Reply::ok(stored)))
}

pub fn delete(mut ambulance: Ambulance, schedule_id: &str) -> Result<Mutation<()>, ApiError> {
    entries::remove(&mut ambulance.schedules, schedule_id)?;
    Ok(Mutation::Persist(ambulance, Reply::no_content()))
}

// ── Handlers ────────────────────────────────────────────────────

pub async fn list_schedules(
    State(state): State<AppState>,
    Path(ambulance_id): Path<String>,
) -> Result<Reply<Vec<Schedule>>, ApiError> {
    state.updater.run("list_schedules", &ambulance_id, list).await
}

pub async fn get_schedule(
    State(state): State<AppState>,
    Path((ambulance_id, schedule_id)): Path<(String, String)>,
) -> Result<Reply<Schedule>, ApiError> {
    state
        .updater
        .run("get_schedule", &ambulance_id, |ambulance| get(ambulance, &schedule_id))
        .await
}

pub async fn create_schedule(
    State(state): State<AppState>,
    Path(ambulance_id): Path<String>,
    body: Result<Json<Schedule>, JsonRejection>,
) -> Result<Reply<Schedule>, ApiError> {
    state
        .updater
        .run("create_schedule", &ambulance_id, move |ambulance| {
            let Json(schedule) = body.map_err(ApiError::invalid_body)?;
            create(ambulance, schedule)
        })
        .await
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Path((ambulance_id, schedule_id)): Path<(String, String)>,
    body: Result<Json<Schedule>, JsonRejection>,
) -> Result<Reply<Schedule>, ApiError> {
    state
        .updater
        .run("update_schedule", &ambulance_id, move |ambulance| {
            let Json(patch) = body.map_err(ApiError::invalid_body)?;
            update(ambulance, &schedule_id, patch)
        })
        .await
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    Path((ambulance_id, schedule_id)): Path<(String, String)>,
) -> Result<Reply<()>, ApiError> {
    state
        .updater
        .run("delete_schedule", &ambulance_id, |ambulance| delete(ambulance, &schedule_id))
        .await
}
