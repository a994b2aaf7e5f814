//! Waiting-list endpoints.
//!
//! Unlike rooms and schedules the waiting list is ordered: every change
//! re-sorts it by arrival and recomputes estimated starts, so the mutations
//! here take the current time explicitly.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;

use super::entries::{self, overwrite, overwrite_opt, Entry};
use super::AppState;
use crate::model::{now_ms, Ambulance, Condition, Ms, WaitingListEntry};
use crate::updater::{ApiError, Mutation, Reply};

impl Entry for WaitingListEntry {
    const KIND: &'static str = "Entry";

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
        self.validate_update()
    }

    fn merge(&mut self, patch: Self) {
        overwrite_opt(&mut self.name, patch.name);
        overwrite(&mut self.patient_id, patch.patient_id);
        if patch.waiting_since != 0 {
            self.waiting_since = patch.waiting_since;
        }
        if patch.estimated_start != 0 {
            self.estimated_start = patch.estimated_start;
        }
        if patch.estimated_duration_minutes != 0 {
            self.estimated_duration_minutes = patch.estimated_duration_minutes;
        }
        if patch.condition.is_some() {
            self.condition = patch.condition;
        }
    }

    fn validate_update(&self) -> Result<(), ApiError> {
        if self.estimated_duration_minutes < 0 {
            return Err(ApiError::validation(
                "Estimated duration must not be negative",
            ));
        }
        Ok(())
    }
}

/// Replace a condition given only by code with its catalogue entry, and take
/// the typical duration when none was given.
fn resolve_condition(catalogue: &[Condition], entry: &mut WaitingListEntry) {
    if let Some(condition) = entry.condition.as_mut() {
        if condition.value.is_empty() {
            if let Some(known) = catalogue.iter().find(|c| c.code == condition.code) {
                *condition = known.clone();
            }
        }
        if entry.estimated_duration_minutes == 0 {
            entry.estimated_duration_minutes = condition.typical_duration_minutes;
        }
    }
}

fn ensure_unique_patient(waiting_list: &[WaitingListEntry], patient_id: &str) -> Result<(), ApiError> {
    if waiting_list.iter().filter(|e| e.patient_id == patient_id).count() > 1 {
        return Err(ApiError::conflict("Patient already exists in the waiting list"));
    }
    Ok(())
}

/// Reconcile and answer with the stored copy of `id`.
fn persist_entry(mut ambulance: Ambulance, id: &str, now: Ms) -> Result<Mutation<WaitingListEntry>, ApiError> {
    ambulance.reconcile_waiting_list(now);
    let stored = entries::lookup(&ambulance.waiting_list, id)?.clone();
    Ok(Mutation::Persist(ambulance, Reply::ok(stored)))
}

// ── Mutations ───────────────────────────────────────────────────

pub fn list(ambulance: Ambulance) -> Result<Mutation<Vec<WaitingListEntry>>, ApiError> {
    Ok(Mutation::ReadOnly(Reply::ok(ambulance.waiting_list)))
}

pub fn conditions(ambulance: Ambulance) -> Result<Mutation<Vec<Condition>>, ApiError> {
    Ok(Mutation::ReadOnly(Reply::ok(ambulance.predefined_conditions)))
}

pub fn get(ambulance: Ambulance, entry_id: &str) -> Result<Mutation<WaitingListEntry>, ApiError> {
    let entry = entries::lookup(&ambulance.waiting_list, entry_id)?.clone();
    Ok(Mutation::ReadOnly(Reply::ok(entry)))
}

pub fn create(
    mut ambulance: Ambulance,
    mut entry: WaitingListEntry,
    now: Ms,
) -> Result<Mutation<WaitingListEntry>, ApiError> {
    if entry.waiting_since == 0 {
        entry.waiting_since = now;
    }
    resolve_condition(&ambulance.predefined_conditions, &mut entry);
    let patient_id = entry.patient_id.clone();

    let id = entries::insert(&mut ambulance.waiting_list, entry)?;
    ensure_unique_patient(&ambulance.waiting_list, &patient_id)?;
    persist_entry(ambulance, &id, now)
}

pub fn update(
    mut ambulance: Ambulance,
    entry_id: &str,
    patch: WaitingListEntry,
    now: Ms,
) -> Result<Mutation<WaitingListEntry>, ApiError> {
    let id = entries::patch(&mut ambulance.waiting_list, entry_id, patch)?;

    let index = ambulance
        .waiting_list
        .iter()
        .position(|e| e.id == id)
        .ok_or_else(|| ApiError::internal("Failed to save entry"))?;
    resolve_condition(
        &ambulance.predefined_conditions,
        &mut ambulance.waiting_list[index],
    );

    let patient_id = ambulance.waiting_list[index].patient_id.clone();
    ensure_unique_patient(&ambulance.waiting_list, &patient_id)?;
    persist_entry(ambulance, &id, now)
}

pub fn delete(mut ambulance: Ambulance, entry_id: &str, now: Ms) -> Result<Mutation<()>, ApiError> {
    entries::remove(&mut ambulance.waiting_list, entry_id)?;
    ambulance.reconcile_waiting_list(now);
    Ok(Mutation::Persist(ambulance, Reply::no_content()))
}

// ── Handlers ────────────────────────────────────────────────────

pub async fn list_entries(
    State(state): State<AppState>,
    Path(ambulance_id): Path<String>,
) -> Result<Reply<Vec<WaitingListEntry>>, ApiError> {
    state.updater.run("list_waiting_list_entries", &ambulance_id, list).await
}

pub async fn list_conditions(
    State(state): State<AppState>,
    Path(ambulance_id): Path<String>,
) -> Result<Reply<Vec<Condition>>, ApiError> {
    state.updater.run("list_conditions", &ambulance_id, conditions).await
}

pub async fn get_entry(
    State(state): State<AppState>,
    Path((ambulance_id, entry_id)): Path<(String, String)>,
) -> Result<Reply<WaitingListEntry>, ApiError> {
    state
        .updater
        .run("get_waiting_list_entry", &ambulance_id, |ambulance| get(ambulance, &entry_id))
        .await
}

pub async fn create_entry(
    State(state): State<AppState>,
    Path(ambulance_id): Path<String>,
    body: Result<Json<WaitingListEntry>, JsonRejection>,
) -> Result<Reply<WaitingListEntry>, ApiError> {
    state
        .updater
        .run("create_waiting_list_entry", &ambulance_id, move |ambulance| {
            let Json(entry) = body.map_err(ApiError::invalid_body)?;
            create(ambulance, entry, now_ms())
        })
        .await
}

pub async fn update_entry(
    State(state): State<AppState>,
    Path((ambulance_id, entry_id)): Path<(String, String)>,
    body: Result<Json<WaitingListEntry>, JsonRejection>,
) -> Result<Reply<WaitingListEntry>, ApiError> {
    state
        .updater
        .run("update_waiting_list_entry", &ambulance_id, move |ambulance| {
            let Json(patch) = body.map_err(ApiError::invalid_body)?;
            update(ambulance, &entry_id, patch, now_ms())
        })
        .await
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Path((ambulance_id, entry_id)): Path<(String, String)>,
) -> Result<Reply<()>, ApiError> {
    state
        .updater
        .run("delete_waiting_list_entry", &ambulance_id, |ambulance| {
            delete(ambulance, &entry_id, now_ms())
        })
        .await
}
