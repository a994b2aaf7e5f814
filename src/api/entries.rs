//! Id handling shared by every nested collection.

use crate::model::{generate_id, NEW_ID};
use crate::updater::ApiError;

/// An element of one of the ambulance's nested collections.
pub trait Entry: Clone {
    /// Human name used in error messages ("Room not found").
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Field checks for a newly submitted element.
    fn validate(&self) -> Result<(), ApiError>;

    /// Copy every non-empty, non-zero field of `patch` except the id.
    fn merge(&mut self, patch: Self);

    /// Cross-field checks on a patched element.
    fn validate_update(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

fn required<E: Entry>() -> ApiError {
    ApiError::validation(format!("{} ID is required", E::KIND))
}

fn missing<E: Entry>() -> ApiError {
    ApiError::not_found(format!("{} not found", E::KIND))
}

fn position<E: Entry>(collection: &[E], id: &str) -> Result<usize, ApiError> {
    if id.is_empty() {
        return Err(required::<E>());
    }
    collection
        .iter()
        .position(|e| e.id() == id)
        .ok_or_else(missing::<E>)
}

/// Validate and append `entry`, returning the id it was stored under.
pub fn insert<E: Entry>(collection: &mut Vec<E>, mut entry: E) -> Result<String, ApiError> {
    if entry.id().is_empty() {
        return Err(required::<E>());
    }
    entry.validate()?;
    if entry.id() == NEW_ID {
        entry.set_id(generate_id());
    }
    if collection.iter().any(|e| e.id() == entry.id()) {
        return Err(ApiError::conflict("Entry already exists"));
    }
    let id = entry.id().to_string();
    collection.push(entry);
    Ok(id)
}

pub fn lookup<'a, E: Entry>(collection: &'a [E], id: &str) -> Result<&'a E, ApiError> {
    position(collection, id).map(|i| &collection[i])
}

/// Apply a partial update, returning the element's id afterwards.
///
/// A non-empty patch id other than `@new` renames the element.
pub fn patch<E: Entry>(collection: &mut [E], id: &str, patch: E) -> Result<String, ApiError> {
    let index = position(collection, id)?;

    let rename = patch.id();
    if !rename.is_empty() && rename != NEW_ID && rename != id {
        if collection.iter().any(|e| e.id() == rename) {
            return Err(ApiError::conflict("Entry already exists"));
        }
        collection[index].set_id(rename.to_string());
    }

    let element = &mut collection[index];
    element.merge(patch);
    element.validate_update()?;
    Ok(element.id().to_string())
}

pub fn remove<E: Entry>(collection: &mut Vec<E>, id: &str) -> Result<E, ApiError> {
    position(collection, id).map(|i| collection.remove(i))
}

/// Overwrite `target` when `value` is non-empty.
pub fn overwrite(target: &mut String, value: String) {
    if !value.is_empty() {
        *target = value;
    }
}

/// Overwrite `target` when `value` is present and non-empty.
pub fn overwrite_opt(target: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        *target = Some(value);
    }
}
