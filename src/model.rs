use serde::{Deserialize, Serialize};

/// Unix milliseconds, the only time type. Zero means "unset".
pub type Ms = i64;

const MINUTE: Ms = 60_000;

/// Id value that asks the server to allocate a fresh id.
pub const NEW_ID: &str = "@new";

/// Allocate a globally unique element id.
pub fn generate_id() -> String {
    ulid::Ulid::new().to_string()
}

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or_default()
}

/// The aggregate document. Every nested record lives and dies inside it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ambulance {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room_number: String,
    #[serde(default)]
    pub waiting_list: Vec<WaitingListEntry>,
    #[serde(default)]
    pub predefined_conditions: Vec<Condition>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
}

/// Dimensions and equipment of an ambulance room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub width: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub height: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub equipment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Sent as `tipicalCostToOperate`, the spelling existing clients read.
    #[serde(
        default,
        rename = "tipicalCostToOperate",
        alias = "typicalCostToOperate",
        skip_serializing_if = "Option::is_none"
    )]
    pub typical_cost_to_operate: Option<i32>,
}

/// A patient booked into a room. `room_id` is not checked against `rooms`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub patient_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room_id: String,
    #[serde(default)]
    pub start: Ms,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Ms>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingListEntry {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub patient_id: String,
    #[serde(default)]
    pub waiting_since: Ms,
    #[serde(default)]
    pub estimated_start: Ms,
    #[serde(default)]
    pub estimated_duration_minutes: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl WaitingListEntry {
    fn estimated_end(&self) -> Ms {
        let duration = Ms::from(self.estimated_duration_minutes.max(0)).saturating_mul(MINUTE);
        self.estimated_start.saturating_add(duration)
    }
}

/// Reason for a visit, either free-form or taken from the predefined catalogue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default)]
    pub typical_duration_minutes: i32,
}

impl Ambulance {
    /// Sort the waiting list by arrival and recompute estimated starts.
    ///
    /// The head of the queue starts no earlier than its arrival and no earlier
    /// than `now`. Every following patient starts no earlier than the previous
    /// patient's estimated end and no earlier than their own arrival.
    pub fn reconcile_waiting_list(&mut self, now: Ms) {
        self.waiting_list.sort_by_key(|e| e.waiting_since);

        let mut next_start: Option<Ms> = None;
        for entry in &mut self.waiting_list {
            let floor = match next_start {
                None => now,
                Some(prev_end) => prev_end,
            };
            entry.estimated_start = entry.estimated_start.max(floor).max(entry.waiting_since);
            next_start = Some(entry.estimated_end());
        }
    }

    /// Look up a predefined condition by its code.
    pub fn predefined_condition(&self, code: &str) -> Option<&Condition> {
        self.predefined_conditions.iter().find(|c| c.code == code)
    }
}
