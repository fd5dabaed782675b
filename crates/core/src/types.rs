/// Stable identifier for projects and every entity inside them.
pub type EntityId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh time-ordered id.
pub fn new_id() -> EntityId {
    uuid::Uuid::now_v7()
}
