pub mod api;
pub mod events;
pub mod models;

/// New record id: a time-ordered UUIDv7, so ids sort by creation time
/// and never collide between two records created in the same millisecond.
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
