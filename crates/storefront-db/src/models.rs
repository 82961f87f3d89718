/// Database row types. These map directly to SQLite rows.
/// Distinct from storefront-types models to keep the DB layer independent.

pub struct UserRow {
    pub display_name: Option<String>,
    pub email: Option<String>,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub receiver_id: String,
    /// JSON array of member ids, as written.
    pub participants: String,
    pub message: String,
    pub created_at: Option<String>,
    pub is_read: bool,
}
