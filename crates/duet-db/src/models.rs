/// Database row types — these map directly to SQLite rows.
/// Distinct from duet-types models so the storage layout can change freely.

/// One `messages` row with its `messages_metadata` columns left-joined in.
/// The metadata columns are all `None` for plaintext.
pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub message_type: String,
    pub content: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub length: Option<u32>,
    pub source: Option<String>,
}
