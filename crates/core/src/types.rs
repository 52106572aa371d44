/// Record identifiers are opaque strings assigned by the hosted database.
pub type DbId = String;

/// Identity of an authenticated session, as issued by the auth service.
pub type UserId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
