//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    /// Private profiles (keyed by uid)
    pub const USERS: &str = "users";
    /// Display-name projections readable without authorization
    pub const PUBLIC_PROFILES: &str = "publicProfiles";
    /// Bible study group aggregates
    pub const GROUPS: &str = "biblestudygroups";
}
