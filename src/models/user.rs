//! User roles, profiles and identity-provider account projections.

use serde::{Deserialize, Serialize};

/// Role claim asserted by the identity provider's signed token.
///
/// Never read from a client-writable document; the session JWT is the
/// only trust source inside this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Leader,
    #[default]
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Leader => "leader",
            UserRole::User => "user",
        }
    }

    /// Parse a role string; unknown values are rejected rather than
    /// defaulted so a typo in a privileged call cannot grant `user`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(UserRole::Admin),
            "leader" => Some(UserRole::Leader),
            "user" => Some(UserRole::User),
            _ => None,
        }
    }

    /// Permissions are a pure function of role.
    pub fn permissions(&self) -> RolePermissions {
        match self {
            UserRole::Admin => RolePermissions {
                can_create_groups: true,
                can_update_groups: true,
                can_delete_groups: true,
                can_manage_users: true,
            },
            UserRole::Leader => RolePermissions {
                can_create_groups: true,
                can_update_groups: true,
                can_delete_groups: true,
                can_manage_users: false,
            },
            UserRole::User => RolePermissions {
                can_create_groups: false,
                can_update_groups: false,
                can_delete_groups: false,
                can_manage_users: false,
            },
        }
    }
}

/// Effective grants for a role.
#[derive(Debug, Clone, Copy, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct RolePermissions {
    pub can_create_groups: bool,
    pub can_update_groups: bool,
    pub can_delete_groups: bool,
    pub can_manage_users: bool,
}

/// Private profile stored at `users/{uid}`.
///
/// Denormalized convenience data for display. Carries no role field;
/// roles live in token claims only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Identity provider uid (also the document ID)
    pub uid: String,
    /// Verified phone number (E.164), if signed up by phone
    pub phone_number: Option<String>,
    /// Email address, if signed up by email
    pub email: Option<String>,
    /// Full display name ("First Last")
    pub display_name: Option<String>,
    /// When the profile was created (RFC 3339)
    pub created_at: String,
    /// Last profile update (RFC 3339)
    pub updated_at: String,
}

/// Minimal projection stored at `publicProfiles/{uid}`.
///
/// Safe to read without authorization; used to resolve leader names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub uid: String,
    pub display_name: String,
}

/// Identity-provider account record merged with its role claim.
///
/// This is what the admin user table renders; it mirrors the provider's
/// view of the account, not the Firestore profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub uid: String,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: UserRole,
    pub created_at: Option<String>,
}
