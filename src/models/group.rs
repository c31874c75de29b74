//! Bible study group aggregate: meeting times, leaders and members.

use serde::{Deserialize, Serialize};

/// Day of the week for a recurring meeting time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
            DayOfWeek::Sunday => "Sunday",
        }
    }
}

/// Recurring meeting time (day + 24-hour clock slot).
///
/// Minutes are quarter-hour slots only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingTime {
    pub day_of_week: DayOfWeek,
    /// 0-23
    pub hour: u8,
    /// 0, 15, 30 or 45
    pub minute: u8,
}

impl MeetingTime {
    /// Check the hour/minute ranges. The day is already constrained by
    /// the enum.
    pub fn is_valid(&self) -> bool {
        self.hour <= 23 && matches!(self.minute, 0 | 15 | 30 | 45)
    }

    /// Render for display, e.g. `"Monday at 7:00 PM"`.
    pub fn format(&self) -> String {
        let hour12 = match self.hour {
            0 => 12,
            h if h > 12 => h - 12,
            h => h,
        };
        let period = if self.hour >= 12 { "PM" } else { "AM" };
        format!(
            "{} at {}:{:02} {}",
            self.day_of_week.as_str(),
            hour12,
            self.minute,
            period
        )
    }
}

/// Leader snapshot embedded in a group document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leader {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Group membership entry. No history is kept after removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: String,
    /// When the user joined (RFC 3339)
    pub joined_at: String,
}

/// Group document stored at `biblestudygroups/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibleStudyGroup {
    /// Document ID (generated at creation)
    pub id: String,
    pub name: String,
    pub description: String,
    pub location: String,
    #[serde(default)]
    pub leaders: Vec<Leader>,
    #[serde(default)]
    pub meeting_times: Vec<MeetingTime>,
    #[serde(default)]
    pub members: Vec<Member>,
    pub created_at: String,
    pub updated_at: String,
}

impl BibleStudyGroup {
    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }

    /// Add a member if not already present.
    ///
    /// Membership is a set keyed by `user_id`; a repeated join must not
    /// produce a second entry. Returns `false` for the no-op case.
    pub fn add_member(&mut self, user_id: &str, joined_at: &str) -> bool {
        if self.has_member(user_id) {
            return false;
        }
        self.members.push(Member {
            user_id: user_id.to_string(),
            joined_at: joined_at.to_string(),
        });
        true
    }

    /// Remove a member by `user_id`. Idempotent: removing an absent
    /// member is a no-op and returns `false`.
    pub fn remove_member(&mut self, user_id: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.user_id != user_id);
        self.members.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_group() -> BibleStudyGroup {
        BibleStudyGroup {
            id: "g1".to_string(),
            name: "Tuesday Night".to_string(),
            description: "Weekly study".to_string(),
            location: "Room 2".to_string(),
            leaders: vec![],
            meeting_times: vec![MeetingTime {
                day_of_week: DayOfWeek::Tuesday,
                hour: 19,
                minute: 30,
            }],
            members: vec![],
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn format_evening_time() {
        let mt = MeetingTime {
            day_of_week: DayOfWeek::Monday,
            hour: 19,
            minute: 0,
        };
        assert_eq!(mt.format(), "Monday at 7:00 PM");
    }

    #[test]
    fn format_midnight_and_noon() {
        let midnight = MeetingTime {
            day_of_week: DayOfWeek::Sunday,
            hour: 0,
            minute: 15,
        };
        assert_eq!(midnight.format(), "Sunday at 12:15 AM");

        let noon = MeetingTime {
            day_of_week: DayOfWeek::Saturday,
            hour: 12,
            minute: 45,
        };
        assert_eq!(noon.format(), "Saturday at 12:45 PM");
    }

    #[test]
    fn meeting_time_validation() {
        let ok = MeetingTime {
            day_of_week: DayOfWeek::Friday,
            hour: 23,
            minute: 45,
        };
        assert!(ok.is_valid());

        let bad_hour = MeetingTime {
            day_of_week: DayOfWeek::Friday,
            hour: 24,
            minute: 0,
        };
        assert!(!bad_hour.is_valid());

        let bad_minute = MeetingTime {
            day_of_week: DayOfWeek::Friday,
            hour: 9,
            minute: 10,
        };
        assert!(!bad_minute.is_valid());
    }

    #[test]
    fn join_is_duplicate_free() {
        let mut group = make_group();

        assert!(group.add_member("u1", "2024-02-01T10:00:00Z"));
        assert!(!group.add_member("u1", "2024-02-02T10:00:00Z"));

        assert_eq!(group.members.len(), 1);
        assert_eq!(group.members[0].joined_at, "2024-02-01T10:00:00Z");
    }

    #[test]
    fn leave_is_idempotent() {
        let mut group = make_group();
        group.add_member("u1", "2024-02-01T10:00:00Z");
        group.add_member("u2", "2024-02-01T11:00:00Z");

        assert!(group.remove_member("u1"));
        let after_first = group.members.clone();

        assert!(!group.remove_member("u1"));
        assert_eq!(group.members, after_first);
        assert_eq!(group.members.len(), 1);
        assert_eq!(group.members[0].user_id, "u2");
    }

    #[test]
    fn meeting_time_serde_uses_camel_case() {
        let mt = MeetingTime {
            day_of_week: DayOfWeek::Wednesday,
            hour: 18,
            minute: 0,
        };
        let json = serde_json::to_value(&mt).unwrap();
        assert_eq!(json["dayOfWeek"], "Wednesday");
        assert_eq!(json["hour"], 18);
    }
}
