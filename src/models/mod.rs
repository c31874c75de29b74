// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod group;
pub mod user;

pub use group::{BibleStudyGroup, DayOfWeek, Leader, MeetingTime, Member};
pub use user::{AccountRecord, PublicProfile, RolePermissions, UserProfile, UserRole};
