// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod groups;
pub mod identity;
pub mod verification;

pub use groups::{GroupDraft, GroupService, ListCache};
pub use identity::{auth_error_message, IdentityService};
pub use verification::{SignInStep, SmsSender, VerificationService};
