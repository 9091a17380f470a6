//! Provider record to domain user projection

use sessionsync_common::AuthenticatedUser;
use sessionsync_identity::ProviderUser;

/// Project a provider identity record into the domain's user shape.
///
/// `None` in, `None` out. Absent optional fields stay absent and a missing
/// verification flag counts as unverified.
pub fn project_user(record: Option<&ProviderUser>) -> Option<AuthenticatedUser> {
    let record = record?;
    Some(AuthenticatedUser {
        uid: record.uid.clone(),
        display_name: record.display_name.clone(),
        email: record.email.clone(),
        email_verified: record.email_verified.unwrap_or(false),
    })
}
