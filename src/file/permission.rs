use tracing::{info, warn};

use super::handle::{AccessMode, FileHandle, PermissionState, UserGesture};

/// Outcome of verifying read access for a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    Denied,
}

/// Check, and if needed re-acquire, read permission for a handle.
///
/// Queries silently first and returns immediately when access is already
/// granted. Otherwise requests permission, which needs a user gesture; without
/// one the request is not attempted. Errors from either step count as denied.
pub async fn verify<H: FileHandle + ?Sized>(handle: &H, gesture: Option<&UserGesture>) -> Access {
    match handle.query_permission(AccessMode::Read).await {
        Ok(PermissionState::Granted) => return Access::Granted,
        Ok(_) => {}
        Err(e) => {
            warn!("Permission query failed: {}", e);
            return Access::Denied;
        }
    }

    let Some(gesture) = gesture else {
        info!("Permission prompt skipped: no user action in this call chain");
        return Access::Denied;
    };

    match handle.request_permission(AccessMode::Read, gesture).await {
        Ok(PermissionState::Granted) => Access::Granted,
        Ok(state) => {
            info!("Permission request answered with {:?}", state);
            Access::Denied
        }
        Err(e) => {
            warn!("Permission request failed: {}", e);
            Access::Denied
        }
    }
}
