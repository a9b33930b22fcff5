//! Radio/location permission seam. Desktop platforms grant these implicitly;
//! the trait exists so a host that does gate radio access can slot its own
//! one-shot dialog flow in front of the scan guard.

use std::collections::HashMap;

use async_trait::async_trait;

pub const PERMISSION_RADIO: &str = "radio";
pub const PERMISSION_LOCATION: &str = "location";

#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Requests every permission scanning needs and reports each grant.
    async fn request_permissions(&self) -> HashMap<String, bool>;
}

/// Default provider for platforms without a permission dialog.
pub struct GrantAll;

#[async_trait]
impl PermissionProvider for GrantAll {
    async fn request_permissions(&self) -> HashMap<String, bool> {
        HashMap::from([
            (PERMISSION_RADIO.to_string(), true),
            (PERMISSION_LOCATION.to_string(), true),
        ])
    }
}

/// Returns true when every requested permission was granted.
pub fn all_granted(grants: &HashMap<String, bool>) -> bool {
    grants.values().all(|granted| *granted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grant_all_grants_everything() {
        let grants = GrantAll.request_permissions().await;
        assert!(all_granted(&grants));
        assert!(grants.contains_key(PERMISSION_RADIO));
    }

    #[test]
    fn a_single_denial_fails_the_check() {
        let grants = HashMap::from([
            (PERMISSION_RADIO.to_string(), true),
            (PERMISSION_LOCATION.to_string(), false),
        ]);
        assert!(!all_granted(&grants));
    }
}
