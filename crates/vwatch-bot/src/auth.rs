//! Admin allow-list for command handling.

use std::collections::HashSet;

use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct AdminAllowList {
    ids: HashSet<u64>,
}

impl AdminAllowList {
    pub fn new(ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `sender` may run commands. Messages without a sender (channel
    /// posts) are never authorized.
    pub fn is_admin(&self, sender: Option<u64>) -> bool {
        match sender {
            Some(id) if self.ids.contains(&id) => true,
            other => {
                warn!(user_id = ?other, "rejecting command from non-admin user");
                false
            }
        }
    }
}
