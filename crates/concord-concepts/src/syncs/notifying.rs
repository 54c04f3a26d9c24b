use concord_core::SyncRule;

use super::route;
use crate::notifying::{GET_NOTIFICATIONS, MARK_READ};

pub fn syncs() -> Vec<SyncRule> {
    let mut syncs = Vec::new();
    syncs.extend(route(MARK_READ, &["notification"], &["notification"]));
    syncs.extend(route(GET_NOTIFICATIONS, &["recipient"], &["notifications"]));
    syncs
}
