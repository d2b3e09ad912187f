//! Tenant namespacing for task queue names.

use crate::constants::TENANT_QUEUE_SEPARATOR;

/// Resolve the queue a worker polls, prefixing the tenant id when one is set.
///
/// Blank tenant ids are treated as absent.
pub fn namespaced_queue(queue: &str, tenant_id: Option<&str>) -> String {
    match tenant_id.map(str::trim).filter(|tenant| !tenant.is_empty()) {
        Some(tenant) => format!("{tenant}{TENANT_QUEUE_SEPARATOR}{queue}"),
        None => queue.to_string(),
    }
}
