use crate::models::settings::{
    AdminChannel, CrmChannel, CustomerChannel, NotificationSettings, ResolvedChannels,
};

/// Effective channels for one event.
///
/// Without a settings row every channel is enabled. The admin list is the explicit
/// per-event list when non-empty, otherwise the tenant's fallback address. Callers
/// check `AdminChannel::is_deliverable`, not just `enabled`.
pub fn resolve_channels(
    settings: Option<&NotificationSettings>,
    tenant_admin_email: Option<&str>,
) -> ResolvedChannels {
    let explicit: Vec<String> = settings
        .map(|s| {
            s.admin_emails
                .iter()
                .map(|e| e.trim())
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let emails = if explicit.is_empty() {
        tenant_admin_email
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(|e| vec![e.to_string()])
            .unwrap_or_default()
    } else {
        dedup_preserving_order(explicit)
    };

    ResolvedChannels {
        customer: CustomerChannel {
            enabled: settings.map_or(true, |s| s.customer_enabled),
        },
        admin: AdminChannel {
            enabled: settings.map_or(true, |s| s.admin_enabled),
            emails,
        },
        external_crm: CrmChannel {
            enabled: settings.map_or(true, |s| s.crm_enabled),
        },
    }
}

/// Case-insensitive dedup; the first spelling wins.
fn dedup_preserving_order(emails: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    emails
        .into_iter()
        .filter(|e| seen.insert(e.to_lowercase()))
        .collect()
}
