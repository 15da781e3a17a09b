use uuid::Uuid;

use crate::db::NotificationStore;
use crate::error::DispatchError;
use crate::models::tenant::TenantProfile;

/// How a caller identifies the tenant a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantHint {
    /// Explicit tenant id supplied by a trusted caller.
    Id(Uuid),
    /// Effective request hostname (query override or `Host` header).
    Host(String),
}

/// Hostnames that mean "local development, no tenant".
const LOCAL_HOSTS: [&str; 4] = ["localhost", "127.0.0.1", "0.0.0.0", "::1"];

/// Lowercase ASCII letters, digits and inner hyphens, 1 to 63 characters.
fn is_valid_label(s: &str) -> bool {
    let len = s.len();
    (1..=63).contains(&len)
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

/// Outcome of normalising a raw host value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingKey {
    /// Local development host; there is deliberately no tenant.
    Local,
    Key(String),
    Invalid,
}

/// Normalises a host value into the key tenants are stored under.
///
/// Accepts bare hosts, `host:port` and full origins (`https://host/path`).
/// Case, a trailing dot, the port and a leading `www.` are ignored.
pub fn routing_key(raw: &str) -> RoutingKey {
    let mut host = raw.trim().to_ascii_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = host.strip_prefix(scheme) {
            host = rest.to_string();
        }
    }
    if let Some(idx) = host.find(&['/', '?', '#'][..]) {
        host.truncate(idx);
    }

    if host == "[::1]" || host.starts_with("[::1]:") || LOCAL_HOSTS.contains(&host.as_str()) {
        return RoutingKey::Local;
    }
    if let Some((name, port)) = host.rsplit_once(':') {
        if port.chars().all(|c| c.is_ascii_digit()) {
            host = name.to_string();
        }
    }

    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);

    if LOCAL_HOSTS.contains(&host) {
        return RoutingKey::Local;
    }
    if host.is_empty() || !host.split('.').all(is_valid_label) {
        return RoutingKey::Invalid;
    }
    RoutingKey::Key(host.to_string())
}

pub struct TenantResolver;

impl TenantResolver {
    /// Single exact lookup by hint. `Ok(None)` means a local host with no tenant.
    ///
    /// Inactive tenants resolve exactly like unknown ones.
    pub async fn resolve(
        store: &dyn NotificationStore,
        hint: &TenantHint,
    ) -> Result<Option<TenantProfile>, DispatchError> {
        let (found, label) = match hint {
            TenantHint::Id(id) => (store.tenant_by_id(*id).await?, id.to_string()),
            TenantHint::Host(raw) => match routing_key(raw) {
                RoutingKey::Local => return Ok(None),
                RoutingKey::Invalid => return Err(DispatchError::TenantNotFound(raw.trim().to_string())),
                RoutingKey::Key(key) => (store.tenant_by_routing_key(&key).await?, key),
            },
        };

        match found {
            Some(tenant) if tenant.is_active => Ok(Some(tenant)),
            _ => Err(DispatchError::TenantNotFound(label)),
        }
    }

    /// Like `resolve`, but a local host is a `NoTenant` error.
    pub async fn require(
        store: &dyn NotificationStore,
        hint: &TenantHint,
    ) -> Result<TenantProfile, DispatchError> {
        Self::resolve(store, hint).await?.ok_or(DispatchError::NoTenant)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::MemoryStore;

    fn tenant(routing_key: &str, is_active: bool) -> TenantProfile {
        TenantProfile {
            id: Uuid::new_v4(),
            slug: "acme".into(),
            display_name: "Acme Heating".into(),
            routing_key: routing_key.into(),
            admin_email: None,
            relay_credentials: None,
            is_active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn routing_key_normalisation() {
        let key = |s: &str| RoutingKey::Key(s.to_string());
        assert_eq!(routing_key("Acme.Example.com"), key("acme.example.com"));
        assert_eq!(routing_key("acme.example.com:8443"), key("acme.example.com"));
        assert_eq!(routing_key("https://www.acme.co.uk/quote?x=1"), key("acme.co.uk"));
        assert_eq!(routing_key("boilers.acme.co.uk."), key("boilers.acme.co.uk"));
        assert_eq!(routing_key("localhost"), RoutingKey::Local);
        assert_eq!(routing_key("localhost:3000"), RoutingKey::Local);
        assert_eq!(routing_key("http://127.0.0.1:8080/"), RoutingKey::Local);
        assert_eq!(routing_key(""), RoutingKey::Invalid);
        assert_eq!(routing_key("acme_example.com"), RoutingKey::Invalid);
        assert_eq!(routing_key("-acme.com"), RoutingKey::Invalid);
    }

    #[tokio::test]
    async fn resolves_by_host_and_id() {
        let store = MemoryStore::new();
        let t = tenant("acme.example.com", true);
        let id = t.id;
        store.add_tenant(t).await;

        let by_host = TenantResolver::require(&store, &TenantHint::Host("ACME.example.com:443".into()))
            .await
            .unwrap();
        assert_eq!(by_host.id, id);

        let by_id = TenantResolver::require(&store, &TenantHint::Id(id)).await.unwrap();
        assert_eq!(by_id.routing_key, "acme.example.com");
    }

    #[tokio::test]
    async fn unknown_and_inactive_tenants_are_not_found() {
        let store = MemoryStore::new();
        store.add_tenant(tenant("closed.example.com", false)).await;

        for host in ["closed.example.com", "nobody.example.com"] {
            let err = TenantResolver::resolve(&store, &TenantHint::Host(host.into()))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "tenant_not_found");
            assert!(err.to_string().contains(host));
        }
    }

    #[tokio::test]
    async fn localhost_means_no_tenant() {
        let store = MemoryStore::new();
        let hint = TenantHint::Host("localhost:5173".into());
        assert!(TenantResolver::resolve(&store, &hint).await.unwrap().is_none());
        let err = TenantResolver::require(&store, &hint).await.unwrap_err();
        assert_eq!(err.kind(), "no_tenant");
    }
}
