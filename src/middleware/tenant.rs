use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Query},
    http::{header::HOST, request::Parts},
};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::services::tenant_resolver::TenantHint;

/// Effective hostname of a request, used as the tenant routing hint.
///
/// A `?domain=` query parameter beats the `Host` header so the flow can be
/// embedded in an iframe served from another origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantHost(pub Option<String>);

impl<S> FromRequestParts<S> for TenantHost
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(TenantHost(effective_host(parts)))
    }
}

impl TenantHost {
    /// An explicit tenant id wins; otherwise the effective host is used.
    pub fn into_hint(self, tenant_id: Option<Uuid>) -> Result<TenantHint, DispatchError> {
        match (tenant_id, self.0) {
            (Some(id), _) => Ok(TenantHint::Id(id)),
            (None, Some(host)) => Ok(TenantHint::Host(host)),
            (None, None) => Err(DispatchError::NoTenant),
        }
    }
}

fn effective_host(parts: &Parts) -> Option<String> {
    let from_query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(params)| params.get("domain").cloned())
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    from_query.or_else(|| {
        parts
            .headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.host().map(str::to_string))
    })
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(uri: &str, host: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri(uri);
        if let Some(h) = host {
            builder = builder.header(HOST, h);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn query_override_beats_host_header() {
        let p = parts("/notifications/quote_submitted?domain=acme.example.com", Some("widget.cdn.net"));
        assert_eq!(effective_host(&p).as_deref(), Some("acme.example.com"));
    }

    #[test]
    fn falls_back_to_host_header() {
        let p = parts("/tenant/info?domain=", Some("acme.example.com:8443"));
        assert_eq!(effective_host(&p).as_deref(), Some("acme.example.com:8443"));
        assert_eq!(effective_host(&parts("/tenant/info", None)), None);
    }

    #[test]
    fn explicit_tenant_id_wins() {
        let id = Uuid::new_v4();
        let host = TenantHost(Some("acme.example.com".into()));
        assert_eq!(host.clone().into_hint(Some(id)).unwrap(), TenantHint::Id(id));
        assert_eq!(
            host.into_hint(None).unwrap(),
            TenantHint::Host("acme.example.com".into())
        );
        assert!(TenantHost(None).into_hint(None).is_err());
    }
}
