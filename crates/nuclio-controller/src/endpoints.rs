// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Endpoint derivation.
//!
//! Computes the URLs a function can be reached at from the last observed
//! resource. The set is recomputed wholesale on every poll.

use nuclio_api::FunctionResource;
use serde::Serialize;
use url::Url;

/// Port functions listen on for invocations.
pub const INVOCATION_PORT: u16 = 8080;

/// Port of the function processor's internal health server.
pub const HEALTH_CHECK_PORT: u16 = 8082;

/// Path of the internal health route.
pub const HEALTH_PATH: &str = "/__internal/health";

/// Namespace assumed by the local platform when none is set.
const LOCAL_NAMESPACE: &str = "nuclio";

/// Derived URLs of one function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EndpointSet {
    /// `http://` + first internal invocation address.
    pub internal: Option<String>,
    /// `https://` + first external invocation address.
    pub external: Option<String>,
    /// In-cluster service DNS form.
    pub kubernetes: String,
    /// Local (docker) platform container-name form.
    pub docker: String,
    /// URL used for invocations: internal, else external, else the previous one.
    pub invocation: Option<String>,
    /// Health-check URL on the internal host.
    pub health_check: Option<String>,
}

impl EndpointSet {
    /// Derive endpoints from an observed resource.
    ///
    /// `fallback_name` and `fallback_namespace` stand in when the resource
    /// (or its metadata) is absent. `previous` keeps the last known invocation
    /// URL alive while the control plane reports none.
    pub fn derive(
        observed: Option<&FunctionResource>,
        fallback_name: &str,
        fallback_namespace: Option<&str>,
        previous: Option<&EndpointSet>,
    ) -> Self {
        let metadata = observed.map(|r| &r.metadata);
        let name = metadata
            .map(|m| m.name.as_str())
            .filter(|n| !n.is_empty())
            .unwrap_or(fallback_name);
        let namespace = metadata
            .and_then(|m| m.namespace.as_deref())
            .filter(|n| !n.is_empty())
            .or(fallback_namespace.filter(|n| !n.is_empty()));

        let status = observed.and_then(|r| r.status.as_ref());
        let internal = status
            .and_then(|s| s.internal_invocation_urls.first())
            .map(|u| format!("http://{}", u));
        let external = status
            .and_then(|s| s.external_invocation_urls.first())
            .map(|u| format!("https://{}", u));

        let kubernetes = match namespace {
            Some(ns) => format!(
                "http://{}.{}.svc.cluster.local:{}",
                name, ns, INVOCATION_PORT
            ),
            None => format!("http://{}.svc.cluster.local:{}", name, INVOCATION_PORT),
        };
        let docker = format!(
            "http://nuclio-{}-{}:{}",
            namespace.unwrap_or(LOCAL_NAMESPACE),
            name,
            INVOCATION_PORT
        );

        let invocation = internal
            .clone()
            .or_else(|| external.clone())
            .or_else(|| previous.and_then(|p| p.invocation.clone()));
        let health_check = internal.as_deref().and_then(health_check_url);

        Self {
            internal,
            external,
            kubernetes,
            docker,
            invocation,
            health_check,
        }
    }
}

/// Same host as `url`, health port and health path.
pub fn health_check_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.set_port(Some(HEALTH_CHECK_PORT)).ok()?;
    parsed.set_path(HEALTH_PATH);
    Some(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nuclio_api::{FunctionMetadata, FunctionStatus};

    fn resource(internal: &[&str], external: &[&str], namespace: Option<&str>) -> FunctionResource {
        FunctionResource {
            metadata: FunctionMetadata {
                name: "echo".into(),
                namespace: namespace.map(String::from),
                ..Default::default()
            },
            status: Some(FunctionStatus {
                state: Some("ready".into()),
                internal_invocation_urls: internal.iter().map(|s| s.to_string()).collect(),
                external_invocation_urls: external.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_internal_preferred() {
        let r = resource(
            &["echo.nuclio.svc.cluster.local:8080"],
            &["example.com/echo"],
            Some("nuclio"),
        );
        let set = EndpointSet::derive(Some(&r), "ignored", None, None);
        assert_eq!(
            set.invocation.as_deref(),
            Some("http://echo.nuclio.svc.cluster.local:8080")
        );
        assert_eq!(set.external.as_deref(), Some("https://example.com/echo"));
        assert_eq!(
            set.health_check.as_deref(),
            Some("http://echo.nuclio.svc.cluster.local:8082/__internal/health")
        );
        assert_eq!(set.kubernetes, "http://echo.nuclio.svc.cluster.local:8080");
        assert_eq!(set.docker, "http://nuclio-nuclio-echo:8080");
    }

    #[test]
    fn test_external_fallback() {
        let r = resource(&[], &["example.com:32001"], None);
        let set = EndpointSet::derive(Some(&r), "echo", None, None);
        assert_eq!(set.invocation.as_deref(), Some("https://example.com:32001"));
        assert!(set.health_check.is_none());
        assert_eq!(set.kubernetes, "http://echo.svc.cluster.local:8080");
    }

    #[test]
    fn test_previous_invocation_kept() {
        let previous = EndpointSet {
            invocation: Some("http://10.0.0.5:8080".into()),
            ..Default::default()
        };
        let r = resource(&[], &[], None);
        let set = EndpointSet::derive(Some(&r), "echo", Some("prod"), Some(&previous));
        assert_eq!(set.invocation.as_deref(), Some("http://10.0.0.5:8080"));
        assert_eq!(set.docker, "http://nuclio-prod-echo:8080");
    }

    #[test]
    fn test_no_resource_uses_fallbacks() {
        let set = EndpointSet::derive(None, "echo", None, None);
        assert!(set.invocation.is_none());
        assert_eq!(set.docker, "http://nuclio-nuclio-echo:8080");
    }

    #[test]
    fn test_health_url_replaces_port_and_path() {
        assert_eq!(
            health_check_url("http://localhost:32768/some/path").as_deref(),
            Some("http://localhost:8082/__internal/health")
        );
        assert_eq!(health_check_url("not a url"), None);
    }
}
