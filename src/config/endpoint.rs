//! Per-region endpoint resolution.

use super::Environment;
use geo_core::{CatalogError, CatalogFile, Endpoint, RegionCatalog, RegionSpec};
use std::path::Path;
use tracing::{debug, info};

const LOCAL_HOST: &str = "localhost";

/// Environment variable prefix for a region: `us-east` becomes `US_EAST`.
pub fn endpoint_env_prefix(region_id: &str) -> String {
    region_id
        .chars()
        .map(|c| match c {
            '-' | '.' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// Resolve the endpoint of one region.
///
/// `<REGION>_HOST` / `<REGION>_PORT` win over the catalog's fixed endpoint.
/// In local mode anything still missing falls back to `localhost` and the
/// catalog's local port; in cloud mode it is a configuration error.
pub fn resolve_endpoint<F>(
    spec: &RegionSpec,
    environment: Environment,
    lookup: &F,
) -> Result<Endpoint, CatalogError>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = endpoint_env_prefix(&spec.id);
    let host_var = format!("{prefix}_HOST");
    let port_var = format!("{prefix}_PORT");

    let host = lookup(&host_var)
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .or_else(|| spec.endpoint.as_ref().map(|e| e.host.clone()));

    let port = match lookup(&port_var).map(|p| p.trim().to_string()) {
        Some(raw) if !raw.is_empty() => {
            Some(raw.parse::<u16>().map_err(|e| CatalogError::InvalidEndpoint {
                region: spec.id.clone(),
                reason: format!("{port_var}='{raw}': {e}"),
            })?)
        }
        _ => spec.endpoint.as_ref().map(|e| e.port),
    };

    let endpoint = match environment {
        Environment::Local => Endpoint::new(
            host.unwrap_or_else(|| LOCAL_HOST.to_string()),
            port.or(spec.local_port)
                .ok_or_else(|| CatalogError::MissingEndpoint(spec.id.clone()))?,
        ),
        Environment::Cloud => match (host, port) {
            (Some(host), Some(port)) => Endpoint::new(host, port),
            _ => {
                return Err(CatalogError::InvalidEndpoint {
                    region: spec.id.clone(),
                    reason: format!("{host_var} and {port_var} must both be set in cloud mode"),
                })
            }
        },
    };

    debug!("Region {} endpoint {}", spec.id, endpoint);
    Ok(endpoint)
}

/// Load the region geometry (from `regions_file` or the built-in layout)
/// and resolve every endpoint.
pub fn build_catalog<F>(
    regions_file: Option<&Path>,
    environment: Environment,
    lookup: F,
) -> Result<RegionCatalog, CatalogError>
where
    F: Fn(&str) -> Option<String>,
{
    let file = match regions_file {
        Some(path) => {
            info!("Loading region catalog from {}", path.display());
            CatalogFile::from_file(path)?
        }
        None => CatalogFile::default_layout(),
    };

    RegionCatalog::from_specs(file.regions, |spec| {
        resolve_endpoint(spec, environment, &lookup)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn us_east() -> RegionSpec {
        CatalogFile::default_layout()
            .regions
            .into_iter()
            .find(|r| r.id == "us-east")
            .unwrap()
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(endpoint_env_prefix("us-east"), "US_EAST");
        assert_eq!(endpoint_env_prefix("ap-south"), "AP_SOUTH");
    }

    #[test]
    fn test_local_defaults() {
        let endpoint = resolve_endpoint(&us_east(), Environment::Local, &lookup(&[])).unwrap();
        assert_eq!(endpoint, Endpoint::new("localhost", 26201));
    }

    #[test]
    fn test_env_overrides() {
        let vars = lookup(&[("US_EAST_HOST", "10.0.0.5"), ("US_EAST_PORT", "26257")]);
        let endpoint = resolve_endpoint(&us_east(), Environment::Local, &vars).unwrap();
        assert_eq!(endpoint, Endpoint::new("10.0.0.5", 26257));
    }

    #[test]
    fn test_invalid_port() {
        let vars = lookup(&[("US_EAST_PORT", "not-a-port")]);
        let err = resolve_endpoint(&us_east(), Environment::Local, &vars).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidEndpoint { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_cloud_requires_endpoint() {
        let err = resolve_endpoint(&us_east(), Environment::Cloud, &lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("US_EAST_HOST"));

        let vars = lookup(&[("US_EAST_HOST", "east.example.com")]);
        assert!(resolve_endpoint(&us_east(), Environment::Cloud, &vars).is_err());

        let vars = lookup(&[("US_EAST_HOST", "east.example.com"), ("US_EAST_PORT", "26257")]);
        assert_eq!(
            resolve_endpoint(&us_east(), Environment::Cloud, &vars).unwrap(),
            Endpoint::new("east.example.com", 26257)
        );
    }

    #[test]
    fn test_build_default_catalog() {
        let catalog = build_catalog(None, Environment::Local, lookup(&[])).unwrap();
        assert_eq!(catalog.ids(), vec!["us-east", "us-west", "eu-central", "ap-south"]);
        assert_eq!(catalog.resolve("ap-south").unwrap().endpoint.port, 26210);
    }

    #[test]
    fn test_build_catalog_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.yaml");
        std::fs::write(
            &path,
            "regions:\n  - id: north\n    name: North\n    bounds: { lat_min: 10.0, lat_max: 20.0, lon_min: 0.0, lon_max: 10.0 }\n    local_port: 26300\n",
        )
        .unwrap();

        let catalog = build_catalog(Some(&path), Environment::Local, lookup(&[])).unwrap();
        assert_eq!(catalog.ids(), vec!["north"]);
        assert_eq!(catalog.resolve("north").unwrap().endpoint.port, 26300);
    }
}
