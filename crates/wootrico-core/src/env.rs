//! Environment parsing helpers
//!
//! Tenants are configured through indexed environment variables
//! (`CHATWOOT_API_TOKEN_3`); the unnamed default tenant reads the bare names.

/// Parse a permissive boolean: `1/true/yes/on` and `0/false/no/off`,
/// case-insensitively. Anything else falls back to `default`.
#[must_use]
pub fn parse_bool(raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Read a boolean environment variable with a fallback
#[must_use]
pub fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| parse_bool(&v, default))
        .unwrap_or(default)
}

/// The tenant id used when no indexed tenants are configured
pub const DEFAULT_TENANT_ID: &str = "default";

/// Variable name for a tenant: `BASE_<id>`, or the bare base name for the
/// default tenant
#[must_use]
pub fn var_name(base: &str, tenant_id: &str) -> String {
    if tenant_id == DEFAULT_TENANT_ID {
        base.to_string()
    } else {
        format!("{base}_{tenant_id}")
    }
}
