//! Tenant registry
//!
//! Tenants ("integrations") are discovered by scanning the environment for
//! recognized variable names carrying a `_<n>` suffix, plus an optional
//! explicit `INTEGRATIONS` list. Each tenant binds one helpdesk account and
//! exactly one gateway dialect; load is tolerant of individual failures and
//! only fails fatally when no tenant loads at all.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tracing::{error, info, warn};
use wootrico_channels::util::digits_only;
use wootrico_channels::{
    uazapi::UazapiConfig, wuzapi::WuzapiConfig, zapi::ZapiConfig, GatewayClient, UazapiClient,
    WuzapiClient, ZapiClient,
};
use wootrico_core::env::{parse_bool, var_name, DEFAULT_TENANT_ID};
use wootrico_core::PayloadOrigin;
use wootrico_helpdesk::{ConversationStatus, HelpdeskClient, HelpdeskConfig};

use super::config::AppConfig;

/// Variable bases that mark a `_<n>` suffix as a tenant id
const RECOGNIZED_BASES: &[&str] = &[
    "CHATWOOT_BASE_URL",
    "CHATWOOT_API_TOKEN",
    "CHATWOOT_ACCOUNT_ID",
    "CHATWOOT_INBOX_NAME",
    "UAZAPI_BASE_URL",
    "UAZAPI_TOKEN",
    "UAZAPI_NUMBER",
    "ZAPI_INSTANCE",
    "ZAPI_TOKEN",
    "ZAPI_CLIENT_TOKEN",
    "WUZAPI_BASE_URL",
    "WUZAPI_TOKEN",
    "DEFAULT_COUNTRY",
    "IGNORE_GROUPS",
    "SIGN_AGENT_MESSAGES",
    "REOPEN_CONVERSATION",
    "CONVERSATION_STATUS",
];

/// One loaded tenant with its two bound clients
pub struct Tenant {
    /// Stable tenant id
    pub id: String,
    /// ISO alpha-2 country for phone normalization
    pub default_country: String,
    /// Drop group messages instead of bridging them
    pub ignore_groups: bool,
    /// Prefix agent names to outbound messages
    pub sign_agent_messages: bool,
    /// Gateway dialect this tenant speaks
    pub dialect: PayloadOrigin,
    /// Dialect-specific identity used for event routing
    pub provider_identifier: String,
    /// Helpdesk inbox the tenant is bound to
    pub inbox_id: i64,
    /// Helpdesk client
    pub helpdesk: Arc<HelpdeskClient>,
    /// Gateway client
    pub provider: Arc<dyn GatewayClient>,
}

/// All loaded tenants with lookup indexes
pub struct TenantRegistry {
    tenants: Vec<Arc<Tenant>>,
}

/// Discover tenant ids from environment pairs plus an explicit list
///
/// Ids are sorted numerically and deduplicated. An empty result means the
/// caller should synthesize the unnamed default tenant.
fn discover_tenant_ids(vars: &HashMap<String, String>, explicit: Option<&str>) -> Vec<String> {
    let mut ids: BTreeSet<u64> = BTreeSet::new();

    for name in vars.keys() {
        for base in RECOGNIZED_BASES {
            let Some(suffix) = name.strip_prefix(base).and_then(|s| s.strip_prefix('_')) else {
                continue;
            };
            if let Ok(id) = suffix.parse::<u64>() {
                ids.insert(id);
            }
        }
    }

    if let Some(list) = explicit {
        for part in list.split(',') {
            if let Ok(id) = part.trim().parse::<u64>() {
                ids.insert(id);
            }
        }
    }

    ids.into_iter().map(|id| id.to_string()).collect()
}

/// Tenant-scoped view over an environment snapshot
struct EnvView<'a> {
    vars: &'a HashMap<String, String>,
    tenant_id: &'a str,
}

impl EnvView<'_> {
    fn get(&self, base: &str) -> Option<String> {
        self.vars
            .get(&var_name(base, self.tenant_id))
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }

    fn require(&self, base: &str) -> Result<String> {
        self.get(base)
            .ok_or_else(|| anyhow!("{} is not set", var_name(base, self.tenant_id)))
    }

    fn bool(&self, base: &str, default: bool) -> bool {
        self.get(base)
            .map(|v| parse_bool(&v, default))
            .unwrap_or(default)
    }
}

/// The gateway binding a tenant's environment resolves to
enum GatewayRecipe {
    Uazapi(UazapiConfig),
    Zapi(ZapiConfig),
    Wuzapi(WuzapiConfig),
}

/// Try the three gateway recipes in order and take the first complete one
fn gateway_recipe(view: &EnvView<'_>) -> Result<GatewayRecipe> {
    if let (Some(base_url), Some(token), Some(number)) = (
        view.get("UAZAPI_BASE_URL"),
        view.get("UAZAPI_TOKEN"),
        view.get("UAZAPI_NUMBER"),
    ) {
        return Ok(GatewayRecipe::Uazapi(UazapiConfig::new(
            base_url, token, number,
        )));
    }
    if let (Some(instance), Some(token), Some(client_token)) = (
        view.get("ZAPI_INSTANCE"),
        view.get("ZAPI_TOKEN"),
        view.get("ZAPI_CLIENT_TOKEN"),
    ) {
        return Ok(GatewayRecipe::Zapi(ZapiConfig::new(
            instance,
            token,
            client_token,
        )));
    }
    if let (Some(base_url), Some(token)) =
        (view.get("WUZAPI_BASE_URL"), view.get("WUZAPI_TOKEN"))
    {
        return Ok(GatewayRecipe::Wuzapi(WuzapiConfig::new(base_url, token)));
    }
    bail!("no gateway credentials configured for tenant {}", view.tenant_id)
}

/// Build a tenant's helpdesk configuration; all four bindings are required
fn helpdesk_config_for(view: &EnvView<'_>, app: &AppConfig) -> Result<HelpdeskConfig> {
    let base_url = view.require("CHATWOOT_BASE_URL")?;
    let api_token = view.require("CHATWOOT_API_TOKEN")?;
    let account_id = view.require("CHATWOOT_ACCOUNT_ID")?;
    let inbox_name = view.require("CHATWOOT_INBOX_NAME")?;

    let sidecar_path = PathBuf::from(&app.data_dir)
        .join(format!("app-data-{account_id}-{inbox_name}.json"));
    let initial_status = view
        .get("CONVERSATION_STATUS")
        .map(|raw| ConversationStatus::parse_or_open(&raw))
        .unwrap_or(ConversationStatus::Open);

    Ok(
        HelpdeskConfig::new(base_url, api_token, account_id, inbox_name)
            .with_sidecar_path(sidecar_path)
            .with_reopen_resolved(view.bool("REOPEN_CONVERSATION", true))
            .with_initial_status(initial_status)
            .with_webhook_url(app.callback_url()),
    )
}

async fn load_tenant(
    vars: &HashMap<String, String>,
    tenant_id: &str,
    app: &AppConfig,
) -> Result<Arc<Tenant>> {
    let view = EnvView { vars, tenant_id };

    let helpdesk_config = helpdesk_config_for(&view, app)?;
    let mut helpdesk = HelpdeskClient::new(helpdesk_config)?;

    let (dialect, provider_identifier, provider): (PayloadOrigin, String, Arc<dyn GatewayClient>) =
        match gateway_recipe(&view)? {
            GatewayRecipe::Uazapi(config) => {
                let client = Arc::new(UazapiClient::new(config)?);
                // UAZAPI media lives behind a separate download endpoint.
                helpdesk.set_media_downloader(client.clone());
                (PayloadOrigin::Uazapi, client.connected_number(), client)
            }
            GatewayRecipe::Zapi(config) => {
                let client = Arc::new(ZapiClient::new(config)?);
                (PayloadOrigin::Zapi, client.instance().to_string(), client)
            }
            GatewayRecipe::Wuzapi(config) => {
                let client = Arc::new(WuzapiClient::new(config)?);
                (PayloadOrigin::Wuzapi, client.base_url().to_string(), client)
            }
        };

    let helpdesk = Arc::new(helpdesk);
    let inbox_id = helpdesk.ensure_inbox().await?;

    Ok(Arc::new(Tenant {
        id: tenant_id.to_string(),
        default_country: view.get("DEFAULT_COUNTRY").unwrap_or_else(|| "BR".to_string()),
        ignore_groups: view.bool("IGNORE_GROUPS", false),
        sign_agent_messages: view.bool("SIGN_AGENT_MESSAGES", false),
        dialect,
        provider_identifier,
        inbox_id,
        helpdesk,
        provider,
    }))
}

impl TenantRegistry {
    /// Load every configured tenant from the environment
    ///
    /// Individual tenant failures are logged and skipped; the registry only
    /// fails when not a single tenant loads.
    pub async fn load(app: &AppConfig) -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let explicit = vars.get("INTEGRATIONS").map(String::as_str);

        let mut ids = discover_tenant_ids(&vars, explicit);
        if ids.is_empty() {
            ids.push(DEFAULT_TENANT_ID.to_string());
        }

        let mut tenants = Vec::new();
        let mut failures = Vec::new();
        for id in &ids {
            match load_tenant(&vars, id, app).await {
                Ok(tenant) => {
                    info!(
                        tenant = %tenant.id,
                        dialect = %tenant.dialect,
                        inbox = %tenant.helpdesk.inbox_name(),
                        inbox_id = tenant.inbox_id,
                        "tenant loaded"
                    );
                    tenants.push(tenant);
                }
                Err(e) => {
                    error!(tenant = %id, error = %e, "tenant failed to load");
                    failures.push(format!("{id}: {e}"));
                }
            }
        }

        if tenants.is_empty() {
            bail!("no tenant loaded successfully: [{}]", failures.join("; "));
        }
        if !failures.is_empty() {
            warn!(failed = failures.len(), loaded = tenants.len(), "partial tenant load");
        }
        Ok(Self { tenants })
    }

    /// All loaded tenants
    #[must_use]
    pub fn tenants(&self) -> &[Arc<Tenant>] {
        &self.tenants
    }

    /// The sole tenant, when exactly one is configured
    #[must_use]
    pub fn single(&self) -> Option<&Arc<Tenant>> {
        (self.tenants.len() == 1).then(|| &self.tenants[0])
    }

    /// The first tenant, used as a last-resort fallback
    #[must_use]
    pub fn first(&self) -> Option<&Arc<Tenant>> {
        self.tenants.first()
    }

    /// Lookup by exact tenant id
    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<&Arc<Tenant>> {
        self.tenants.iter().find(|t| t.id == id)
    }

    /// Lookup by helpdesk inbox id
    #[must_use]
    pub fn by_inbox_id(&self, inbox_id: i64) -> Option<&Arc<Tenant>> {
        self.tenants.iter().find(|t| t.inbox_id == inbox_id)
    }

    /// Tenants speaking one dialect
    #[must_use]
    pub fn of_dialect(&self, dialect: PayloadOrigin) -> Vec<&Arc<Tenant>> {
        self.tenants.iter().filter(|t| t.dialect == dialect).collect()
    }

    /// Lookup by the dialect-specific identity carried on the wire
    ///
    /// UAZAPI matches the normalized digits of the connected number, Z-API
    /// the instance id, Wuzapi the base URL case-insensitively.
    #[must_use]
    pub fn by_provider_identifier(
        &self,
        dialect: PayloadOrigin,
        identifier: &str,
    ) -> Option<&Arc<Tenant>> {
        self.tenants.iter().find(|t| {
            if t.dialect != dialect {
                return false;
            }
            match dialect {
                PayloadOrigin::Uazapi => t.provider_identifier == digits_only(identifier),
                PayloadOrigin::Zapi => t.provider_identifier == identifier,
                PayloadOrigin::Wuzapi => t.provider_identifier.eq_ignore_ascii_case(identifier),
                PayloadOrigin::Unknown => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_discovery_from_suffixed_variable() {
        let vars = vars(&[("CHATWOOT_ACCOUNT_ID_3", "2")]);
        assert_eq!(discover_tenant_ids(&vars, None), vec!["3".to_string()]);
    }

    #[test]
    fn test_discovery_merges_explicit_list() {
        let vars = vars(&[("UAZAPI_TOKEN_7", "tok")]);
        assert_eq!(
            discover_tenant_ids(&vars, Some("1,2,7")),
            vec!["1".to_string(), "2".to_string(), "7".to_string()]
        );
    }

    #[test]
    fn test_discovery_sorts_numerically() {
        let vars = vars(&[
            ("CHATWOOT_ACCOUNT_ID_10", "a"),
            ("CHATWOOT_ACCOUNT_ID_2", "b"),
        ]);
        assert_eq!(
            discover_tenant_ids(&vars, None),
            vec!["2".to_string(), "10".to_string()]
        );
    }

    #[test]
    fn test_discovery_ignores_unrelated_variables() {
        let vars = vars(&[("PATH_2", "x"), ("CHATWOOT_ACCOUNT_ID_EXTRA", "y")]);
        assert!(discover_tenant_ids(&vars, None).is_empty());
    }

    #[test]
    fn test_provider_recipe_order_prefers_uazapi() {
        let vars = vars(&[
            ("UAZAPI_BASE_URL", "https://ua.example"),
            ("UAZAPI_TOKEN", "t"),
            ("UAZAPI_NUMBER", "5511988887777"),
            ("ZAPI_INSTANCE", "inst"),
            ("ZAPI_TOKEN", "t"),
            ("ZAPI_CLIENT_TOKEN", "ct"),
        ]);
        let view = EnvView {
            vars: &vars,
            tenant_id: DEFAULT_TENANT_ID,
        };
        assert!(matches!(
            gateway_recipe(&view).unwrap(),
            GatewayRecipe::Uazapi(_)
        ));
    }

    #[test]
    fn test_provider_recipe_requires_all_keys() {
        // An incomplete Z-API recipe falls through to Wuzapi.
        let vars = vars(&[
            ("ZAPI_INSTANCE", "inst"),
            ("ZAPI_TOKEN", "t"),
            ("WUZAPI_BASE_URL", "https://wu.example"),
            ("WUZAPI_TOKEN", "t"),
        ]);
        let view = EnvView {
            vars: &vars,
            tenant_id: DEFAULT_TENANT_ID,
        };
        assert!(matches!(
            gateway_recipe(&view).unwrap(),
            GatewayRecipe::Wuzapi(_)
        ));
    }

    #[test]
    fn test_provider_recipe_fails_when_empty() {
        let vars = vars(&[]);
        let view = EnvView {
            vars: &vars,
            tenant_id: "4",
        };
        assert!(gateway_recipe(&view).is_err());
    }

    #[test]
    fn test_helpdesk_config_for_requires_all_bindings() {
        let app = AppConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            nats_url: "nats://127.0.0.1:4222".to_string(),
            webhook_name: "webhook".to_string(),
            webhook_base_url: "https://bridge.example".to_string(),
            data_dir: "/app/data".to_string(),
        };
        let incomplete = vars(&[
            ("CHATWOOT_BASE_URL_2", "https://woot.example"),
            ("CHATWOOT_API_TOKEN_2", "tok"),
            ("CHATWOOT_ACCOUNT_ID_2", "9"),
        ]);
        let view = EnvView {
            vars: &incomplete,
            tenant_id: "2",
        };
        let err = helpdesk_config_for(&view, &app).unwrap_err();
        assert!(err.to_string().contains("CHATWOOT_INBOX_NAME_2"));

        let complete = vars(&[
            ("CHATWOOT_BASE_URL_2", "https://woot.example"),
            ("CHATWOOT_API_TOKEN_2", "tok"),
            ("CHATWOOT_ACCOUNT_ID_2", "9"),
            ("CHATWOOT_INBOX_NAME_2", "Atendimento"),
        ]);
        let view = EnvView {
            vars: &complete,
            tenant_id: "2",
        };
        let config = helpdesk_config_for(&view, &app).unwrap();
        assert_eq!(config.account_id, "9");
        assert_eq!(
            config.webhook_url,
            "https://bridge.example/webhook/callback"
        );
        assert!(config
            .sidecar_path
            .to_string_lossy()
            .ends_with("app-data-9-Atendimento.json"));
    }

    #[test]
    fn test_indexed_view_reads_suffixed_names() {
        let vars = vars(&[
            ("IGNORE_GROUPS_3", "yes"),
            ("DEFAULT_COUNTRY_3", "PT"),
            ("IGNORE_GROUPS", "no"),
        ]);
        let view = EnvView {
            vars: &vars,
            tenant_id: "3",
        };
        assert!(view.bool("IGNORE_GROUPS", false));
        assert_eq!(view.get("DEFAULT_COUNTRY").as_deref(), Some("PT"));
    }
}
