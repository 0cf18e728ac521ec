//! Authentication and HTTP plumbing for the OpenStack-family backend.

use getset::Getters;
use reqwest::{header::HeaderMap, Client, Method, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    config::{BackendConfig, NETWORK_GATEWAYS_CONTAINER, VMS_CONTAINER},
    StratusError, StratusResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Header carrying the authentication token on every request.
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Header returning the issued token after authentication.
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// The name of the default security group attached to every server.
///
/// The group opens all TCP, UDP and ICMP ports; security is managed
/// individually on each VM with an in-VM firewall.
pub const DEFAULT_SECURITY_GROUP: &str = "stratus-default";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Credentials and placement options for an OpenStack-family backend.
#[derive(Debug, Clone, Default, Getters, TypedBuilder)]
#[getset(get = "pub with_prefix")]
pub struct AuthOptions {
    /// The HTTP endpoint of the Identity v3 API.
    #[builder(setter(into))]
    pub(crate) identity_endpoint: String,

    /// The user name to authenticate with.
    #[builder(setter(into))]
    pub(crate) username: String,

    /// The user's password.
    #[builder(setter(into))]
    pub(crate) password: String,

    /// The domain holding the user and project.
    #[builder(default = "Default".to_string(), setter(into))]
    pub(crate) domain_name: String,

    /// The project (tenant) to scope the token to.
    #[builder(setter(into))]
    pub(crate) project_name: String,

    /// The region the infrastructure is created in.
    #[builder(setter(into))]
    pub(crate) region: String,

    /// The floating IP pool drawn from when `use_floating_ip` is set.
    #[builder(default, setter(into))]
    pub(crate) floating_ip_pool: String,
}

/// The public endpoints resolved from the service catalog.
#[derive(Debug, Clone, Default)]
pub(super) struct ServiceEndpoints {
    pub(super) compute: String,
    pub(super) network: String,
    pub(super) volume: String,
    pub(super) object_store: String,
    pub(super) image: String,
}

/// The OpenStack-family backend.
#[derive(Debug)]
pub struct OpenStackProvider {
    /// The HTTP client, with transient-error retries.
    pub(super) http: ClientWithMiddleware,

    /// The credentials used to authenticate.
    pub(super) auth: AuthOptions,

    /// The backend configuration.
    pub(super) config: BackendConfig,

    /// The issued authentication token.
    pub(super) token: String,

    /// The resolved service endpoints.
    pub(super) endpoints: ServiceEndpoints,

    /// The id of the externally-routable provider network.
    pub(super) provider_network_id: String,

    /// The id of the default security group.
    pub(super) security_group_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    region: String,
    url: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl OpenStackProvider {
    /// Authenticates against the Identity API and prepares the backend:
    /// service endpoints are resolved from the catalog, the provider network
    /// id is looked up, the default security group is ensured and the
    /// reserved side-channel containers are created.
    pub async fn connect(auth: AuthOptions, config: BackendConfig) -> StratusResult<Self> {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let http = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let (token, endpoints) = Self::authenticate(&http, &auth).await?;

        let mut provider = Self {
            http,
            auth,
            config,
            token,
            endpoints,
            provider_network_id: String::new(),
            security_group_id: String::new(),
        };

        provider.provider_network_id = provider
            .resolve_network_id(&provider.config.provider_network)
            .await?;
        provider.security_group_id = provider.ensure_default_security_group().await?;

        for container in [NETWORK_GATEWAYS_CONTAINER, VMS_CONTAINER] {
            if let Err(err) = provider.create_container(container).await {
                if !err.is_already_exists() {
                    return Err(err);
                }
            }
        }
        Ok(provider)
    }

    /// The backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    async fn authenticate(
        http: &ClientWithMiddleware,
        auth: &AuthOptions,
    ) -> StratusResult<(String, ServiceEndpoints)> {
        let payload = serde_json::json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": auth.username,
                            "domain": { "name": auth.domain_name },
                            "password": auth.password,
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": auth.project_name,
                        "domain": { "name": auth.domain_name },
                    }
                }
            }
        });

        let response = http
            .post(format!(
                "{}/auth/tokens",
                auth.identity_endpoint.trim_end_matches('/')
            ))
            .json(&payload)
            .send()
            .await?;
        let response = Self::check(response, "token", &auth.username).await?;

        let token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StratusError::backend_str("identity response carries no token"))?;

        let body: TokenResponse = response.json().await?;
        let endpoints = Self::endpoints_from_catalog(&body.token.catalog, &auth.region)?;
        Ok((token, endpoints))
    }

    fn endpoints_from_catalog(
        catalog: &[CatalogEntry],
        region: &str,
    ) -> StratusResult<ServiceEndpoints> {
        let resolve = |service_type: &str| -> StratusResult<String> {
            catalog
                .iter()
                .filter(|entry| entry.service_type == service_type)
                .flat_map(|entry| entry.endpoints.iter())
                .find(|endpoint| endpoint.interface == "public" && endpoint.region == region)
                .map(|endpoint| endpoint.url.trim_end_matches('/').to_string())
                .ok_or_else(|| {
                    StratusError::backend_str(format!(
                        "no public {} endpoint in region {}",
                        service_type, region
                    ))
                })
        };

        Ok(ServiceEndpoints {
            compute: resolve("compute")?,
            network: resolve("network")?,
            volume: resolve("volumev3")?,
            object_store: resolve("object-store")?,
            image: resolve("image")?,
        })
    }

    /// Maps a failed response onto the error taxonomy, preserving the
    /// backend's diagnostic verbatim.
    pub(super) async fn check(
        response: Response,
        resource: &str,
        name: &str,
    ) -> StratusResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(StratusError::not_found(resource, name)),
            StatusCode::CONFLICT => Err(StratusError::already_exists(resource, name)),
            StatusCode::BAD_REQUEST => Err(StratusError::InvalidArgument(body)),
            _ => Err(StratusError::backend_str(format!(
                "code: {} reason: {}",
                status.as_u16(),
                body
            ))),
        }
    }

    pub(super) fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(AUTH_TOKEN_HEADER, &self.token)
    }

    pub(super) async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        resource: &str,
        name: &str,
    ) -> StratusResult<T> {
        let response = self.request(Method::GET, url).send().await?;
        let response = Self::check(response, resource, name).await?;
        Ok(response.json().await?)
    }

    pub(super) async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: String,
        body: &B,
        resource: &str,
        name: &str,
    ) -> StratusResult<T> {
        let response = self.request(Method::POST, url).json(body).send().await?;
        let response = Self::check(response, resource, name).await?;
        Ok(response.json().await?)
    }

    pub(super) async fn post_action<B: Serialize>(
        &self,
        url: String,
        body: &B,
        resource: &str,
        name: &str,
    ) -> StratusResult<()> {
        let response = self.request(Method::POST, url).json(body).send().await?;
        Self::check(response, resource, name).await?;
        Ok(())
    }

    pub(super) async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: String,
        body: &B,
        resource: &str,
        name: &str,
    ) -> StratusResult<T> {
        let response = self.request(Method::PUT, url).json(body).send().await?;
        let response = Self::check(response, resource, name).await?;
        Ok(response.json().await?)
    }

    pub(super) async fn delete(
        &self,
        url: String,
        resource: &str,
        name: &str,
    ) -> StratusResult<()> {
        let response = self.request(Method::DELETE, url).send().await?;
        Self::check(response, resource, name).await?;
        Ok(())
    }

    pub(super) async fn head(
        &self,
        url: String,
        resource: &str,
        name: &str,
    ) -> StratusResult<HeaderMap> {
        let response = self.request(Method::HEAD, url).send().await?;
        let response = Self::check(response, resource, name).await?;
        Ok(response.headers().clone())
    }

    async fn resolve_network_id(&self, name: &str) -> StratusResult<String> {
        #[derive(Deserialize)]
        struct NetworksResponse {
            networks: Vec<NetworkRef>,
        }
        #[derive(Deserialize)]
        struct NetworkRef {
            id: String,
        }

        let response: NetworksResponse = self
            .get_json(
                format!("{}/v2.0/networks?name={}", self.endpoints.network, name),
                "network",
                name,
            )
            .await?;
        response
            .networks
            .into_iter()
            .next()
            .map(|net| net.id)
            .ok_or_else(|| StratusError::not_found("network", name))
    }

    /// Finds or creates the wide-open default security group.
    async fn ensure_default_security_group(&self) -> StratusResult<String> {
        #[derive(Deserialize)]
        struct GroupsResponse {
            security_groups: Vec<GroupRef>,
        }
        #[derive(Deserialize)]
        struct GroupResponse {
            security_group: GroupRef,
        }
        #[derive(Deserialize)]
        struct GroupRef {
            id: String,
            name: String,
        }

        let groups: GroupsResponse = self
            .get_json(
                format!(
                    "{}/v2.0/security-groups?name={}",
                    self.endpoints.network, DEFAULT_SECURITY_GROUP
                ),
                "security group",
                DEFAULT_SECURITY_GROUP,
            )
            .await?;
        if let Some(group) = groups
            .security_groups
            .into_iter()
            .find(|group| group.name == DEFAULT_SECURITY_GROUP)
        {
            return Ok(group.id);
        }

        let created: GroupResponse = self
            .post_json(
                format!("{}/v2.0/security-groups", self.endpoints.network),
                &serde_json::json!({
                    "security_group": {
                        "name": DEFAULT_SECURITY_GROUP,
                        "description": "Default security group",
                    }
                }),
                "security group",
                DEFAULT_SECURITY_GROUP,
            )
            .await?;
        let group_id = created.security_group.id;

        for protocol in ["tcp", "udp", "icmp"] {
            for ethertype in ["IPv4", "IPv6"] {
                let rule = serde_json::json!({
                    "security_group_rule": {
                        "security_group_id": group_id,
                        "direction": "ingress",
                        "protocol": protocol,
                        "ethertype": ethertype,
                    }
                });
                if let Err(err) = self
                    .post_action(
                        format!("{}/v2.0/security-group-rules", self.endpoints.network),
                        &rule,
                        "security group rule",
                        protocol,
                    )
                    .await
                {
                    if let Err(cleanup) = self
                        .delete(
                            format!(
                                "{}/v2.0/security-groups/{}",
                                self.endpoints.network, group_id
                            ),
                            "security group",
                            DEFAULT_SECURITY_GROUP,
                        )
                        .await
                    {
                        tracing::warn!(
                            "error removing half-configured security group: {}",
                            cleanup
                        );
                    }
                    return Err(err);
                }
            }
        }
        Ok(group_id)
    }
}
