//! iControl REST client
//!
//! Resource layout:
//! - nodes:   `/mgmt/tm/ltm/node/~{partition}~{name}`
//! - pools:   `/mgmt/tm/ltm/pool/~{partition}~{name}`
//! - members: `/mgmt/tm/ltm/pool/~{partition}~{pool}/members/~{partition}~{member}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use super::{Node, Pool, StateStore};
use crate::config::StoreConfig;
use crate::error::{Error, Result};

const NODE_PATH: &str = "/mgmt/tm/ltm/node";
const POOL_PATH: &str = "/mgmt/tm/ltm/pool";

/// Client for the appliance management API
#[derive(Clone)]
pub struct IControlClient {
    http_client: Client,
    base_url: String,
    username: String,
    password: String,
}

/// Error body returned by the management API on non-2xx responses
#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<u16>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ItemList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Serialize)]
struct NameBody<'a> {
    name: &'a str,
    partition: &'a str,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeBody {
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    partition: String,
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct PoolBody {
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    partition: String,
    #[serde(default = "yes", with = "yes_no")]
    allow_nat: bool,
    #[serde(default = "yes", with = "yes_no")]
    allow_snat: bool,
    #[serde(default)]
    load_balancing_mode: String,
    #[serde(default)]
    monitor: String,
}

#[derive(Debug, Deserialize)]
struct MemberBody {
    name: String,
}

fn yes() -> bool {
    true
}

/// The API encodes flags as `"yes"` / `"no"`
mod yes_no {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "yes" } else { "no" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match String::deserialize(deserializer)?.as_str() {
            "yes" | "enabled" | "true" => Ok(true),
            "no" | "disabled" | "false" => Ok(false),
            other => Err(D::Error::custom(format!("unexpected flag value '{other}'"))),
        }
    }
}

impl From<NodeBody> for Node {
    fn from(body: NodeBody) -> Self {
        Node {
            name: body.name,
            partition: body.partition,
            address: body.address,
        }
    }
}

impl From<PoolBody> for Pool {
    fn from(body: PoolBody) -> Self {
        Pool {
            name: body.name,
            partition: body.partition,
            allow_nat: body.allow_nat,
            allow_snat: body.allow_snat,
            load_balancing_mode: body.load_balancing_mode,
            monitor: body.monitor,
        }
    }
}

impl From<&Pool> for PoolBody {
    fn from(pool: &Pool) -> Self {
        PoolBody {
            name: pool.name.clone(),
            partition: pool.partition.clone(),
            allow_nat: pool.allow_nat,
            allow_snat: pool.allow_snat,
            load_balancing_mode: pool.load_balancing_mode.clone(),
            monitor: pool.monitor.clone(),
        }
    }
}

/// `~{partition}~{name}` path segment
fn item(partition: &str, name: &str) -> String {
    format!("~{partition}~{name}")
}

impl IControlClient {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        self.http_client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    /// Send a request and turn non-2xx responses into [`Error::Store`]
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiError>(&body) {
            Ok(api_error) => {
                if let Some(code) = api_error.code.filter(|c| *c != status.as_u16()) {
                    debug!("API error code {} differs from HTTP status {}", code, status);
                }
                api_error.message
            }
            Err(_) if !body.trim().is_empty() => body,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };
        Err(Error::store(status.as_u16(), message))
    }

    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.send(self.request(Method::GET, path)).await {
            Ok(response) => Ok(Some(serde_json::from_str(&response.text().await?)?)),
            Err(Error::Store { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<()> {
        self.send(self.request(method, path).json(body)).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for IControlClient {
    async fn create_node(&self, name: &str, partition: &str, address: &str) -> Result<()> {
        let body = NodeBody {
            name: name.to_string(),
            partition: partition.to_string(),
            address: address.to_string(),
        };
        self.send_json(Method::POST, NODE_PATH, &body).await
    }

    async fn get_node(&self, name: &str, partition: &str) -> Result<Option<Node>> {
        let path = format!("{NODE_PATH}/{}", item(partition, name));
        Ok(self.get_optional::<NodeBody>(&path).await?.map(Node::from))
    }

    async fn modify_node(&self, name: &str, partition: &str, node: &Node) -> Result<()> {
        let path = format!("{NODE_PATH}/{}", item(partition, name));
        let body = NodeBody {
            name: node.name.clone(),
            partition: node.partition.clone(),
            address: node.address.clone(),
        };
        self.send_json(Method::PUT, &path, &body).await
    }

    async fn delete_node(&self, name: &str, partition: &str) -> Result<()> {
        self.delete(&format!("{NODE_PATH}/{}", item(partition, name)))
            .await
    }

    async fn create_pool(&self, name: &str, partition: &str) -> Result<()> {
        self.send_json(Method::POST, POOL_PATH, &NameBody { name, partition })
            .await
    }

    async fn get_pool(&self, name: &str, partition: &str) -> Result<Option<Pool>> {
        let path = format!("{POOL_PATH}/{}", item(partition, name));
        Ok(self.get_optional::<PoolBody>(&path).await?.map(Pool::from))
    }

    async fn modify_pool(&self, name: &str, partition: &str, pool: &Pool) -> Result<()> {
        let path = format!("{POOL_PATH}/{}", item(partition, name));
        self.send_json(Method::PUT, &path, &PoolBody::from(pool))
            .await
    }

    async fn delete_pool(&self, name: &str, partition: &str) -> Result<()> {
        self.delete(&format!("{POOL_PATH}/{}", item(partition, name)))
            .await
    }

    async fn pool_members(&self, pool: &str, partition: &str) -> Result<Vec<String>> {
        let path = format!("{POOL_PATH}/{}/members", item(partition, pool));
        let response = self.send(self.request(Method::GET, &path)).await?;
        let list: ItemList<MemberBody> = serde_json::from_str(&response.text().await?)?;
        Ok(list.items.into_iter().map(|m| m.name).collect())
    }

    async fn add_pool_member(&self, pool: &str, partition: &str, member: &str) -> Result<()> {
        let path = format!("{POOL_PATH}/{}/members", item(partition, pool));
        self.send_json(
            Method::POST,
            &path,
            &NameBody {
                name: member,
                partition,
            },
        )
        .await
    }

    async fn delete_pool_member(&self, pool: &str, partition: &str, member: &str) -> Result<()> {
        self.delete(&format!(
            "{POOL_PATH}/{}/members/{}",
            item(partition, pool),
            item(partition, member)
        ))
        .await
    }
}
