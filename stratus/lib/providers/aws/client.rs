//! HTTP plumbing for the AWS-family backend: SigV4-signed calls to the EC2
//! query API and S3.

use chrono::Utc;
use getset::Getters;
use reqwest::{Client, Method, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use typed_builder::TypedBuilder;

use crate::{config::BackendConfig, StratusError, StratusResult};

use super::sign::{uri_encode, SigV4Signer};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The EC2 query API version every call pins.
pub(super) const EC2_API_VERSION: &str = "2016-11-15";

/// Side-channel container holding full Network records (JSON).
pub(super) const AWS_NETWORKS_CONTAINER: &str = "stratus.aws.networks";

/// Side-channel container holding serialized VM records.
pub(super) const AWS_INSTANCES_CONTAINER: &str = "stratus.aws.instances";

/// Side-channel container holding volume names.
pub(super) const AWS_VOLUMES_CONTAINER: &str = "stratus.aws.volumes";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Credentials and placement options for an AWS-family backend.
#[derive(Debug, Clone, Default, Getters, TypedBuilder)]
#[getset(get = "pub with_prefix")]
pub struct AwsAuthOpts {
    /// The access key id.
    #[builder(setter(into))]
    pub(crate) access_key_id: String,

    /// The secret access key.
    #[builder(setter(into))]
    pub(crate) secret_access_key: String,

    /// The region requests are sent to.
    #[builder(setter(into))]
    pub(crate) region: String,

    /// The owner account ids whose images are listed. Defaults to the
    /// canonical distribution publishers.
    #[builder(default, setter(into))]
    pub(crate) image_owners: Vec<String>,
}

/// The AWS-family backend.
#[derive(Debug)]
pub struct AwsProvider {
    /// The HTTP client, with transient-error retries.
    pub(super) http: ClientWithMiddleware,

    /// The credentials and placement options.
    pub(super) auth: AwsAuthOpts,

    /// The backend configuration.
    pub(super) config: BackendConfig,

    /// The request signer.
    pub(super) signer: SigV4Signer,
}

/// A repeated `<item>` list, the collection shape of every EC2 `*Set`
/// element.
#[derive(Debug, Deserialize)]
pub(super) struct ItemList<T> {
    #[serde(rename = "item", default = "Vec::new")]
    pub(super) items: Vec<T>,
}

impl<T> Default for ItemList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

/// The error body of a failed EC2 query call.
#[derive(Debug, Deserialize)]
struct Ec2ErrorResponse {
    #[serde(rename = "Errors", default)]
    errors: Option<Ec2Errors>,
}

#[derive(Debug, Deserialize)]
struct Ec2Errors {
    #[serde(rename = "Error", default)]
    entries: Vec<Ec2ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct Ec2ErrorEntry {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// The error body of a failed S3 call.
#[derive(Debug, Deserialize)]
struct S3ErrorResponse {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AwsProvider {
    /// Prepares the backend: the side-channel containers for networks,
    /// instances and volume names are ensured to exist.
    pub async fn connect(auth: AwsAuthOpts, config: BackendConfig) -> StratusResult<Self> {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let http = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let signer = SigV4Signer::new(
            auth.access_key_id.clone(),
            auth.secret_access_key.clone(),
            auth.region.clone(),
        );
        let provider = Self {
            http,
            auth,
            config,
            signer,
        };

        for container in [
            AWS_NETWORKS_CONTAINER,
            AWS_INSTANCES_CONTAINER,
            AWS_VOLUMES_CONTAINER,
        ] {
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

    fn ec2_host(&self) -> String {
        format!("ec2.{}.amazonaws.com", self.auth.region)
    }

    pub(super) fn s3_host(&self) -> String {
        format!("s3.{}.amazonaws.com", self.auth.region)
    }

    /// Issues one EC2 query API action and returns the response XML.
    ///
    /// `params` carries the action parameters; `Action` and `Version` are
    /// added here. Failures are mapped onto the taxonomy by error code.
    pub(super) async fn ec2_call(
        &self,
        action: &str,
        params: Vec<(String, String)>,
        resource: &str,
        name: &str,
    ) -> StratusResult<String> {
        let mut params = params;
        params.push(("Action".to_string(), action.to_string()));
        params.push(("Version".to_string(), EC2_API_VERSION.to_string()));
        params.sort();

        let body = params
            .iter()
            .map(|(key, value)| format!("{}={}", uri_encode(key, true), uri_encode(value, true)))
            .collect::<Vec<_>>()
            .join("&");

        let host = self.ec2_host();
        let signed = self
            .signer
            .sign("ec2", "POST", &host, "/", &[], &[], body.as_bytes(), Utc::now());

        let response = self
            .http
            .post(format!("https://{}/", host))
            .header("Host", &host)
            .header("X-Amz-Date", &signed.amz_date)
            .header("X-Amz-Content-Sha256", &signed.content_sha256)
            .header("Authorization", &signed.authorization)
            .header("Content-Type", "application/x-www-form-urlencoded; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            return Ok(text);
        }
        Err(map_ec2_error(status, &text, resource, name))
    }

    /// Issues one signed S3 request. `query` carries decoded pairs, also
    /// used for the sub-resource markers (`tagging`, `lifecycle`, ...).
    pub(super) async fn s3_request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Vec<u8>,
        resource: &str,
        name: &str,
    ) -> StratusResult<Response> {
        let host = self.s3_host();
        let signed =
            self.signer
                .sign("s3", method.as_str(), &host, path, query, &[], &body, Utc::now());

        let query_string = query
            .iter()
            .map(|(key, value)| {
                if value.is_empty() {
                    uri_encode(key, true)
                } else {
                    format!("{}={}", uri_encode(key, true), uri_encode(value, true))
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        let url = if query_string.is_empty() {
            format!("https://{}{}", host, uri_encode(path, false))
        } else {
            format!("https://{}{}?{}", host, uri_encode(path, false), query_string)
        };

        let request: RequestBuilder = self
            .http
            .request(method, url)
            .header("Host", &host)
            .header("X-Amz-Date", &signed.amz_date)
            .header("X-Amz-Content-Sha256", &signed.content_sha256)
            .header("Authorization", &signed.authorization)
            .body(body);

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(map_s3_error(status, &text, resource, name))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Decodes an EC2 query response, surfacing decode failures with the
/// offending payload.
pub(super) fn decode_ec2<T: serde::de::DeserializeOwned>(xml: &str) -> StratusResult<T> {
    quick_xml::de::from_str(xml)
        .map_err(|err| StratusError::backend_msg(format!("unexpected ec2 response: {}", xml), err))
}

fn map_ec2_error(status: StatusCode, body: &str, resource: &str, name: &str) -> StratusError {
    let decoded: Option<Ec2ErrorResponse> = quick_xml::de::from_str(body).ok();
    let entry = decoded
        .and_then(|response| response.errors)
        .and_then(|errors| errors.entries.into_iter().next());

    match entry {
        Some(entry) => {
            if entry.code.contains("NotFound") {
                StratusError::not_found(resource, name)
            } else if entry.code.contains("Duplicate") || entry.code.contains("AlreadyExists") {
                StratusError::already_exists(resource, name)
            } else if entry.code.starts_with("InvalidParameter")
                || entry.code.starts_with("Malformed")
            {
                StratusError::InvalidArgument(entry.message)
            } else {
                StratusError::backend_str(format!("{}: {}", entry.code, entry.message))
            }
        }
        None => StratusError::backend_str(format!("code: {} reason: {}", status.as_u16(), body)),
    }
}

fn map_s3_error(status: StatusCode, body: &str, resource: &str, name: &str) -> StratusError {
    let decoded: Option<S3ErrorResponse> = quick_xml::de::from_str(body).ok();
    match (status, decoded) {
        (StatusCode::NOT_FOUND, _) => StratusError::not_found(resource, name),
        (StatusCode::CONFLICT, _) => StratusError::already_exists(resource, name),
        (_, Some(error)) if error.code.contains("NotFound") || error.code == "NoSuchKey" => {
            StratusError::not_found(resource, name)
        }
        (_, Some(error)) if error.code.contains("AlreadyOwnedByYou")
            || error.code.contains("AlreadyExists") =>
        {
            StratusError::already_exists(resource, name)
        }
        (_, Some(error)) => {
            StratusError::backend_str(format!("{}: {}", error.code, error.message))
        }
        (_, None) => StratusError::backend_str(format!("code: {} reason: {}", status.as_u16(), body)),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_ec2_error_by_code() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<Response><Errors><Error><Code>InvalidInstanceID.NotFound</Code><Message>The instance ID 'i-0' does not exist</Message></Error></Errors><RequestID>x</RequestID></Response>"#;
        let err = map_ec2_error(StatusCode::BAD_REQUEST, body, "vm", "i-0");
        assert!(err.is_not_found());

        let body = r#"<Response><Errors><Error><Code>InvalidKeyPair.Duplicate</Code><Message>kp exists</Message></Error></Errors></Response>"#;
        let err = map_ec2_error(StatusCode::BAD_REQUEST, body, "key pair", "kp");
        assert!(err.is_already_exists());

        let err = map_ec2_error(StatusCode::INTERNAL_SERVER_ERROR, "boom", "vm", "i-0");
        assert!(matches!(err, StratusError::Backend(_)));
    }

    #[test]
    fn test_map_s3_error_by_code() {
        let body = r#"<Error><Code>NoSuchKey</Code><Message>missing</Message></Error>"#;
        let err = map_s3_error(StatusCode::BAD_REQUEST, body, "object", "o");
        assert!(err.is_not_found());

        let body = r#"<Error><Code>BucketAlreadyOwnedByYou</Code><Message>yours</Message></Error>"#;
        let err = map_s3_error(StatusCode::CONFLICT, body, "container", "b");
        assert!(err.is_already_exists());
    }
}
