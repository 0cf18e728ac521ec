//! Object store operations of the OpenStack-family backend (Swift).
//!
//! Object metadata travels as `X-Object-Meta-*` headers, expiry as
//! `X-Delete-At`, and ranged reads as HTTP `Range` headers, one request per
//! requested range.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{header::HeaderMap, Method};
use serde::Deserialize;

use crate::{
    api::{ByteRange, Object, ObjectFilter, METADATA_DATE_KEY, METADATA_DELETE_AT_KEY},
    StratusResult,
};

use super::OpenStackProvider;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Prefix of Swift user-metadata headers.
const OBJECT_META_PREFIX: &str = "X-Object-Meta-";

/// Header carrying the object's absolute expiry as a Unix timestamp.
const DELETE_AT_HEADER: &str = "X-Delete-At";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ContainerEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    name: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl OpenStackProvider {
    fn container_url(&self, container: &str) -> String {
        format!("{}/{}", self.endpoints.object_store, container)
    }

    fn object_url(&self, container: &str, name: &str) -> String {
        format!("{}/{}/{}", self.endpoints.object_store, container, name)
    }

    pub(super) async fn create_container(&self, name: &str) -> StratusResult<()> {
        let response = self
            .request(Method::PUT, self.container_url(name))
            .send()
            .await?;
        Self::check(response, "container", name).await?;
        Ok(())
    }

    pub(super) async fn delete_container(&self, name: &str) -> StratusResult<()> {
        self.delete(self.container_url(name), "container", name).await
    }

    pub(super) async fn list_containers(&self) -> StratusResult<Vec<String>> {
        let entries: Vec<ContainerEntry> = self
            .get_json(
                format!("{}?format=json", self.endpoints.object_store),
                "container",
                "list",
            )
            .await?;
        Ok(entries.into_iter().map(|entry| entry.name).collect())
    }

    pub(super) async fn put_object(&self, container: &str, object: Object) -> StratusResult<()> {
        let mut request = self
            .request(Method::PUT, self.object_url(container, &object.name))
            .body(object.content.clone());

        if !object.content_type.is_empty() {
            request = request.header("Content-Type", &object.content_type);
        }
        if let Some(delete_at) = object.delete_at {
            request = request.header(DELETE_AT_HEADER, delete_at.timestamp().to_string());
        }
        for (key, value) in object.stamped_metadata() {
            request = request.header(format!("{}{}", OBJECT_META_PREFIX, key), value);
        }

        let response = request.send().await?;
        Self::check(response, "object", &object.name).await?;
        Ok(())
    }

    pub(super) async fn update_object_metadata(
        &self,
        container: &str,
        object: Object,
    ) -> StratusResult<()> {
        let mut request = self.request(Method::POST, self.object_url(container, &object.name));
        if let Some(delete_at) = object.delete_at {
            request = request.header(DELETE_AT_HEADER, delete_at.timestamp().to_string());
        }
        for (key, value) in object.stamped_metadata() {
            request = request.header(format!("{}{}", OBJECT_META_PREFIX, key), value);
        }

        let response = request.send().await?;
        Self::check(response, "object", &object.name).await?;
        Ok(())
    }

    pub(super) async fn get_object(
        &self,
        container: &str,
        name: &str,
        ranges: &[ByteRange],
    ) -> StratusResult<Object> {
        let mut object = self.get_object_metadata(container, name).await?;

        let content = if ranges.is_empty() {
            let response = self
                .request(Method::GET, self.object_url(container, name))
                .send()
                .await?;
            let response = Self::check(response, "object", name).await?;
            response.bytes().await?
        } else {
            // One ranged request per range; the result is their in-order
            // concatenation.
            let mut assembled = BytesMut::new();
            for range in ranges {
                let response = self
                    .request(Method::GET, self.object_url(container, name))
                    .header("Range", format!("bytes={}", range))
                    .send()
                    .await?;
                let response = Self::check(response, "object", name).await?;
                assembled.extend_from_slice(&response.bytes().await?);
            }
            assembled.freeze()
        };

        object.content_length = content.len() as u64;
        object.content = content;
        Ok(object)
    }

    pub(super) async fn get_object_metadata(
        &self,
        container: &str,
        name: &str,
    ) -> StratusResult<Object> {
        let headers = self
            .head(self.object_url(container, name), "object", name)
            .await?;
        Ok(object_from_headers(name, &headers))
    }

    pub(super) async fn list_objects(
        &self,
        container: &str,
        filter: ObjectFilter,
    ) -> StratusResult<Vec<String>> {
        let mut url = format!("{}?format=json", self.container_url(container));
        let prefix = filter.as_prefix();
        if !prefix.is_empty() {
            url.push_str(&format!("&prefix={}", prefix));
        }

        let entries: Vec<ObjectEntry> = self.get_json(url, "container", container).await?;
        Ok(entries.into_iter().map(|entry| entry.name).collect())
    }

    pub(super) async fn copy_object(
        &self,
        container: &str,
        source: &str,
        destination: &str,
    ) -> StratusResult<()> {
        let copy = Method::from_bytes(b"COPY").expect("COPY is a valid method");
        let response = self
            .request(copy, self.object_url(container, source))
            .header("Destination", format!("/{}/{}", container, destination))
            .send()
            .await?;
        Self::check(response, "object", source).await?;
        Ok(())
    }

    pub(super) async fn delete_object(&self, container: &str, name: &str) -> StratusResult<()> {
        self.delete(self.object_url(container, name), "object", name)
            .await
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Rebuilds an object record (without content) from Swift response headers.
fn object_from_headers(name: &str, headers: &HeaderMap) -> Object {
    let mut object = Object {
        name: name.to_string(),
        content: Bytes::new(),
        ..Object::default()
    };

    for (key, value) in headers {
        let key = key.as_str();
        let Ok(value) = value.to_str() else {
            continue;
        };
        if let Some(meta_key) = strip_prefix_ignore_case(key, OBJECT_META_PREFIX) {
            object.metadata.insert(meta_key.to_string(), value.to_string());
        } else if key.eq_ignore_ascii_case("Content-Type") {
            object.content_type = value.to_string();
        } else if key.eq_ignore_ascii_case("Content-Length") {
            object.content_length = value.parse().unwrap_or_default();
        } else if key.eq_ignore_ascii_case("Last-Modified") {
            if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
                object.last_modified = parsed.with_timezone(&Utc);
            }
        } else if key.eq_ignore_ascii_case(DELETE_AT_HEADER) {
            if let Ok(timestamp) = value.parse::<i64>() {
                if let Some(parsed) = Utc.timestamp_opt(timestamp, 0).single() {
                    object.delete_at = Some(parsed);
                }
            }
        }
    }

    // The reserved keys carry authoritative timestamps.
    if let Some(date) = object.metadata.get(METADATA_DATE_KEY) {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(date) {
            object.date = parsed.with_timezone(&Utc);
        }
    }
    if let Some(delete_at) = object.metadata.get(METADATA_DELETE_AT_KEY) {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(delete_at) {
            let parsed = parsed.with_timezone(&Utc);
            if parsed != DateTime::<Utc>::UNIX_EPOCH {
                object.delete_at = Some(parsed);
            }
        }
    }
    object
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.len() >= prefix.len() && value[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    #[test]
    fn test_object_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("text/plain"),
        );
        headers.insert(
            HeaderName::from_static("content-length"),
            HeaderValue::from_static("11"),
        );
        headers.insert(
            HeaderName::from_static("x-object-meta-tier"),
            HeaderValue::from_static("gold"),
        );
        headers.insert(
            HeaderName::from_static("x-object-meta-__date__"),
            HeaderValue::from_static("2024-05-01T12:00:00+00:00"),
        );
        headers.insert(
            HeaderName::from_static("x-delete-at"),
            HeaderValue::from_static("1893456000"),
        );

        let object = object_from_headers("o", &headers);
        assert_eq!(object.content_type, "text/plain");
        assert_eq!(object.content_length, 11);
        assert_eq!(object.metadata.get("tier").map(String::as_str), Some("gold"));
        assert_eq!(object.date.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        assert_eq!(
            object.delete_at.map(|at| at.timestamp()),
            Some(1_893_456_000)
        );
    }

    #[test]
    fn test_strip_prefix_ignore_case() {
        assert_eq!(
            strip_prefix_ignore_case("x-object-meta-tier", OBJECT_META_PREFIX),
            Some("tier")
        );
        assert_eq!(strip_prefix_ignore_case("x-delete-at", OBJECT_META_PREFIX), None);
    }
}
