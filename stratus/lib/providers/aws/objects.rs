//! Object store operations of the AWS-family backend (S3).
//!
//! User metadata travels as object tags, expiry as a bucket lifecycle rule
//! scoped to the object name, and ranged reads as HTTP `Range` headers, one
//! request per requested range.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;

use crate::{
    api::{ByteRange, Object, ObjectFilter, METADATA_DATE_KEY, METADATA_DELETE_AT_KEY},
    StratusResult,
};

use super::AwsProvider;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListAllMyBucketsResult {
    #[serde(rename = "Buckets", default)]
    buckets: Option<Buckets>,
}

#[derive(Debug, Deserialize)]
struct Buckets {
    #[serde(rename = "Bucket", default)]
    entries: Vec<BucketEntry>,
}

#[derive(Debug, Deserialize)]
struct BucketEntry {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ListBucketResult {
    #[serde(rename = "Contents", default)]
    contents: Vec<ContentEntry>,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(rename = "Key")]
    key: String,
}

#[derive(Debug, Deserialize)]
struct Tagging {
    #[serde(rename = "TagSet", default)]
    tag_set: Option<TagSet>,
}

#[derive(Debug, Deserialize)]
struct TagSet {
    #[serde(rename = "Tag", default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value", default)]
    value: String,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn tagging_header(metadata: &std::collections::HashMap<String, String>) -> String {
    let mut pairs: Vec<String> = metadata
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                super::sign::uri_encode(key, true),
                super::sign::uri_encode(value, true)
            )
        })
        .collect();
    pairs.sort();
    pairs.join("&")
}

fn tagging_body(metadata: &std::collections::HashMap<String, String>) -> String {
    let mut tags = String::new();
    let mut keys: Vec<&String> = metadata.keys().collect();
    keys.sort();
    for key in keys {
        tags.push_str(&format!(
            "<Tag><Key>{}</Key><Value>{}</Value></Tag>",
            key, metadata[key]
        ));
    }
    format!(
        "<Tagging xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"><TagSet>{}</TagSet></Tagging>",
        tags
    )
}

fn lifecycle_body(object_name: &str, delete_at: DateTime<Utc>) -> String {
    format!(
        concat!(
            "<LifecycleConfiguration>",
            "<Rule>",
            "<ID>expire-{name}</ID>",
            "<Filter><Prefix>{name}</Prefix></Filter>",
            "<Status>Enabled</Status>",
            "<Expiration><Date>{date}</Date></Expiration>",
            "</Rule>",
            "</LifecycleConfiguration>"
        ),
        name = object_name,
        date = delete_at.format("%Y-%m-%dT00:00:00Z"),
    )
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AwsProvider {
    pub(super) async fn create_container(&self, name: &str) -> StratusResult<()> {
        let body = format!(
            concat!(
                "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">",
                "<LocationConstraint>{}</LocationConstraint>",
                "</CreateBucketConfiguration>"
            ),
            self.auth.region
        );
        self.s3_request(
            Method::PUT,
            &format!("/{}", name),
            &[],
            body.into_bytes(),
            "container",
            name,
        )
        .await?;
        Ok(())
    }

    pub(super) async fn delete_container(&self, name: &str) -> StratusResult<()> {
        self.s3_request(
            Method::DELETE,
            &format!("/{}", name),
            &[],
            Vec::new(),
            "container",
            name,
        )
        .await?;
        Ok(())
    }

    pub(super) async fn list_containers(&self) -> StratusResult<Vec<String>> {
        let response = self
            .s3_request(Method::GET, "/", &[], Vec::new(), "container", "list")
            .await?;
        let xml = response.text().await?;
        let decoded: ListAllMyBucketsResult = quick_xml::de::from_str(&xml)
            .map_err(|err| crate::StratusError::backend_msg("unexpected s3 response", err))?;
        Ok(
            decoded
                .buckets
                .map(|buckets| {
                    buckets
                        .entries
                        .into_iter()
                        .map(|bucket| bucket.name)
                        .collect()
                })
                .unwrap_or_default(),
        )
    }

    pub(super) async fn put_object(&self, container: &str, object: Object) -> StratusResult<()> {
        // Expiry rides on the bucket lifecycle, scoped to this object name.
        if let Some(delete_at) = object.delete_at {
            let query = vec![("lifecycle".to_string(), String::new())];
            self.s3_request(
                Method::PUT,
                &format!("/{}", container),
                &query,
                lifecycle_body(&object.name, delete_at).into_bytes(),
                "container",
                container,
            )
            .await?;
        }

        let path = format!("/{}/{}", container, object.name);
        let metadata = object.stamped_metadata();
        let tagging = tagging_header(&metadata);
        let host = self.s3_host();
        let signed = self.signer.sign(
            "s3",
            "PUT",
            &host,
            &path,
            &[],
            &[("x-amz-tagging".to_string(), tagging.clone())],
            &object.content,
            Utc::now(),
        );

        let mut request = self
            .http
            .request(Method::PUT, format!("https://{}{}", host, super::sign::uri_encode(&path, false)))
            .header("Host", &host)
            .header("X-Amz-Date", &signed.amz_date)
            .header("X-Amz-Content-Sha256", &signed.content_sha256)
            .header("Authorization", &signed.authorization)
            .header("x-amz-tagging", tagging)
            .body(object.content.clone());
        if !object.content_type.is_empty() {
            request = request.header("Content-Type", &object.content_type);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(crate::StratusError::backend_str(format!(
                "code: {} reason: {}",
                status.as_u16(),
                body
            )));
        }
        Ok(())
    }

    pub(super) async fn update_object_metadata(
        &self,
        container: &str,
        object: Object,
    ) -> StratusResult<()> {
        let query = vec![("tagging".to_string(), String::new())];
        self.s3_request(
            Method::PUT,
            &format!("/{}/{}", container, object.name),
            &query,
            tagging_body(&object.stamped_metadata()).into_bytes(),
            "object",
            &object.name,
        )
        .await?;
        Ok(())
    }

    pub(super) async fn get_object(
        &self,
        container: &str,
        name: &str,
        ranges: &[ByteRange],
    ) -> StratusResult<Object> {
        let mut object = self.get_object_metadata(container, name).await?;
        let path = format!("/{}/{}", container, name);

        let content = if ranges.is_empty() {
            let response = self
                .s3_request(Method::GET, &path, &[], Vec::new(), "object", name)
                .await?;
            response.bytes().await?
        } else {
            // One ranged request per range; the result is their in-order
            // concatenation.
            let mut assembled = BytesMut::new();
            for range in ranges {
                let host = self.s3_host();
                let signed =
                    self.signer
                        .sign("s3", "GET", &host, &path, &[], &[], b"", Utc::now());
                let response = self
                    .http
                    .request(
                        Method::GET,
                        format!("https://{}{}", host, super::sign::uri_encode(&path, false)),
                    )
                    .header("Host", &host)
                    .header("X-Amz-Date", &signed.amz_date)
                    .header("X-Amz-Content-Sha256", &signed.content_sha256)
                    .header("Authorization", &signed.authorization)
                    .header("Range", format!("bytes={}", range))
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(crate::StratusError::not_found("object", name));
                }
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
        let query = vec![("tagging".to_string(), String::new())];
        let response = self
            .s3_request(
                Method::GET,
                &format!("/{}/{}", container, name),
                &query,
                Vec::new(),
                "object",
                name,
            )
            .await?;
        let xml = response.text().await?;
        let tagging: Tagging = quick_xml::de::from_str(&xml)
            .map_err(|err| crate::StratusError::backend_msg("unexpected s3 response", err))?;

        let mut object = Object {
            name: name.to_string(),
            content: Bytes::new(),
            ..Object::default()
        };
        for tag in tagging.tag_set.map(|set| set.tags).unwrap_or_default() {
            object.metadata.insert(tag.key, tag.value);
        }

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
        Ok(object)
    }

    pub(super) async fn list_objects(
        &self,
        container: &str,
        filter: ObjectFilter,
    ) -> StratusResult<Vec<String>> {
        let mut query = vec![("list-type".to_string(), "2".to_string())];
        let prefix = filter.as_prefix();
        if !prefix.is_empty() {
            query.push(("prefix".to_string(), prefix));
        }

        let response = self
            .s3_request(
                Method::GET,
                &format!("/{}", container),
                &query,
                Vec::new(),
                "container",
                container,
            )
            .await?;
        let xml = response.text().await?;
        let decoded: ListBucketResult = quick_xml::de::from_str(&xml)
            .map_err(|err| crate::StratusError::backend_msg("unexpected s3 response", err))?;
        Ok(decoded.contents.into_iter().map(|entry| entry.key).collect())
    }

    pub(super) async fn copy_object(
        &self,
        container: &str,
        source: &str,
        destination: &str,
    ) -> StratusResult<()> {
        let path = format!("/{}/{}", container, destination);
        let copy_source = format!("/{}/{}", container, source);
        let host = self.s3_host();
        let signed = self.signer.sign(
            "s3",
            "PUT",
            &host,
            &path,
            &[],
            &[("x-amz-copy-source".to_string(), copy_source.clone())],
            b"",
            Utc::now(),
        );

        let response = self
            .http
            .request(
                Method::PUT,
                format!("https://{}{}", host, super::sign::uri_encode(&path, false)),
            )
            .header("Host", &host)
            .header("X-Amz-Date", &signed.amz_date)
            .header("X-Amz-Content-Sha256", &signed.content_sha256)
            .header("Authorization", &signed.authorization)
            .header("x-amz-copy-source", copy_source)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(crate::StratusError::not_found("object", source));
        }
        Ok(())
    }

    pub(super) async fn delete_object(&self, container: &str, name: &str) -> StratusResult<()> {
        self.s3_request(
            Method::DELETE,
            &format!("/{}/{}", container, name),
            &[],
            Vec::new(),
            "object",
            name,
        )
        .await?;
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_tagging_round_trip_shapes() -> anyhow::Result<()> {
        let metadata = HashMap::from([
            ("tier".to_string(), "gold".to_string()),
            ("owner".to_string(), "ops".to_string()),
        ]);

        assert_eq!(tagging_header(&metadata), "owner=ops&tier=gold");

        let body = tagging_body(&metadata);
        let decoded: Tagging = quick_xml::de::from_str(&body)?;
        let tags = decoded.tag_set.unwrap().tags;
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].key, "owner");
        assert_eq!(tags[0].value, "ops");
        Ok(())
    }

    #[test]
    fn test_lifecycle_body_scopes_to_object() {
        let delete_at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let body = lifecycle_body("vm-1", delete_at);
        assert!(body.contains("<Prefix>vm-1</Prefix>"));
        assert!(body.contains("<Date>2026-01-02T00:00:00Z</Date>"));
        assert!(body.contains("<Status>Enabled</Status>"));
    }

    #[test]
    fn test_list_bucket_decoding() -> anyhow::Result<()> {
        let xml = r#"<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>bucket</Name>
  <Contents><Key>a</Key></Contents>
  <Contents><Key>b/c</Key></Contents>
</ListBucketResult>"#;
        let decoded: ListBucketResult = quick_xml::de::from_str(xml)?;
        let keys: Vec<&str> = decoded.contents.iter().map(|entry| entry.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b/c"]);
        Ok(())
    }
}
