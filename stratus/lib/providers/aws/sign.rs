//! AWS Signature Version 4 request signing.
//!
//! Reference: https://docs.aws.amazon.com/IAM/latest/UserGuide/create-signed-request.html

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Signs outgoing requests with AWS Signature Version 4.
#[derive(Debug, Clone)]
pub(super) struct SigV4Signer {
    access_key_id: String,
    secret_access_key: String,
    region: String,
}

/// The headers a signed request must carry.
#[derive(Debug)]
pub(super) struct SignedHeaders {
    /// `X-Amz-Date`, the request timestamp.
    pub(super) amz_date: String,

    /// `X-Amz-Content-Sha256`, the hex payload hash.
    pub(super) content_sha256: String,

    /// The `Authorization` header value.
    pub(super) authorization: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SigV4Signer {
    pub(super) fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
        }
    }

    /// Signs one request. `query` must carry decoded key/value pairs; the
    /// canonical encoding is applied here. `extra_headers` carries any
    /// additional headers that must be signed (S3 requires every `x-amz-*`
    /// header in the signature), lowercase names.
    pub(super) fn sign(
        &self,
        service: &str,
        method: &str,
        host: &str,
        path: &str,
        query: &[(String, String)],
        extra_headers: &[(String, String)],
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> SignedHeaders {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let content_sha256 = hex::encode(Sha256::digest(payload));

        let mut headers: Vec<(String, String)> = vec![
            ("host".to_string(), host.to_string()),
            ("x-amz-content-sha256".to_string(), content_sha256.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        headers.extend(
            extra_headers
                .iter()
                .map(|(key, value)| (key.to_lowercase(), value.trim().to_string())),
        );
        headers.sort();

        let canonical_uri = canonical_uri(path);
        let canonical_query = canonical_query(query);
        let canonical_headers: String = headers
            .iter()
            .map(|(key, value)| format!("{}:{}\n", key, value))
            .collect();
        let signed_headers = headers
            .iter()
            .map(|(key, _)| key.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, canonical_uri, canonical_query, canonical_headers, signed_headers,
            content_sha256
        );

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, service
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = self.derive_signing_key(&date_stamp, service);
        let signature = hex::encode(hmac(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.access_key_id, credential_scope, signed_headers, signature
        );

        SignedHeaders {
            amz_date,
            content_sha256,
            authorization,
        }
    }

    /// Derives the signing key: HMAC chain over date, region, service.
    fn derive_signing_key(&self, date_stamp: &str, service: &str) -> Vec<u8> {
        let secret = format!("AWS4{}", self.secret_access_key);
        let k_date = hmac(secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac(&k_date, self.region.as_bytes());
        let k_service = hmac(&k_region, service.as_bytes());
        hmac(&k_service, b"aws4_request")
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Percent-encodes a string with the SigV4 unreserved character set.
pub(super) fn uri_encode(value: &str, encode_slash: bool) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            b'/' if !encode_slash => encoded.push('/'),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        uri_encode(path, false)
    }
}

fn canonical_query(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(key, value)| (uri_encode(key, true), uri_encode(value, true)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_uri_encode() {
        assert_eq!(uri_encode("a b/c", false), "a%20b/c");
        assert_eq!(uri_encode("a b/c", true), "a%20b%2Fc");
        assert_eq!(uri_encode("key=value&x", true), "key%3Dvalue%26x");
        assert_eq!(uri_encode("unreserved-._~09AZaz", true), "unreserved-._~09AZaz");
    }

    #[test]
    fn test_canonical_query_sorts_pairs() {
        let query = vec![
            ("Version".to_string(), "2016-11-15".to_string()),
            ("Action".to_string(), "DescribeInstances".to_string()),
        ];
        assert_eq!(
            canonical_query(&query),
            "Action=DescribeInstances&Version=2016-11-15"
        );
    }

    #[test]
    fn test_signature_is_stable() {
        // Signing the same request twice yields the same material.
        let signer = SigV4Signer::new("AKIDEXAMPLE", "secret", "us-east-1");
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let a = signer.sign("ec2", "POST", "ec2.us-east-1.amazonaws.com", "/", &[], &[], b"x", now);
        let b = signer.sign("ec2", "POST", "ec2.us-east-1.amazonaws.com", "/", &[], &[], b"x", now);
        assert_eq!(a.authorization, b.authorization);
        assert_eq!(a.amz_date, "20240501T120000Z");
        assert_eq!(a.content_sha256, hex::encode(Sha256::digest(b"x")));
        assert!(a
            .authorization
            .starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240501/us-east-1/ec2/aws4_request"));
    }

    #[test]
    fn test_extra_headers_join_the_signed_set() {
        let signer = SigV4Signer::new("AKIDEXAMPLE", "secret", "us-east-1");
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let plain = signer.sign("s3", "PUT", "s3.us-east-1.amazonaws.com", "/b/o", &[], &[], b"", now);
        let tagged = signer.sign(
            "s3",
            "PUT",
            "s3.us-east-1.amazonaws.com",
            "/b/o",
            &[],
            &[("x-amz-tagging".to_string(), "k=v".to_string())],
            b"",
            now,
        );

        assert!(tagged.authorization.contains("x-amz-tagging"));
        assert_ne!(plain.authorization, tagged.authorization);
    }

    #[test]
    fn test_signing_key_derivation_reference_vector() {
        // AWS documentation test vector for the key-derivation chain.
        let signer = SigV4Signer::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "us-east-1",
        );
        let key = signer.derive_signing_key("20150830", "iam");
        assert_eq!(
            hex::encode(key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }
}
