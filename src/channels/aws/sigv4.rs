//! AWS Signature Version 4 request signing.

use crate::channels::aws::AwsCredentials;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Request;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(format!("Failed to create HMAC: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Derive the per-day, per-region, per-service signing key
pub fn signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Percent-encode everything but the unreserved set
fn uri_encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

fn canonical_query(request: &Request) -> String {
    let mut pairs: Vec<(String, String)> = request
        .url()
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn host_header(request: &Request) -> Result<String> {
    let url = request.url();
    let host = url
        .host_str()
        .ok_or_else(|| AppError::Validation(format!("URL '{}' has no host", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Sign `request` in place, adding `x-amz-date`, an optional security token
/// and the `Authorization` header.
///
/// Signs `host`, `x-amz-date`, and `content-type` / `x-amz-security-token`
/// when present. The body must be buffered.
pub fn sign(
    request: &mut Request,
    credentials: &AwsCredentials,
    region: &str,
    service: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();

    let header_value = |v: &str| {
        HeaderValue::from_str(v)
            .map_err(|e| AppError::Validation(format!("Invalid header value: {}", e)))
    };
    request
        .headers_mut()
        .insert("x-amz-date", header_value(&amz_date)?);
    if let Some(token) = &credentials.session_token {
        request
            .headers_mut()
            .insert("x-amz-security-token", header_value(token)?);
    }

    let mut signed: Vec<(String, String)> = vec![("host".to_string(), host_header(request)?)];
    for name in ["content-type", "x-amz-date", "x-amz-security-token"] {
        if let Some(value) = request.headers().get(name) {
            let value = value
                .to_str()
                .map_err(|e| AppError::Validation(format!("Invalid {} header: {}", name, e)))?;
            signed.push((name.to_string(), value.trim().to_string()));
        }
    }
    signed.sort();

    let canonical_headers: String = signed
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();
    let signed_headers = signed
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let body = request.body().and_then(|b| b.as_bytes()).unwrap_or_default();
    let path = match request.url().path() {
        "" => "/",
        path => path,
    };

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method().as_str(),
        path,
        canonical_query(request),
        canonical_headers,
        signed_headers,
        sha256_hex(body)
    );

    let scope = format!("{}/{}/{}/aws4_request", date_stamp, region, service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(&credentials.secret_access_key, &date_stamp, region, service)?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.access_key_id, scope, signed_headers, signature
    );
    request
        .headers_mut()
        .insert(AUTHORIZATION, header_value(&authorization)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::{Method, Url};

    const SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    #[test]
    fn test_signing_key_reference_vector() {
        let key = signing_key(SECRET, "20150830", "us-east-1", "iam").unwrap();
        assert_eq!(
            hex::encode(key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn test_sign_get_vanilla() {
        let mut request = Request::new(
            Method::GET,
            Url::parse("https://example.amazonaws.com/").unwrap(),
        );
        let credentials = AwsCredentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: SECRET.to_string(),
            session_token: None,
        };
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();

        sign(&mut request, &credentials, "us-east-1", "service", now).unwrap();

        let authorization = request.headers()[AUTHORIZATION].to_str().unwrap();
        assert_eq!(
            authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
        assert_eq!(request.headers()["x-amz-date"], "20150830T123600Z");
    }

    #[test]
    fn test_session_token_is_signed() {
        let mut request = Request::new(
            Method::POST,
            Url::parse("https://sns.us-east-1.amazonaws.com/").unwrap(),
        );
        let credentials = AwsCredentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: SECRET.to_string(),
            session_token: Some("token".to_string()),
        };

        sign(&mut request, &credentials, "us-east-1", "sns", Utc::now()).unwrap();

        let authorization = request.headers()[AUTHORIZATION].to_str().unwrap();
        assert!(authorization.contains("SignedHeaders=host;x-amz-date;x-amz-security-token"));
        assert_eq!(request.headers()["x-amz-security-token"], "token");
    }

    #[test]
    fn test_uri_encode() {
        assert_eq!(uri_encode("a b/c~"), "a%20b%2Fc~");
    }
}
