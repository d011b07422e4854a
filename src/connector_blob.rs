//! Azure Blob Storage connector.
//!
//! Lists, downloads and uploads blobs through the Blob service REST API
//! with Shared Key authentication. Used as an input source for `kb build`
//! (`--container`/`--prefix`), as the destination of `--upload-jsonl`, and
//! as the JSONL source for `kb ingest --jsonl-blob`.
//!
//! # Configuration
//!
//! ```toml
//! [blob]
//! account_name = "kbstorage"
//! container = "obras"
//! prefix = "atribuicao/"
//! # endpoint = "http://127.0.0.1:10000/devstoreaccount1"   # Azurite
//! ```
//!
//! # Environment Variables
//!
//! - `AZURE_STORAGE_ACCOUNT` overrides `blob.account_name`
//! - `AZURE_STORAGE_KEY` is required (base64 account key)
//!
//! # Authentication
//!
//! Every request carries `Authorization: SharedKey {account}:{signature}`
//! where the signature is base64(HMAC-SHA256(account key, string-to-sign)).
//! The string-to-sign is the verb, the twelve standard header slots, the
//! sorted `x-ms-*` headers and the canonicalized resource
//! (`/{account}{path}` plus sorted query parameters).
//!
//! # Pagination
//!
//! Listings follow `NextMarker` until the service returns an empty marker.

use std::time::Duration;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use globset::GlobSet;
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use sha2::Sha256;

use crate::config::{InputConfig, StorageCredentials};
use crate::error::BlobError;
use crate::models::{RawFile, SourceEntry};
use crate::traits::{sort_entries, FileSource};

type HmacSha256 = Hmac<Sha256>;

/// REST API version sent as `x-ms-version`.
pub const BLOB_API_VERSION: &str = "2021-08-06";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const LIST_PAGE_SIZE: &str = "5000";

/// One entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobItem {
    pub name: String,
    pub size: u64,
}

/// Signed client for one storage account.
pub struct BlobClient {
    http: reqwest::blocking::Client,
    base_url: String,
    /// URL path of the endpoint (`""`, or `/devstoreaccount1` for Azurite).
    base_path: String,
    account: String,
    key: Vec<u8>,
}

impl BlobClient {
    pub fn new(creds: &StorageCredentials, endpoint: Option<&str>) -> Result<Self, BlobError> {
        let key = STANDARD.decode(creds.account_key.trim())?;
        let base_url = endpoint
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://{}.blob.core.windows.net", creds.account_name));
        let base_path = reqwest::Url::parse(&base_url)
            .map(|u| u.path().trim_end_matches('/').to_string())
            .map_err(|e| BlobError::Listing(format!("invalid blob endpoint {}: {}", base_url, e)))?;
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url,
            base_path,
            account: creds.account_name.clone(),
            key,
        })
    }

    /// Every blob under `prefix`, following pagination.
    pub fn list(&self, container: &str, prefix: &str) -> Result<Vec<BlobItem>, BlobError> {
        let mut items = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut query = vec![
                ("comp", "list".to_string()),
                ("maxresults", LIST_PAGE_SIZE.to_string()),
                ("restype", "container".to_string()),
            ];
            if !prefix.is_empty() {
                query.push(("prefix", prefix.to_string()));
            }
            if let Some(ref m) = marker {
                query.push(("marker", m.clone()));
            }

            let path = format!("/{}", uri_encode(container));
            let resp = self.send("GET", &path, &query, None, "list")?;
            let xml = resp.text()?;
            let (page, next) = parse_blob_list(&xml)?;
            items.extend(page);

            match next {
                Some(m) => marker = Some(m),
                None => break,
            }
        }

        Ok(items)
    }

    pub fn download(&self, container: &str, name: &str) -> Result<Vec<u8>, BlobError> {
        let path = blob_path(container, name);
        let resp = self.send("GET", &path, &[], None, "download")?;
        Ok(resp.bytes()?.to_vec())
    }

    /// Upload (overwrite) a block blob in a single request.
    pub fn upload(
        &self,
        container: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BlobError> {
        let path = blob_path(container, name);
        self.send("PUT", &path, &[], Some((bytes, content_type)), "upload")?;
        Ok(())
    }

    fn send(
        &self,
        verb: &str,
        path: &str,
        query: &[(&str, String)],
        body: Option<(Vec<u8>, &str)>,
        operation: &'static str,
    ) -> Result<reqwest::blocking::Response, BlobError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let mut ms_headers = vec![
            ("x-ms-date", date),
            ("x-ms-version", BLOB_API_VERSION.to_string()),
        ];
        if body.is_some() {
            ms_headers.push(("x-ms-blob-type", "BlockBlob".to_string()));
        }

        let (content_length, content_type) = match &body {
            Some((bytes, ct)) => (bytes.len(), *ct),
            None => (0, ""),
        };
        let resource = format!("/{}{}{}", self.account, self.base_path, path);
        let sts = string_to_sign(
            verb,
            content_length,
            content_type,
            &ms_headers,
            &resource,
            query,
        );
        let authorization = format!("SharedKey {}:{}", self.account, sign(&self.key, &sts));

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            let qs = query
                .iter()
                .map(|(k, v)| format!("{}={}", k, uri_encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            format!("{}{}?{}", self.base_url, path, qs)
        };

        let method = reqwest::Method::from_bytes(verb.as_bytes())
            .map_err(|e| BlobError::Listing(e.to_string()))?;
        let mut req = self
            .http
            .request(method, &url)
            .header("Authorization", authorization);
        for (k, v) in &ms_headers {
            req = req.header(*k, v);
        }
        if let Some((bytes, ct)) = body {
            req = req.header("Content-Type", ct).body(bytes);
        }

        let resp = req.send()?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().unwrap_or_default();
            return Err(BlobError::Http {
                operation,
                status,
                body: body.chars().take(500).collect(),
            });
        }
        Ok(resp)
    }
}

/// Input files stored in a blob container.
pub struct BlobSource {
    client: BlobClient,
    container: String,
    prefix: String,
    include: GlobSet,
    exclude: GlobSet,
}

impl BlobSource {
    pub fn new(
        client: BlobClient,
        container: &str,
        prefix: &str,
        input: &InputConfig,
    ) -> Result<Self> {
        let (include, exclude) = crate::connector_fs::input_globsets(input)?;
        Ok(Self {
            client,
            container: container.to_string(),
            prefix: prefix.to_string(),
            include,
            exclude,
        })
    }
}

impl FileSource for BlobSource {
    fn label(&self) -> String {
        format!("blob:{}/{}", self.container, self.prefix)
    }

    fn list(&self) -> Result<Vec<SourceEntry>> {
        let mut entries: Vec<SourceEntry> = self
            .client
            .list(&self.container, &self.prefix)?
            .into_iter()
            .filter(|b| b.size > 0 && !b.name.ends_with('/'))
            .filter(|b| !self.exclude.is_match(&b.name) && self.include.is_match(&b.name))
            .map(|b| SourceEntry {
                relative_path: b.name,
                size: b.size,
            })
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn fetch(&self, entry: &SourceEntry) -> Result<RawFile> {
        let bytes = self.client.download(&self.container, &entry.relative_path)?;
        Ok(RawFile {
            relative_path: entry.relative_path.clone(),
            bytes,
        })
    }
}

fn blob_path(container: &str, name: &str) -> String {
    let encoded = name.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
    format!("/{}/{}", uri_encode(container), encoded)
}

/// Shared Key string-to-sign for the Blob service.
fn string_to_sign(
    verb: &str,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(&str, String)],
    canonical_resource: &str,
    query: &[(&str, String)],
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .collect();
    headers.sort_by(|a, b| a.0.cmp(&b.0));
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let mut params: Vec<(String, &str)> = query
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
        .collect();
    params.sort_by(|a, b| a.0.cmp(&b.0));
    let canonical_query: String = params
        .iter()
        .map(|(k, v)| format!("\n{}:{}", k, v))
        .collect();

    // Content-Encoding, Content-Language, Content-Length, Content-MD5,
    // Content-Type, Date, If-Modified-Since, If-Match, If-None-Match,
    // If-Unmodified-Since, Range.
    format!(
        "{}\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}{}{}",
        verb, length, content_type, canonical_headers, canonical_resource, canonical_query
    )
}

fn sign(key: &[u8], string_to_sign: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(string_to_sign.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// URI-encode a string per RFC 3986: everything except `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

/// Parse one `List Blobs` page into its items and the next marker.
fn parse_blob_list(xml: &str) -> Result<(Vec<BlobItem>, Option<String>), BlobError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut next_marker = None;
    let mut stack: Vec<String> = Vec::new();
    let mut name = String::new();
    let mut size = 0u64;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if tag == "Blob" {
                    name.clear();
                    size = 0;
                }
                stack.push(tag);
            }
            Ok(Event::Text(t)) => {
                let value = t
                    .unescape()
                    .map_err(|e| BlobError::Listing(e.to_string()))?;
                let tail: Vec<&str> = stack.iter().rev().take(2).map(String::as_str).collect();
                match tail.as_slice() {
                    ["Name", "Blob"] => name = value.into_owned(),
                    ["Content-Length", "Properties"] => {
                        size = value.trim().parse().map_err(|_| {
                            BlobError::Listing(format!("invalid Content-Length: {}", value))
                        })?;
                    }
                    ["NextMarker", ..] => {
                        if !value.is_empty() {
                            next_marker = Some(value.into_owned());
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                if stack.pop().as_deref() == Some("Blob") && !name.is_empty() {
                    items.push(BlobItem {
                        name: std::mem::take(&mut name),
                        size,
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(BlobError::Listing(e.to_string())),
            _ => {}
        }
    }

    Ok((items, next_marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_encode() {
        assert_eq!(uri_encode("simple"), "simple");
        assert_eq!(uri_encode("Portaria 45.pdf"), "Portaria%2045.pdf");
        assert_eq!(uri_encode("ç"), "%C3%A7");
    }

    #[test]
    fn test_blob_path_keeps_separators() {
        assert_eq!(
            blob_path("obras", "jsonl/kb atribuicao.jsonl"),
            "/obras/jsonl/kb%20atribuicao.jsonl"
        );
    }

    #[test]
    fn test_string_to_sign_for_list() {
        let headers = vec![
            ("x-ms-version", BLOB_API_VERSION.to_string()),
            ("x-ms-date", "Fri, 17 Oct 2025 12:00:00 GMT".to_string()),
        ];
        let query = vec![
            ("restype", "container".to_string()),
            ("comp", "list".to_string()),
        ];
        let sts = string_to_sign("GET", 0, "", &headers, "/acct/obras", &query);
        assert_eq!(
            sts,
            "GET\n\n\n\n\n\n\n\n\n\n\n\n\
             x-ms-date:Fri, 17 Oct 2025 12:00:00 GMT\n\
             x-ms-version:2021-08-06\n\
             /acct/obras\ncomp:list\nrestype:container"
        );
    }

    #[test]
    fn test_string_to_sign_for_upload() {
        let headers = vec![
            ("x-ms-date", "d".to_string()),
            ("x-ms-version", "v".to_string()),
            ("x-ms-blob-type", "BlockBlob".to_string()),
        ];
        let sts = string_to_sign(
            "PUT",
            42,
            "application/x-ndjson",
            &headers,
            "/acct/obras/kb.jsonl",
            &[],
        );
        assert_eq!(
            sts,
            "PUT\n\n\n42\n\napplication/x-ndjson\n\n\n\n\n\n\n\
             x-ms-blob-type:BlockBlob\nx-ms-date:d\nx-ms-version:v\n\
             /acct/obras/kb.jsonl"
        );
    }

    #[test]
    fn test_sign_known_vector() {
        assert_eq!(sign(b"key", "hello"), "kwezuRXvtRcf8U2MtV+8x5jGwO8UVtZt7RpqpyOli3s=");
    }

    #[test]
    fn test_parse_blob_list() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://acct.blob.core.windows.net/" ContainerName="obras">
  <Prefix>atribuicao/</Prefix>
  <Blobs>
    <Blob>
      <Name>atribuicao/AC_2025_Portaria_45.pdf</Name>
      <Properties>
        <Content-Length>1024</Content-Length>
        <Content-Type>application/pdf</Content-Type>
      </Properties>
    </Blob>
    <Blob>
      <Name>atribuicao/Gloss&#225;rio.docx</Name>
      <Properties><Content-Length>0</Content-Length></Properties>
    </Blob>
  </Blobs>
  <NextMarker>2!96!MDAwMDE</NextMarker>
</EnumerationResults>"#;
        let (items, marker) = parse_blob_list(xml).unwrap();
        assert_eq!(
            items,
            vec![
                BlobItem {
                    name: "atribuicao/AC_2025_Portaria_45.pdf".to_string(),
                    size: 1024
                },
                BlobItem {
                    name: "atribuicao/Glossário.docx".to_string(),
                    size: 0
                },
            ]
        );
        assert_eq!(marker.as_deref(), Some("2!96!MDAwMDE"));
    }

    #[test]
    fn test_parse_blob_list_last_page() {
        let xml = "<EnumerationResults><Blobs></Blobs><NextMarker /></EnumerationResults>";
        let (items, marker) = parse_blob_list(xml).unwrap();
        assert!(items.is_empty());
        assert!(marker.is_none());
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        let creds = StorageCredentials {
            account_name: "acct".to_string(),
            account_key: "not base64!!".to_string(),
        };
        assert!(matches!(
            BlobClient::new(&creds, None),
            Err(BlobError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_azurite_endpoint_path_is_signed() {
        let creds = StorageCredentials {
            account_name: "devstoreaccount1".to_string(),
            account_key: STANDARD.encode(b"secret"),
        };
        let client =
            BlobClient::new(&creds, Some("http://127.0.0.1:10000/devstoreaccount1/")).unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:10000/devstoreaccount1");
        assert_eq!(client.base_path, "/devstoreaccount1");
    }
}
