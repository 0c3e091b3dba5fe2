#![allow(async_fn_in_trait)]

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::process::Command;
use tracing::debug;
use tracing::instrument;

const USER_AGENT: &str = "User-Agent: patchwork-pr";

// -----------------------------------------------------------------------------
// Types

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub accept: String,
    /// Bearer token, sent as `Authorization` when present
    pub token: Option<String>,
    /// JSON body
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            accept: "application/json".to_string(),
            token: None,
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: String) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            ..Self::get(url)
        }
    }

    pub fn accept(mut self, accept: &str) -> Self {
        self.accept = accept.to_string();
        self
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

// -----------------------------------------------------------------------------
// HttpOps trait

/// Sends HTTP requests
#[cfg_attr(test, automock)]
pub trait HttpOps {
    /// Send the request; non-2xx statuses are returned, not turned into errors
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

// -----------------------------------------------------------------------------
// HttpResponse impl

impl HttpResponse {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into an error carrying the API message if any
    pub fn error_for_status(self, url: &str) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }

        if let Ok(error) = serde_json::from_slice::<ApiError>(&self.body) {
            bail!(
                "request to {} failed with status {}: {}",
                url,
                self.status,
                error.message
            );
        }
        bail!(
            "request to {} failed with status {}: {}",
            url,
            self.status,
            String::from_utf8_lossy(&self.body).trim()
        );
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).context("Failed to decode JSON response")
    }

    /// The `rel="next"` target of the `Link` header
    pub fn next_link(&self) -> Option<String> {
        let link = self.header("link")?;
        link.split(',').find_map(|part| {
            let mut pieces = part.split(';');
            let target = pieces.next()?.trim();
            let is_next = pieces.any(|param| {
                let param = param.trim().replace(' ', "");
                param == "rel=\"next\"" || param == "rel=next"
            });
            if !is_next {
                return None;
            }
            target
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .map(str::to_string)
        })
    }

    /// The `filename` parameter of an attachment `Content-Disposition` header
    pub fn attachment_filename(&self) -> Option<String> {
        let disposition = self.header("content-disposition")?;
        let mut parts = disposition.split(';');
        if !parts.next()?.trim().eq_ignore_ascii_case("attachment") {
            return None;
        }
        parts.find_map(|param| {
            let (key, value) = param.split_once('=')?;
            if !key.trim().eq_ignore_ascii_case("filename") {
                return None;
            }
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then(|| value.to_string())
        })
    }
}

/// GET every page of a JSON list endpoint by following `Link: rel="next"`.
pub async fn get_all_pages<T, H>(http: &H, url: &str, token: Option<&str>) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    H: HttpOps,
{
    let mut items = Vec::new();
    let mut next = Some(url.to_string());

    while let Some(url) = next {
        let mut request = HttpRequest::get(&url);
        if let Some(token) = token {
            request = request.bearer(token);
        }
        let response = http.send(&request).await?.error_for_status(&url)?;
        let mut page: Vec<T> = response.json()?;
        items.append(&mut page);
        next = response.next_link();
        if next.is_some() {
            debug!("Reading next page");
        }
    }

    Ok(items)
}

// -----------------------------------------------------------------------------
// CurlClient

/// HTTP client using curl
pub struct CurlClient;

impl HttpOps for CurlClient {
    #[instrument(skip_all, fields(url = %request.url))]
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut args = vec![
            "-sS".to_string(),
            "-D".to_string(),
            "-".to_string(),
            "-w".to_string(),
            "\n%{http_code}".to_string(),
            "-H".to_string(),
            format!("Accept: {}", request.accept),
            "-H".to_string(),
            USER_AGENT.to_string(),
        ];
        if let Some(token) = &request.token {
            args.push("-H".to_string());
            args.push(format!("Authorization: Bearer {}", token));
        }
        if let Method::Post = request.method {
            args.push("-X".to_string());
            args.push("POST".to_string());
        }
        if let Some(body) = &request.body {
            args.push("-H".to_string());
            args.push("Content-Type: application/json".to_string());
            args.push("-d".to_string());
            args.push(body.clone());
        }
        args.push(request.url.clone());

        let output = Command::new("curl")
            .args(&args)
            .output()
            .await
            .context("Failed to execute curl command")?;

        if !output.status.success() {
            bail!(
                "curl command failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        parse_curl_output(&output.stdout)
    }
}

/// Parse `curl -D - -w "\n%{http_code}"` output: header blocks, body, status.
pub fn parse_curl_output(stdout: &[u8]) -> Result<HttpResponse> {
    let split = stdout
        .iter()
        .rposition(|&b| b == b'\n')
        .context("curl output has no status line")?;
    let status: u16 = std::str::from_utf8(&stdout[split + 1..])?
        .trim()
        .parse()
        .context("curl output has an invalid status code")?;
    let mut rest = &stdout[..split];

    // Interim responses (100 Continue, proxy CONNECT) come first, each with its
    // own header block
    let mut headers = Vec::new();
    while rest.starts_with(b"HTTP/") {
        let Some(end) = find(rest, b"\r\n\r\n") else {
            headers = parse_headers(rest);
            rest = &[];
            break;
        };
        headers = parse_headers(&rest[..end]);
        rest = &rest[end + 4..];
    }

    Ok(HttpResponse {
        status,
        headers,
        body: rest.to_vec(),
    })
}

fn parse_headers(block: &[u8]) -> Vec<(String, String)> {
    String::from_utf8_lossy(block)
        .lines()
        .skip(1)
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(headers: &[(&str, &str)]) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: vec![],
        }
    }

    #[test]
    fn test_parse_curl_output() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nLink: <https://pw/api/projects/?page=2>; rel=\"next\"\r\n\r\n[1,2]\n200";
        let response = parse_curl_output(raw).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.body, b"[1,2]");
        assert_eq!(
            response.next_link().as_deref(),
            Some("https://pw/api/projects/?page=2")
        );
    }

    #[test]
    fn test_parse_curl_output_skips_continue_block() {
        let raw =
            b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nX-Final: yes\r\n\r\n{}\n201";
        let response = parse_curl_output(raw).unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.header("x-final"), Some("yes"));
        assert_eq!(response.body, b"{}");
    }

    #[test]
    fn test_parse_curl_output_body_with_newlines() {
        let raw = b"HTTP/2 200\r\n\r\nline one\nline two\n\n200";
        let response = parse_curl_output(raw).unwrap();
        assert_eq!(response.body, b"line one\nline two\n");
    }

    #[test]
    fn test_parse_curl_output_without_status() {
        assert!(parse_curl_output(b"garbage").is_err());
    }

    #[test]
    fn test_next_link_among_several() {
        let response = response_with(&[(
            "Link",
            "<https://x/?page=1>; rel=\"prev\", <https://x/?page=3>; rel=\"next\"",
        )]);
        assert_eq!(response.next_link().as_deref(), Some("https://x/?page=3"));

        let last = response_with(&[("Link", "<https://x/?page=1>; rel=\"prev\"")]);
        assert_eq!(last.next_link(), None);
    }

    #[test]
    fn test_attachment_filename() {
        let response = response_with(&[(
            "Content-Disposition",
            "attachment; filename=v2-1-3-Bluetooth-fix.patch",
        )]);
        assert_eq!(
            response.attachment_filename().as_deref(),
            Some("v2-1-3-Bluetooth-fix.patch")
        );

        let quoted = response_with(&[("content-disposition", "attachment; filename=\"a b.patch\"")]);
        assert_eq!(quoted.attachment_filename().as_deref(), Some("a b.patch"));

        let inline = response_with(&[("Content-Disposition", "inline; filename=x.patch")]);
        assert_eq!(inline.attachment_filename(), None);
    }

    #[test]
    fn test_error_for_status_uses_api_message() {
        let response = HttpResponse {
            status: 422,
            headers: vec![],
            body: br#"{"message":"Validation Failed"}"#.to_vec(),
        };
        let err = response.error_for_status("https://api/x").unwrap_err();
        assert!(err.to_string().contains("Validation Failed"));
    }

    #[tokio::test]
    async fn test_get_all_pages_follows_next() {
        let mut http = MockHttpOps::new();
        http.expect_send()
            .withf(|req| req.url == "https://pw/items/" && req.token.as_deref() == Some("t"))
            .times(1)
            .returning(|_| {
                Ok(HttpResponse {
                    status: 200,
                    headers: vec![(
                        "Link".to_string(),
                        "<https://pw/items/?page=2>; rel=\"next\"".to_string(),
                    )],
                    body: b"[1, 2]".to_vec(),
                })
            });
        http.expect_send()
            .withf(|req| req.url == "https://pw/items/?page=2")
            .times(1)
            .returning(|_| {
                Ok(HttpResponse {
                    status: 200,
                    headers: vec![],
                    body: b"[3]".to_vec(),
                })
            });

        let items: Vec<u32> = get_all_pages(&http, "https://pw/items/", Some("t"))
            .await
            .unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }
}
