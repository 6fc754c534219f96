//! SSRF-guarded URL fetching.
//!
//! Redirects are never delegated to the HTTP client: each hop re-resolves
//! the target host through the [`NameResolver`] seam and rejects any
//! address outside the public classes before a request is issued. Binary
//! content types are refused; HTML is converted to rough plain text.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::redirect::Policy;
use scraper::{ElementRef, Html};
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::constants::{
    FETCH_HISTORY_CAP, FETCH_REDIRECT_LIMIT, FETCH_SPILL_CAP, FETCH_TIMEOUT_SECS,
};
use crate::error::{ToolError, ToolErrorKind};
use crate::session::SessionContext;

use super::traits::{Tool, parse_args};

/// Host resolution seam; swapped out in tests to simulate internal hosts.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<IpAddr>>;
}

pub struct SystemResolver;

#[async_trait]
impl NameResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Only globally routable unicast addresses are acceptable fetch targets.
pub fn ip_is_public(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation())
        }
        IpAddr::V6(v6) => {
            // fc00::/7 unique-local counts as private.
            let is_unique_local = (v6.segments()[0] & 0xfe00) == 0xfc00;
            // fe80::/10 link-local.
            let is_link_local = (v6.segments()[0] & 0xffc0) == 0xfe80;
            !(v6.is_loopback()
                || v6.is_multicast()
                || v6.is_unspecified()
                || is_unique_local
                || is_link_local)
        }
    }
}

fn mime_is_text(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("text/")
        || mime == "application/json"
        || mime == "application/xml"
        || mime == "application/javascript"
        || mime == "application/xhtml+xml"
        || mime.ends_with("+json")
        || mime.ends_with("+xml")
        || mime.is_empty()
}

/// Subtrees whose text never helps the model.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];
/// Elements that imply a line break in the extracted text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "tr", "table", "section", "article", "header",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "pre", "blockquote",
];

/// HTML to plain text: parse with a real HTML parser, walk the tree
/// skipping script/style subtrees, break on block elements, and collapse
/// blank runs. Entity decoding comes with the parser.
fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::with_capacity(html.len() / 2);
    collect_text(document.root_element(), &mut text);

    let mut collapsed = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        collapsed.push_str(trimmed);
        collapsed.push('\n');
    }
    collapsed
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_element) = ElementRef::wrap(child) {
            let tag = child_element.value().name();
            if SKIPPED_TAGS.contains(&tag) {
                continue;
            }
            collect_text(child_element, out);
            if BLOCK_TAGS.contains(&tag) {
                out.push('\n');
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct FetchUrlArgs {
    url: String,
}

pub struct FetchUrlTool {
    resolver: Arc<dyn NameResolver>,
    client: reqwest::Client,
}

impl FetchUrlTool {
    /// Redirects must stay disabled on the client: every hop goes back
    /// through the resolver guard, so a client that follows them on its own
    /// would bypass the SSRF check.
    pub fn new(resolver: Arc<dyn NameResolver>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|err| anyhow::anyhow!("failed to build fetch client: {err}"))?;
        Ok(Self { resolver, client })
    }

    async fn guard_host(&self, url: &Url) -> Result<(), ToolError> {
        let Some(host) = url.host() else {
            return Err(ToolError::other(format!("{url} has no host")));
        };
        let addrs = match host {
            url::Host::Ipv4(v4) => vec![IpAddr::V4(v4)],
            url::Host::Ipv6(v6) => vec![IpAddr::V6(v6)],
            url::Host::Domain(domain) => {
                let port = url.port_or_known_default().unwrap_or(443);
                self.resolver
                    .resolve(domain, port)
                    .await
                    .map_err(|err| ToolError::other(format!("cannot resolve {domain}: {err}")))?
            }
        };
        if addrs.is_empty() {
            return Err(ToolError::other(format!("{url} resolved to no addresses")));
        }
        if let Some(bad) = addrs.iter().find(|addr| !ip_is_public(addr)) {
            return Err(ToolError::new(
                ToolErrorKind::PrivateAddress,
                format!("{url} resolves to non-public address {bad}"),
            ));
        }
        Ok(())
    }

    async fn fetch(&self, raw_url: &str, session: &SessionContext) -> Result<String, ToolError> {
        let mut url = Url::parse(raw_url)
            .map_err(|err| ToolError::other(format!("invalid url: {err}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ToolError::new(
                ToolErrorKind::SchemeNotAllowed,
                format!("scheme '{}' is not allowed", url.scheme()),
            ));
        }

        let mut redirects = 0usize;
        let response = loop {
            self.guard_host(&url).await?;

            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|err| ToolError::other(format!("request failed: {err}")))?;

            if response.status().is_redirection() {
                let Some(location) = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                else {
                    return Err(ToolError::other(format!(
                        "{url} redirected without a Location header"
                    )));
                };
                redirects += 1;
                if redirects > FETCH_REDIRECT_LIMIT {
                    return Err(ToolError::new(
                        ToolErrorKind::RedirectLimit,
                        format!("more than {FETCH_REDIRECT_LIMIT} redirects"),
                    ));
                }
                let next = url
                    .join(location)
                    .map_err(|err| ToolError::other(format!("bad redirect target: {err}")))?;
                if !matches!(next.scheme(), "http" | "https") {
                    return Err(ToolError::new(
                        ToolErrorKind::SchemeNotAllowed,
                        format!("redirect to scheme '{}'", next.scheme()),
                    ));
                }
                debug!(from = %url, to = %next, "following redirect");
                url = next;
                continue;
            }
            break response;
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !mime_is_text(&content_type) {
            return Err(ToolError::new(
                ToolErrorKind::BinaryContent,
                format!("content type '{content_type}' is not text"),
            ));
        }

        let mut raw: Vec<u8> = Vec::new();
        let mut stream = response;
        loop {
            match stream
                .chunk()
                .await
                .map_err(|err| ToolError::other(format!("read failed: {err}")))?
            {
                Some(chunk) => {
                    let room = FETCH_SPILL_CAP.saturating_sub(raw.len());
                    if room == 0 {
                        break;
                    }
                    raw.extend_from_slice(&chunk[..chunk.len().min(room)]);
                }
                None => break,
            }
        }

        let body = String::from_utf8_lossy(&raw);
        let converted = if content_type.contains("html") {
            html_to_text(&body)
        } else {
            body.into_owned()
        };

        self.append_history(session, &url, status.as_u16(), raw.len());

        let inline = session.caps.cap_fetch_output(&converted, &raw);
        Ok(format!("{url} ({status})\n\n{inline}"))
    }

    fn append_history(&self, session: &SessionContext, url: &Url, status: u16, bytes: usize) {
        let path = session.scratch_dir().join("HISTORY.md");
        let over_cap = std::fs::metadata(&path)
            .map(|meta| meta.len() >= FETCH_HISTORY_CAP)
            .unwrap_or(false);
        if over_cap {
            return;
        }
        if std::fs::create_dir_all(session.scratch_dir()).is_err() {
            return;
        }
        let line = format!(
            "- {} {url} ({status}, {bytes} bytes)\n",
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
        );
        use std::io::Write;
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &'static str {
        "fetch_url"
    }

    fn description(&self) -> &'static str {
        "Fetch an http(s) URL. Follows up to 10 redirects, refuses private or internal addresses, and converts HTML to text."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "http or https URL"}
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionContext) -> Result<String, ToolError> {
        let args: FetchUrlArgs = parse_args(args)?;
        match tokio::time::timeout(
            Duration::from_secs(FETCH_TIMEOUT_SECS),
            self.fetch(&args.url, session),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ToolError::other(format!(
                "fetch of {} timed out after {FETCH_TIMEOUT_SECS}s",
                args.url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_and_private_classes() {
        let public: IpAddr = "93.184.216.34".parse().unwrap();
        assert!(ip_is_public(&public));

        for private in [
            "10.0.0.1",
            "172.16.5.5",
            "192.168.1.1",
            "127.0.0.1",
            "169.254.0.1",
            "224.0.0.1",
            "0.0.0.0",
        ] {
            let addr: IpAddr = private.parse().unwrap();
            assert!(!ip_is_public(&addr), "{private} should be rejected");
        }

        let v6_loopback: IpAddr = "::1".parse().unwrap();
        assert!(!ip_is_public(&v6_loopback));
        let v6_ula: IpAddr = "fd00::1".parse().unwrap();
        assert!(!ip_is_public(&v6_ula));
        let v6_link_local: IpAddr = "fe80::1".parse().unwrap();
        assert!(!ip_is_public(&v6_link_local));
        let v6_public: IpAddr = "2606:4700::1111".parse().unwrap();
        assert!(ip_is_public(&v6_public));
    }

    #[test]
    fn text_mime_detection() {
        assert!(mime_is_text("text/html; charset=utf-8"));
        assert!(mime_is_text("application/json"));
        assert!(mime_is_text("application/rss+xml"));
        assert!(!mime_is_text("image/png"));
        assert!(!mime_is_text("application/octet-stream"));
    }

    #[test]
    fn html_conversion_strips_markup() {
        let html = "<html><head><style>body { color: red }</style></head>\
                    <body><h1>Title</h1><script>alert(1)</script><p>Hello &amp; bye</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Hello & bye"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn html_conversion_survives_malformed_markup() {
        let html = "<div><p>outer <b>bold <i>nested</b> trailing<ul><li>one<li>two";
        let text = html_to_text(html);
        assert!(text.contains("outer bold nested"));
        assert!(text.contains("trailing"));
        assert!(text.contains("one"));
        assert!(text.contains("two"));
    }
}
