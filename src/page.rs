//! Page readers: named field values for a page identifier.
//!
//! A [`PageReader`] turns a page id (brand, ticket, ...) into a map of named fields, or `None`
//! when the page carries no such information. Two readers are provided:
//!
//! - [`JsonApiReader`] fetches `{base}/{id}` from a JSON API and flattens the top-level object
//! - [`HtmlPageReader`] fetches an HTML page and reads labelled table cells
//!
//! The HTML extraction functions are pure and work on any document, so they can be used on
//! saved pages as well.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::Client;
use scraper::{ElementRef, Html, Selector};

use crate::error::{PageError, PageResult};

/// Field name to value.
pub type PageFields = BTreeMap<String, String>;

/// Heading above the license tables of a ticket page.
pub const LICENSE_INFORMATION_HEADING: &str = "License Information";

/// Labels read off a provisioning ticket by [`HtmlPageReader::ticket`].
pub const TICKET_LABELS: [(&str, &str); 2] = [
    ("Data Center:", "datacenter"),
    ("Requested Brand ID:", "brandid"),
];

static TD: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static TBODY: LazyLock<Selector> = LazyLock::new(|| selector("tbody"));
static ANY: LazyLock<Selector> = LazyLock::new(|| selector("*"));
static AUDIT_ROWS: LazyLock<Selector> = LazyLock::new(|| selector(".audit-log-table tr"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

/// Reads named fields off a page.
pub trait PageReader {
    /// Fields of `page_id`, or `None` when the page does not carry them.
    fn read_fields(&self, page_id: &str) -> PageResult<Option<PageFields>>;
}

/// Outcome of reading one page in [`read_all`].
#[derive(Debug)]
pub struct PageRead {
    pub page_id: String,
    pub result: PageResult<Option<PageFields>>,
}

/// Read every non-blank id in order. A failure on one page does not stop the others.
pub fn read_all<R, S>(reader: &R, page_ids: &[S]) -> Vec<PageRead>
where
    R: PageReader + ?Sized,
    S: AsRef<str>,
{
    let mut out = Vec::with_capacity(page_ids.len());
    for id in page_ids {
        let id = id.as_ref().trim();
        if id.is_empty() {
            continue;
        }
        let result = reader.read_fields(id);
        match &result {
            Ok(Some(fields)) => tracing::info!(page_id = id, fields = fields.len(), "read page"),
            Ok(None) => tracing::warn!(page_id = id, "no information found on page"),
            Err(e) => tracing::error!(page_id = id, error = %e, "page read failed"),
        }
        out.push(PageRead {
            page_id: id.to_string(),
            result,
        });
    }
    out
}

fn http_client() -> PageResult<Client> {
    Ok(Client::builder()
        .user_agent(concat!("tablesync/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// GET `url`; `Ok(None)` on 404.
fn fetch_body(client: &Client, url: Url, token: Option<&str>) -> PageResult<Option<String>> {
    let mut request = client.get(url);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let resp = request.send()?;
    match resp.status() {
        StatusCode::NOT_FOUND => Ok(None),
        status if status.is_success() => Ok(Some(resp.text()?)),
        status => Err(PageError::Http {
            status: status.as_u16(),
        }),
    }
}

/// Reads `{base}/{id}` from a JSON API.
#[derive(Debug, Clone)]
pub struct JsonApiReader {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl JsonApiReader {
    /// Reader for `base_url`, optionally sending a bearer token.
    pub fn new(base_url: &str, token: Option<String>) -> PageResult<Self> {
        let base = Url::parse(base_url).map_err(|e| PageError::Malformed {
            message: format!("invalid base url '{base_url}': {e}"),
        })?;
        Ok(Self {
            client: http_client()?,
            base,
            token,
        })
    }

    fn url_for(&self, page_id: &str) -> PageResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| PageError::Malformed {
                message: format!("base url '{}' cannot carry a path", self.base),
            })?
            .pop_if_empty()
            .push(page_id);
        Ok(url)
    }
}

impl PageReader for JsonApiReader {
    fn read_fields(&self, page_id: &str) -> PageResult<Option<PageFields>> {
        let url = self.url_for(page_id)?;
        match fetch_body(&self.client, url, self.token.as_deref())? {
            Some(body) => flatten_json_object(&body).map(Some),
            None => Ok(None),
        }
    }
}

/// Flatten a JSON object into string fields.
///
/// Strings are kept as-is, nulls become empty strings, and everything else (numbers, booleans,
/// nested arrays and objects) is kept as JSON text.
pub fn flatten_json_object(body: &str) -> PageResult<PageFields> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| PageError::Malformed {
            message: e.to_string(),
        })?;
    let serde_json::Value::Object(map) = value else {
        return Err(PageError::Malformed {
            message: "expected a json object".to_string(),
        });
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let text = match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, text)
        })
        .collect())
}

/// Reads labelled table cells off HTML pages.
#[derive(Debug, Clone)]
pub struct HtmlPageReader {
    client: Client,
    url_template: String,
    token: Option<String>,
    labels: Vec<(String, String)>,
}

impl HtmlPageReader {
    /// Reader for pages at `url_template` (`{id}` is replaced by the page id), extracting each
    /// `(label, field)` pair.
    pub fn new<L, F>(url_template: impl Into<String>, labels: &[(L, F)]) -> PageResult<Self>
    where
        L: AsRef<str>,
        F: AsRef<str>,
    {
        Ok(Self {
            client: http_client()?,
            url_template: url_template.into(),
            token: None,
            labels: labels
                .iter()
                .map(|(l, f)| (l.as_ref().to_string(), f.as_ref().to_string()))
                .collect(),
        })
    }

    /// Reader for provisioning tickets (data center and requested brand id).
    pub fn ticket(url_template: impl Into<String>) -> PageResult<Self> {
        Self::new(url_template, &TICKET_LABELS)
    }

    /// Send `token` as a bearer credential.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url_for(&self, page_id: &str) -> PageResult<Url> {
        let raw = self.url_template.replace("{id}", page_id);
        Url::parse(&raw).map_err(|e| PageError::Malformed {
            message: format!("invalid page url '{raw}': {e}"),
        })
    }
}

impl PageReader for HtmlPageReader {
    fn read_fields(&self, page_id: &str) -> PageResult<Option<PageFields>> {
        let url = self.url_for(page_id)?;
        let Some(body) = fetch_body(&self.client, url, self.token.as_deref())? else {
            return Ok(None);
        };
        let html = Html::parse_document(&body);
        Ok(labelled_fields(&html, self.labels.as_slice()))
    }
}

/// Visible text of an element with whitespace runs collapsed.
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// For each `(label, field)`, the text of the cell following the `td` whose text is `label`.
///
/// Returns `None` unless every label is found.
pub fn labelled_fields<L, F>(html: &Html, labels: &[(L, F)]) -> Option<PageFields>
where
    L: AsRef<str>,
    F: AsRef<str>,
{
    let mut fields = PageFields::new();
    for (label, field) in labels {
        let value = html
            .select(&TD)
            .find(|td| element_text(*td) == label.as_ref().trim())
            .and_then(|td| {
                td.next_siblings()
                    .filter_map(ElementRef::wrap)
                    .find(|sib| sib.value().name() == "td")
            })
            .map(element_text)?;
        fields.insert(field.as_ref().to_string(), value);
    }
    Some(fields)
}

/// Key/value pairs of the tables under the "License Information" heading, one map per `tbody`.
///
/// Cells alternate key, value, key, value; a trailing key without value is dropped. A page
/// without the heading yields no tables.
pub fn label_value_pairs(html: &Html) -> Vec<PageFields> {
    let heading = html.select(&ANY).find(|el| {
        el.children()
            .filter_map(|c| c.value().as_text())
            .any(|t| t.trim() == LICENSE_INFORMATION_HEADING)
    });
    let Some(container) = heading
        .and_then(|h| h.parent())
        .and_then(ElementRef::wrap)
    else {
        return Vec::new();
    };

    container
        .select(&TBODY)
        .map(|tbody| {
            let cells: Vec<String> = tbody.select(&TD).map(element_text).collect();
            cells
                .chunks_exact(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect()
        })
        .collect()
}

/// Text of every row of the `.audit-log-table` on a ticket page.
pub fn audit_log_rows(html: &Html) -> Vec<String> {
    html.select(&AUDIT_ROWS).map(element_text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_keeps_strings_and_serializes_the_rest() {
        let fields =
            flatten_json_object(r#"{"brandId":"acme","tier":3,"active":true,"dc":null,"tags":["a"]}"#)
                .unwrap();
        assert_eq!(fields["brandId"], "acme");
        assert_eq!(fields["tier"], "3");
        assert_eq!(fields["active"], "true");
        assert_eq!(fields["dc"], "");
        assert_eq!(fields["tags"], r#"["a"]"#);
    }

    #[test]
    fn flatten_rejects_non_objects() {
        assert!(flatten_json_object("[1,2]").is_err());
        assert!(flatten_json_object("not json").is_err());
    }

    #[test]
    fn json_reader_appends_id_segment() {
        let reader = JsonApiReader::new("https://api.example.com/odo-api/brand/", None).unwrap();
        assert_eq!(
            reader.url_for("acme corp").unwrap().as_str(),
            "https://api.example.com/odo-api/brand/acme%20corp"
        );
    }
}
