//! Coda REST API source.
//!
//! A table read is two paginated walks against the v1 API:
//!
//! 1. `GET /docs/{doc}/tables/{table}/columns` for the column titles (display order). This also
//!    gives an empty table its header.
//! 2. `GET /docs/{doc}/tables/{table}/rows?useColumnNames=true&valueFormat=simple` for the
//!    rows, each a map of column title to simple JSON value.
//!
//! Both walks follow `nextPageToken` until the API stops returning one. The page parsers are
//! exposed so they can be exercised without network access.

use reqwest::Url;
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::config::CodaConfig;
use crate::error::{SourceError, SourceResult};
use crate::types::Value;

use super::{DocumentSource, RawTable, value_from_json};

/// Default API base URL.
pub const DEFAULT_API_BASE: &str = "https://coda.io/apis/v1";

const COLUMN_PAGE_LIMIT: &str = "100";
const ROW_PAGE_LIMIT: &str = "500";

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ColumnItem {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RowItem {
    #[serde(default)]
    values: serde_json::Map<String, serde_json::Value>,
}

/// Parse one page of the columns listing.
///
/// Returns the column titles on the page and the token of the next page, if any.
pub fn parse_columns_page(body: &str) -> SourceResult<(Vec<String>, Option<String>)> {
    let page: Page<ColumnItem> = serde_json::from_str(body).map_err(malformed)?;
    let names = page.items.into_iter().map(|c| c.name).collect();
    Ok((names, non_empty(page.next_page_token)))
}

/// Parse one page of the rows listing, aligning values with `columns`.
///
/// Cells missing from a row become [`Value::Null`]; values for columns not in `columns` are
/// ignored.
pub fn parse_rows_page(
    body: &str,
    columns: &[String],
) -> SourceResult<(Vec<Vec<Value>>, Option<String>)> {
    let page: Page<RowItem> = serde_json::from_str(body).map_err(malformed)?;
    let rows = page
        .items
        .iter()
        .map(|item| {
            columns
                .iter()
                .map(|c| item.values.get(c).map(value_from_json).unwrap_or(Value::Null))
                .collect()
        })
        .collect();
    Ok((rows, non_empty(page.next_page_token)))
}

fn malformed(e: serde_json::Error) -> SourceError {
    SourceError::Malformed {
        message: e.to_string(),
    }
}

fn non_empty(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

/// Blocking Coda API client.
#[derive(Debug, Clone)]
pub struct CodaSource {
    client: Client,
    config: CodaConfig,
}

impl CodaSource {
    /// Build a client. Fails only if the HTTP client itself cannot be constructed.
    pub fn new(config: CodaConfig) -> SourceResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("tablesync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, document_id: &str, table_id: &str, leaf: &str) -> SourceResult<Url> {
        let mut url = Url::parse(&self.config.api_base).map_err(|e| SourceError::Malformed {
            message: format!("invalid api base '{}': {e}", self.config.api_base),
        })?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Malformed {
                message: format!("api base '{}' cannot carry a path", self.config.api_base),
            })?
            .pop_if_empty()
            .extend(["docs", document_id, "tables", table_id, leaf]);
        Ok(url)
    }

    fn fetch(
        &self,
        mut url: Url,
        params: &[(&str, &str)],
        page_token: Option<&str>,
        document_id: &str,
        table_id: &str,
    ) -> SourceResult<String> {
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
            if let Some(token) = page_token {
                pairs.append_pair("pageToken", token);
            }
        }

        tracing::debug!(url = %url, "requesting coda page");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.config.token)
            .send()?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp.text()?);
        }

        match status.as_u16() {
            404 => Err(SourceError::NotFound {
                document_id: document_id.to_string(),
                table_id: table_id.to_string(),
            }),
            401 | 403 => Err(SourceError::Auth {
                status: status.as_u16(),
            }),
            code => Err(SourceError::Http {
                status: code,
                body: resp.text().unwrap_or_default(),
            }),
        }
    }

    fn list_columns(&self, document_id: &str, table_id: &str) -> SourceResult<Vec<String>> {
        let url = self.endpoint(document_id, table_id, "columns")?;
        let mut columns = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let body = self.fetch(
                url.clone(),
                &[("limit", COLUMN_PAGE_LIMIT)],
                token.as_deref(),
                document_id,
                table_id,
            )?;
            let (names, next) = parse_columns_page(&body)?;
            columns.extend(names);
            match next {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        Ok(columns)
    }

    fn list_rows(
        &self,
        document_id: &str,
        table_id: &str,
        columns: &[String],
    ) -> SourceResult<Vec<Vec<Value>>> {
        let url = self.endpoint(document_id, table_id, "rows")?;
        let mut rows = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let body = self.fetch(
                url.clone(),
                &[
                    ("useColumnNames", "true"),
                    ("valueFormat", "simple"),
                    ("limit", ROW_PAGE_LIMIT),
                ],
                token.as_deref(),
                document_id,
                table_id,
            )?;
            let (page_rows, next) = parse_rows_page(&body, columns)?;
            rows.extend(page_rows);
            match next {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        Ok(rows)
    }
}

impl DocumentSource for CodaSource {
    fn get_table(&self, document_id: &str, table_id: &str) -> SourceResult<RawTable> {
        tracing::info!(document_id, table_id, "loading coda table");
        let columns = self.list_columns(document_id, table_id)?;
        let rows = self.list_rows(document_id, table_id, &columns)?;
        Ok(RawTable::new(columns, rows))
    }
}
