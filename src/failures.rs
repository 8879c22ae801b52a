//! Parsing of provisioning failure logs.
//!
//! Failed provisioning runs leave two kinds of traces in their result text:
//!
//! - `Some product code could not be parsed: <code>.` for every product code that was rejected
//! - bracketed package-code lists such as `["1001","1002"]`

use std::sync::LazyLock;

use regex::Regex;

static PRODUCT_CODE_FAILURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Some product code could not be parsed: ([^.]+)\.").expect("valid regex")
});

static PACKAGE_CODE_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[([\d",]*)\]"#).expect("valid regex"));

/// Every product code reported as unparseable, in order of appearance.
pub fn product_code_failures(text: &str) -> Vec<&str> {
    PRODUCT_CODE_FAILURE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// The unparseable product codes that contain whitespace (typically blank or padded codes).
pub fn blank_product_code_failures(text: &str) -> Vec<&str> {
    product_code_failures(text)
        .into_iter()
        .filter(|code| code.chars().any(char::is_whitespace))
        .collect()
}

/// Contents of every bracketed list made only of digits, quotes and commas.
pub fn package_code_lists(text: &str) -> Vec<&str> {
    PACKAGE_CODE_LIST
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}
