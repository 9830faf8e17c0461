//! URL and body helpers shared by the REST client and the list router.

use serde_json::Value;

/// Anti-XSSI prefix Gerrit prepends to every JSON response body.
pub const JSON_PREFIX: &str = ")]}'";

/// Query parameters in insertion order. A `None` value emits a bare key.
pub type QueryParams = Vec<(String, Option<String>)>;

/// Strip the XSSI prefix and parse the rest as JSON.
///
/// A body without the prefix, or one that does not parse, is "no data"
/// rather than an error.
pub fn parse_prefixed_json(body: &str) -> Option<Value> {
    let Some(rest) = body.strip_prefix(JSON_PREFIX) else {
        tracing::warn!("response body is missing the JSON prefix");
        return None;
    };
    match serde_json::from_str(rest) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(%err, "malformed JSON response");
            None
        }
    }
}

/// Append `params` to `url`, sorted by encoded key so the same request
/// always produces the same URL (and therefore the same cache key).
pub fn url_with_params(url: &str, params: &[(String, Option<String>)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }

    let mut encoded: Vec<(String, Option<String>)> = params
        .iter()
        .map(|(key, value)| {
            (
                urlencoding::encode(key).into_owned(),
                value.as_deref().map(|v| urlencoding::encode(v).into_owned()),
            )
        })
        .collect();
    // stable: repeated keys keep their relative order
    encoded.sort_by(|a, b| a.0.cmp(&b.0));

    let query = encoded
        .into_iter()
        .map(|(key, value)| match value {
            Some(value) => format!("{}={}", key, value),
            None => key,
        })
        .collect::<Vec<_>>()
        .join("&");

    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, query)
}

/// Legacy path-segment encoding: percent-encode twice, then restore `:` and
/// turn encoded spaces into `+`. With `replace_slashes`, `/` is restored too.
///
/// The double encoding is kept for compatibility with existing links.
pub fn encode_url(text: &str, replace_slashes: bool) -> String {
    let once = urlencoding::encode(text);
    let twice = urlencoding::encode(&once);
    let mut output = twice.replace("%253A", ":").replace("%2520", "+");
    if replace_slashes {
        output = output.replace("%252F", "/");
    }
    output
}

/// Inverse of [`encode_url`]. Undecodable input is returned as-is.
pub fn decode_url(text: &str) -> String {
    let spaced = text.replace('+', " ");
    let once = match urlencoding::decode(&spaced) {
        Ok(once) => once.into_owned(),
        Err(_) => return text.to_string(),
    };
    match urlencoding::decode(&once) {
        Ok(twice) => twice.into_owned(),
        Err(_) => once,
    }
}

/// Server-side filter parameter for list endpoints: `^` starts a regex
/// (`r`), anything else non-empty is a substring match (`m`).
pub fn filter_param(filter: Option<&str>) -> Option<(String, Option<String>)> {
    match filter {
        Some(f) if f.starts_with('^') => Some(("r".to_string(), Some(f.to_string()))),
        Some(f) if !f.is_empty() => Some(("m".to_string(), Some(f.to_string()))),
        _ => None,
    }
}

/// Repository query used when the filter is empty: everything but hidden
/// projects.
pub const DEFAULT_REPO_QUERY: &str = "state:active OR state:read-only";

fn is_name_delimiter(c: char) -> bool {
    matches!(c, '@' | '.' | '-' | '/' | '_') || c.is_whitespace()
}

/// Turn a repository filter into a project query.
///
/// A filter with an operator (`:`) is taken as a query already. A plain
/// name containing delimiters (`@ . - / _` or whitespace) is split, because
/// the query language treats hyphens as operators, and its parts are
/// combined as `inname:a AND inname:b`. An empty result falls back to
/// [`DEFAULT_REPO_QUERY`].
pub fn repo_query(filter: Option<&str>) -> String {
    let filter = filter.unwrap_or_default();
    let query = if !filter.contains(':') && filter.contains(is_name_delimiter) {
        filter
            .split(is_name_delimiter)
            .filter(|part| !part.is_empty())
            .map(|part| format!("inname:{}", part))
            .collect::<Vec<_>>()
            .join(" AND ")
    } else {
        filter.to_string()
    };

    let query = query.trim();
    if query.is_empty() {
        DEFAULT_REPO_QUERY.to_string()
    } else {
        query.to_string()
    }
}

/// `n`/`S` paging parameters, over-fetching one item so the caller can tell
/// whether another page exists.
pub fn page_params(items_per_page: u32, offset: u32) -> QueryParams {
    vec![
        ("n".to_string(), Some((items_per_page + 1).to_string())),
        ("S".to_string(), Some(offset.to_string())),
    ]
}
