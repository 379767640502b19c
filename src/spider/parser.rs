//! Lossy link extraction over raw HTTP response text.
//!
//! The extractor does not parse HTML. Response bytes are sanitized into a
//! restricted character set and then scanned for link-start tokens, which
//! keeps URL-bearing text intact while neutralizing markup. Stricter parsing
//! would change the discovered-link sets and is deliberately avoided.

/// URL schemes the extractor recognizes, in match order.
const SCHEME_PREFIXES: &[&str] = &["https://", "http://"];

/// Tokens that introduce a URL candidate in sanitized response text.
const LINK_STARTS: &[&str] = &[
    "href=\"", "href='", "src=\"", "src='", "url(", "http://", "https://",
];

/// Characters that terminate a URL candidate.
const LINK_END_CHARS: &[char] = &['"', '\'', '#', '?', ' ', ')', ','];

/// Extract the hostname from an absolute URL.
///
/// Returns the host portion between the scheme and the next `/`, or the
/// empty string when the URL carries no recognized scheme.
pub fn hostname_of(url: &str) -> String {
    for prefix in SCHEME_PREFIXES {
        if let Some(rest) = url.strip_prefix(prefix) {
            return match rest.find('/') {
                Some(slash) => rest[..slash].to_string(),
                None => rest.to_string(),
            };
        }
    }
    String::new()
}

/// Extract the absolute path from an absolute URL.
///
/// Returns everything from the first `/` after the host, or `"/"` when the
/// URL has no path or no recognized scheme.
pub fn path_of(url: &str) -> String {
    for prefix in SCHEME_PREFIXES {
        if let Some(rest) = url.strip_prefix(prefix) {
            return match rest.find('/') {
                Some(slash) => rest[slash..].to_string(),
                None => "/".to_string(),
            };
        }
    }
    "/".to_string()
}

/// Sanitize raw response text before scanning.
///
/// ASCII letters are lowercased, newlines and tabs become spaces, and any
/// character outside the allowed set is dropped.
pub fn reformat_response(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        let ch = match ch {
            '\n' | '\t' => ' ',
            other => other.to_ascii_lowercase(),
        };

        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || " .,/\":#?+-_=".contains(ch) {
            result.push(ch);
        }
    }

    result
}

/// Find the earliest link-start token at or after `from`.
///
/// Returns the token's byte offset and length.
fn next_link_start(text: &str, from: usize) -> Option<(usize, usize)> {
    let mut earliest: Option<(usize, usize)> = None;

    for token in LINK_STARTS {
        if let Some(offset) = text[from..].find(token) {
            let position = from + offset;
            if earliest.map_or(true, |(best, _)| position < best) {
                earliest = Some((position, token.len()));
            }
        }
    }

    earliest
}

/// Scan a response body for link targets, normalized to `(host, path)` pairs.
///
/// Candidates beginning with `/` and candidates without an `http` substring
/// resolve relative to `base_host`; everything else is treated as an absolute
/// URL. A candidate is dropped when its own hostname fails the TLD allow-list
/// or when it contains a forbidden extension substring. Malformed input never
/// fails; it is simply not matched.
pub fn extract_links(
    body: &str,
    base_host: &str,
    allowed_tlds: &[String],
    forbidden_extensions: &[String],
) -> Vec<(String, String)> {
    let text = reformat_response(body);
    let mut links = Vec::new();
    let mut position = 0;

    while let Some((start, token_len)) = next_link_start(&text, position) {
        let candidate_start = start + token_len;
        let candidate_end = text[candidate_start..]
            .find(LINK_END_CHARS)
            .map(|offset| candidate_start + offset)
            .unwrap_or(text.len());
        let candidate = &text[candidate_start..candidate_end];
        position = candidate_end;

        if forbidden_extensions
            .iter()
            .any(|extension| candidate.contains(extension.as_str()))
        {
            continue;
        }

        let candidate_host = hostname_of(candidate);
        if !candidate_host.is_empty()
            && !allowed_tlds
                .iter()
                .any(|suffix| candidate_host.ends_with(suffix.as_str()))
        {
            continue;
        }

        if candidate.starts_with('/') {
            links.push((base_host.to_string(), candidate.to_string()));
        } else if !candidate.contains("http") {
            links.push((base_host.to_string(), format!("/{}", candidate)));
        } else {
            links.push((candidate_host, path_of(candidate)));
        }
    }

    links
}
