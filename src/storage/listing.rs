//! ListObjectsV2 response parsing
//!
//! Only three elements matter: each `<Contents><Key>`, `<IsTruncated>` and
//! `<NextContinuationToken>`. Common prefixes carry `<Prefix>`, not `<Key>`,
//! so nested "directories" never show up as keys.

use once_cell::sync::Lazy;
use regex::Regex;

use super::Page;

static KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"<Key>([^<]*)</Key>").unwrap());
static TRUNCATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<IsTruncated>\s*(true|false)\s*</IsTruncated>").unwrap());
static NEXT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<NextContinuationToken>([^<]*)</NextContinuationToken>").unwrap()
});

/// Parse one page. `None` when the body is not a `ListBucketResult`.
pub fn parse_list_objects_v2(xml: &str) -> Option<Page> {
    if !xml.contains("<ListBucketResult") {
        return None;
    }

    let keys = KEY
        .captures_iter(xml)
        .map(|caps| unescape(&caps[1]))
        .collect();

    let truncated = TRUNCATED
        .captures(xml)
        .is_some_and(|caps| &caps[1] == "true");

    // A truncated page without a token can't be continued
    let next_token = if truncated {
        NEXT_TOKEN
            .captures(xml)
            .map(|caps| unescape(&caps[1]))
            .filter(|token| !token.is_empty())
    } else {
        None
    };

    Some(Page { keys, next_token })
}

fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#13;", "\r")
        .replace("&#10;", "\n")
        .replace("&amp;", "&")
}
