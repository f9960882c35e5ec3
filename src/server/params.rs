//! Query parameter extraction shared by the node and router servers.

use std::borrow::Cow;
use std::time::Duration;

use hyper::Uri;

use crate::duration::parse_duration;
use crate::error::{Error, Result};

const KEY_PARAM: &str = "key";
const TTL_PARAM: &str = "ttl";

/// Value of the first `name` parameter in a query string, decoded
fn query_param(uri: &Uri, name: &str) -> Result<Option<String>> {
    let Some(query) = uri.query() else {
        return Ok(None);
    };

    for pair in query.split('&') {
        let (raw_name, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        if decode(raw_name)? == name {
            return decode(raw_value).map(|v| Some(v.into_owned()));
        }
    }
    Ok(None)
}

fn decode(raw: &str) -> Result<Cow<'_, str>> {
    let plus_as_space = raw.replace('+', " ");
    urlencoding::decode(&plus_as_space)
        .map(|decoded| Cow::Owned(decoded.into_owned()))
        .map_err(|e| Error::Invalid(format!("malformed query string: {}", e)))
}

/// Non-empty `key` parameter
pub fn extract_key(uri: &Uri) -> Result<String> {
    match query_param(uri, KEY_PARAM)? {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(Error::Invalid("key query param cannot be empty".into())),
    }
}

/// `key` plus an optional `ttl`; a missing ttl is zero
pub fn extract_key_and_ttl(uri: &Uri) -> Result<(String, Duration)> {
    let key = extract_key(uri)?;

    let ttl = match query_param(uri, TTL_PARAM)? {
        None => Duration::ZERO,
        Some(raw) if raw.is_empty() => Duration::ZERO,
        Some(raw) => parse_duration(&raw)
            .map_err(|e| Error::Invalid(format!("invalid ttl query param: {}", e)))?,
    };

    Ok((key, ttl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_extract_key() {
        assert_eq!(extract_key(&uri("/get?key=abc")).unwrap(), "abc");
        assert_eq!(extract_key(&uri("/get?other=1&key=a%2Fb")).unwrap(), "a/b");
        assert_eq!(extract_key(&uri("/get?key=hello+world")).unwrap(), "hello world");
    }

    #[test]
    fn test_missing_or_empty_key() {
        assert_matches!(extract_key(&uri("/get")), Err(Error::Invalid(_)));
        assert_matches!(extract_key(&uri("/get?key=")), Err(Error::Invalid(_)));
        assert_matches!(extract_key(&uri("/get?ttl=1s")), Err(Error::Invalid(_)));
    }

    #[test]
    fn test_extract_key_and_ttl() {
        let (key, ttl) = extract_key_and_ttl(&uri("/set?key=k&ttl=1500ms")).unwrap();
        assert_eq!(key, "k");
        assert_eq!(ttl, Duration::from_millis(1500));

        let (_, ttl) = extract_key_and_ttl(&uri("/set?key=k")).unwrap();
        assert_eq!(ttl, Duration::ZERO);
    }

    #[test]
    fn test_invalid_ttl() {
        assert_matches!(
            extract_key_and_ttl(&uri("/set?key=k&ttl=soon")),
            Err(Error::Invalid(_))
        );
    }
}
