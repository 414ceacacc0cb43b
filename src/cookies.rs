use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use std::collections::HashMap;

/// Cookies sent with an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestCookies {
    cookies: HashMap<String, String>,
}

impl RequestCookies {
    /// Parse every `Cookie` header on the request. The first occurrence of a name wins.
    /// Values are percent-decoded; a value that does not decode is kept as sent.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cookies = HashMap::new();

        for value in headers.get_all(COOKIE) {
            let Ok(header) = value.to_str() else {
                continue;
            };
            for pair in header.split(';').map(|s| s.trim()) {
                let Some((name, value)) = pair.split_once('=') else {
                    continue;
                };
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                let value = value.trim();
                cookies.entry(name.to_string()).or_insert_with(|| {
                    urlencoding::decode(value)
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| value.to_string())
                });
            }
        }

        Self { cookies }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestCookies {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            cookies: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Set-Cookie value that selects a tenant for subsequent requests.
pub fn tenant_cookie(tenant_key: &str, tenant: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; SameSite=Lax; Path=/",
        tenant_key,
        urlencoding::encode(tenant)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Set-Cookie value that removes the tenant selection.
pub fn clear_tenant_cookie(tenant_key: &str, secure: bool) -> String {
    let mut cookie = format!("{}=; SameSite=Lax; Path=/; Max-Age=0", tenant_key);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("session=abc; __tenant=acme ;theme=dark"),
        );

        let cookies = RequestCookies::from_headers(&headers);
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies.get("__tenant"), Some("acme"));
        assert_eq!(cookies.get("theme"), Some("dark"));
        assert!(!cookies.contains("missing"));
    }

    #[test]
    fn test_malformed_pairs_are_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("novalue; =orphan; ok=1"));

        let cookies = RequestCookies::from_headers(&headers);
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies.get("ok"), Some("1"));
    }

    #[test]
    fn test_first_occurrence_wins_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("__tenant=first"));
        headers.append(COOKIE, HeaderValue::from_static("__tenant=second; a=b"));

        let cookies = RequestCookies::from_headers(&headers);
        assert_eq!(cookies.get("__tenant"), Some("first"));
        assert_eq!(cookies.get("a"), Some("b"));
    }

    #[test]
    fn test_empty_value_is_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("__tenant="));

        let cookies = RequestCookies::from_headers(&headers);
        assert!(cookies.contains("__tenant"));
        assert_eq!(cookies.get("__tenant"), Some(""));
    }

    #[test]
    fn test_values_are_percent_decoded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("__tenant=Acme%20Corp; plus=a+b; bad=%FF%FE"),
        );

        let cookies = RequestCookies::from_headers(&headers);
        assert_eq!(cookies.get("__tenant"), Some("Acme Corp"));
        assert_eq!(cookies.get("plus"), Some("a+b"));
        assert_eq!(cookies.get("bad"), Some("%FF%FE"));
    }

    #[test]
    fn test_tenant_cookie_round_trips() {
        let set_cookie = tenant_cookie("__tenant", "Acme Corp/EU", false);
        let pair = set_cookie.split(';').next().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(pair).unwrap());

        let cookies = RequestCookies::from_headers(&headers);
        assert_eq!(cookies.get("__tenant"), Some("Acme Corp/EU"));
    }

    #[test]
    fn test_tenant_cookie_values() {
        assert_eq!(
            tenant_cookie("__tenant", "acme corp", true),
            "__tenant=acme%20corp; SameSite=Lax; Path=/; Secure"
        );
        assert_eq!(
            clear_tenant_cookie("__tenant", false),
            "__tenant=; SameSite=Lax; Path=/; Max-Age=0"
        );
    }
}
