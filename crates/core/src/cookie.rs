use serde::{Deserialize, Serialize};

/// A browser cookie as exchanged with the driver and persisted in numeric
/// store slots. Identity is `(domain, name)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn default_path() -> String {
    "/".to_string()
}

impl CookieRecord {
    /// Key used to collapse duplicates on restore (last-write-wins in slot
    /// order).
    pub fn identity(&self) -> (&str, &str) {
        (&self.domain, &self.name)
    }

    /// URL of a page the cookie can be set from: scheme derived from the
    /// secure flag, host from the domain with any leading dot stripped.
    pub fn origin_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        let host = self.domain.trim_start_matches('.');
        format!("{}://{}{}", scheme, host, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(domain: &str, secure: bool, path: &str) -> CookieRecord {
        CookieRecord {
            name: "sid".to_string(),
            value: "abc".to_string(),
            domain: domain.to_string(),
            path: path.to_string(),
            secure,
            http_only: false,
            expires: None,
            same_site: None,
        }
    }

    #[test]
    fn origin_url_strips_leading_dot() {
        let c = cookie(".example.com", true, "/");
        assert_eq!(c.origin_url(), "https://example.com/");
    }

    #[test]
    fn origin_url_scheme_follows_secure_flag() {
        assert_eq!(
            cookie("example.com", false, "/app").origin_url(),
            "http://example.com/app"
        );
    }

    #[test]
    fn deserializes_driver_shape_with_missing_fields() {
        let c: CookieRecord =
            serde_json::from_str(r#"{"name":"a","value":"1","domain":"x.io"}"#).unwrap();
        assert_eq!(c.path, "/");
        assert!(!c.secure);
    }
}
