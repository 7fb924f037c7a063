//! Connection configuration for talking to one or more heads. A worker (or
//! `batchelor-ctl`) may be configured with several head URLs; `HeadClient`
//! rotates through them without backoff on network error (§4.5/§7).

#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    pub base_url: String,
    pub api_key: Option<String>,
    pub basic_auth: Option<(String, String)>,
}

impl ConnectionSpec {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            basic_auth: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let spec = ConnectionSpec::new("http://localhost:8080").with_api_key("abc");
        assert_eq!(spec.base_url, "http://localhost:8080");
        assert_eq!(spec.api_key.as_deref(), Some("abc"));
    }
}
