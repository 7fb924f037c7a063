//! `HeadClient`: a reqwest-based client over the head's wire API, with
//! connection-pool failover across multiple configured heads (§4.5/§7).

use base64::Engine;
use batchelor_shared::model::{
    EventTypeAvailable, FetchRequest, FetchResponse, RunRequest, RunResponse, TaskStatusHead,
};
use reqwest::Client;

use crate::config::ConnectionSpec;
use crate::error::{ClientError, ClientResult};

pub struct HeadClient {
    http: Client,
    connections: Vec<ConnectionSpec>,
}

impl HeadClient {
    pub fn new(connections: Vec<ConnectionSpec>) -> Self {
        Self {
            http: Client::new(),
            connections,
        }
    }

    fn authorization_header(spec: &ConnectionSpec) -> Option<String> {
        if let Some(key) = &spec.api_key {
            return Some(format!("Bearer {key}"));
        }
        if let Some((user, pass)) = &spec.basic_auth {
            let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
            return Some(format!("Basic {encoded}"));
        }
        None
    }

    /// Tries each configured connection in order, returning the first
    /// response that isn't a recoverable network/5xx error.
    async fn request_with_failover<T, F>(&self, build: F) -> ClientResult<T>
    where
        F: Fn(&Client, &ConnectionSpec) -> reqwest::RequestBuilder,
        T: serde::de::DeserializeOwned,
    {
        let mut last_error = ClientError::invalid_input("no head connections configured");

        for spec in &self.connections {
            let mut request = build(&self.http, spec);
            if let Some(auth) = Self::authorization_header(spec) {
                request = request.header(reqwest::header::AUTHORIZATION, auth);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<T>().await.map_err(ClientError::from);
                    }
                    let body = response.text().await.unwrap_or_default();
                    let err = ClientError::api(status.as_u16(), body);
                    if !err.is_recoverable() {
                        return Err(err);
                    }
                    last_error = err;
                }
                Err(e) => {
                    last_error = ClientError::from(e);
                }
            }
        }

        Err(last_error)
    }

    async fn request_no_body<F>(&self, build: F) -> ClientResult<()>
    where
        F: Fn(&Client, &ConnectionSpec) -> reqwest::RequestBuilder,
    {
        let mut last_error = ClientError::invalid_input("no head connections configured");

        for spec in &self.connections {
            let mut request = build(&self.http, spec);
            if let Some(auth) = Self::authorization_header(spec) {
                request = request.header(reqwest::header::AUTHORIZATION, auth);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    let body = response.text().await.unwrap_or_default();
                    let err = ClientError::api(status.as_u16(), body);
                    if !err.is_recoverable() {
                        return Err(err);
                    }
                    last_error = err;
                }
                Err(e) => {
                    last_error = ClientError::from(e);
                }
            }
        }

        Err(last_error)
    }

    pub async fn run_task(&self, request: &RunRequest) -> ClientResult<RunResponse> {
        self.request_with_failover(|http, spec| {
            http.post(format!("{}/tasks", spec.base_url)).json(request)
        })
        .await
    }

    pub async fn get_task(&self, task_id: &str) -> ClientResult<TaskStatusHead> {
        self.request_with_failover(|http, spec| http.get(format!("{}/tasks/{task_id}", spec.base_url)))
            .await
    }

    pub async fn get_tasks(&self) -> ClientResult<Vec<TaskStatusHead>> {
        self.request_with_failover(|http, spec| http.get(format!("{}/tasks", spec.base_url)))
            .await
    }

    pub async fn send_signal(&self, task_id: &str, signal: &str) -> ClientResult<()> {
        #[derive(serde::Serialize)]
        struct Body<'a> {
            signal: &'a str,
        }
        self.request_no_body(|http, spec| {
            http.post(format!("{}/tasks/{task_id}/signal", spec.base_url))
                .json(&Body { signal })
        })
        .await
    }

    pub async fn fetch_task(&self, request: &FetchRequest) -> ClientResult<FetchResponse> {
        self.request_with_failover(|http, spec| {
            http.post(format!("{}/worker/fetch", spec.base_url)).json(request)
        })
        .await
    }

    pub async fn get_event_types(&self) -> ClientResult<Vec<EventTypeAvailable>> {
        self.request_with_failover(|http, spec| http.get(format!("{}/event-types", spec.base_url)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_header_prefers_api_key() {
        let spec = ConnectionSpec::new("http://x").with_api_key("abc").with_basic_auth("u", "p");
        assert_eq!(HeadClient::authorization_header(&spec), Some("Bearer abc".to_string()));
    }

    #[test]
    fn authorization_header_falls_back_to_basic() {
        let spec = ConnectionSpec::new("http://x").with_basic_auth("u", "p");
        let header = HeadClient::authorization_header(&spec).unwrap();
        assert!(header.starts_with("Basic "));
    }

    #[test]
    fn authorization_header_absent_without_credentials() {
        let spec = ConnectionSpec::new("http://x");
        assert!(HeadClient::authorization_header(&spec).is_none());
    }
}
