use std::sync::atomic::Ordering;

use reqwest::{
    Method,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::Node;
use crate::common::{ClientError, ClientResult};

/// Request shape handed to the `modify` hook of [`Node::make_request`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    /// Sent as JSON when set.
    pub body: Option<Value>,
}

impl Node {
    /// Call a REST endpoint of this node and decode the JSON response.
    ///
    /// The request starts as an authorised `GET`; `modify` may change the
    /// method, headers and body before it is sent.
    pub async fn make_request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        modify: impl FnOnce(&mut RequestOptions),
    ) -> ClientResult<T> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&self.options.password).map_err(|e| {
                ClientError::InvalidNodeOptions(format!("invalid password header: {}", e))
            })?,
        );
        let mut request = RequestOptions {
            method: Method::GET,
            headers,
            body: None,
        };
        modify(&mut request);

        let url = self.options.rest_url(endpoint);
        debug!("[{}] {} {}", self.id, request.method, url);

        let mut builder = self
            .http
            .request(request.method, url)
            .headers(request.headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}
