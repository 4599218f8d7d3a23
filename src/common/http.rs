use std::time::Duration;

use reqwest::{Client, Error};

pub struct HttpClient;

impl HttpClient {
    pub fn default_user_agent() -> String {
        format!("erelink/{}", env!("CARGO_PKG_VERSION"))
    }

    /// REST client for one node. The request timeout comes from the node options.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Client, Error> {
        Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
    }
}
