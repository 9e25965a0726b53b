mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use reqwest::{StatusCode, Url};

/// Status and raw body of a completed GET.
#[derive(Debug)]
pub struct Fetched {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl Fetched {
    /// Body as text, for error reports.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub async fn fetch_bytes<C: HttpClient + ?Sized>(client: &C, url: Url) -> reqwest::Result<Fetched> {
    let req = reqwest::Request::new(reqwest::Method::GET, url);

    let resp = client.execute(req).await?;
    let status = resp.status();
    let body = resp.bytes().await?.to_vec();
    Ok(Fetched { status, body })
}
