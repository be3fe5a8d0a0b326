use anyhow::Result;
use reqwest::{Client, RequestBuilder};
use serde::{Serialize, de::DeserializeOwned};

pub async fn get<T: DeserializeOwned>(client: &Client, url: &str, token: Option<&str>) -> Result<T> {
    send(client.get(url), token).await
}

pub async fn post<T: DeserializeOwned, B: Serialize>(
    client: &Client,
    url: &str,
    body: &B,
    token: Option<&str>,
) -> Result<T> {
    send(client.post(url).json(body), token).await
}

async fn send<T: DeserializeOwned>(mut request: RequestBuilder, token: Option<&str>) -> Result<T> {
    if let Some(token) = token {
        request = request.header("Authorization", format!("Bearer {}", token));
    }

    let response = request.send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("Request failed with status {}: {}", status, error_message(&text));
    }

    Ok(response.json().await?)
}

/// Pull a human-readable message out of an error body: `detail`, then
/// `message`, then the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["detail", "message"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}
