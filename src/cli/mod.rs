// SPDX-License-Identifier: MIT
//! CLI subcommand handlers.
//!
//! Each handler maps one subcommand onto a gateway call and prints the
//! operation output as pretty JSON. The CLI never touches the config store
//! or the browser directly (except `regen-key`, which must work while the
//! gateway is down).

pub mod client;

use anyhow::{bail, Result};
use serde_json::{json, Value};

use client::GatewayClient;

fn print_output(envelope: &Value) {
    let output = envelope.get("output").unwrap_or(&Value::Null);
    match serde_json::to_string_pretty(output) {
        Ok(pretty) => println!("{pretty}"),
        Err(_) => println!("{output}"),
    }
}

pub async fn status(client: &GatewayClient) -> Result<()> {
    print_output(&client.get("/api/status").await?);
    Ok(())
}

pub async fn get_url(client: &GatewayClient) -> Result<()> {
    print_output(&client.get("/api/url").await?);
    Ok(())
}

pub async fn set_url(client: &GatewayClient, url: &str) -> Result<()> {
    print_output(&client.post("/api/url", json!({ "url": url })).await?);
    Ok(())
}

pub async fn get_orientation(client: &GatewayClient) -> Result<()> {
    print_output(&client.get("/api/orientation").await?);
    Ok(())
}

pub async fn set_orientation(client: &GatewayClient, orientation: &str) -> Result<()> {
    print_output(
        &client
            .post("/api/orientation", json!({ "orientation": orientation }))
            .await?,
    );
    Ok(())
}

pub async fn playlist_show(client: &GatewayClient) -> Result<()> {
    print_output(&client.get("/api/playlist").await?);
    Ok(())
}

pub async fn playlist_add(
    client: &GatewayClient,
    url: &str,
    display_time: Option<i64>,
    title: Option<String>,
    replace: bool,
) -> Result<()> {
    let mode = if replace { "replace" } else { "append" };
    print_output(
        &client
            .post(
                "/api/playlist/add",
                json!({
                    "url": url,
                    "display_time": display_time,
                    "title": title,
                    "mode": mode,
                }),
            )
            .await?,
    );
    Ok(())
}

pub async fn playlist_remove(client: &GatewayClient, index: usize) -> Result<()> {
    print_output(
        &client
            .post("/api/playlist/remove", json!({ "index": index }))
            .await?,
    );
    Ok(())
}

pub async fn playlist_replace(client: &GatewayClient, urls: &[String]) -> Result<()> {
    if urls.is_empty() {
        bail!("provide at least one url");
    }
    print_output(
        &client
            .post("/api/playlist/replace", json!({ "urls": urls }))
            .await?,
    );
    Ok(())
}

pub async fn playlist_enable(client: &GatewayClient) -> Result<()> {
    print_output(&client.post("/api/playlist/enable", json!({})).await?);
    Ok(())
}

pub async fn playlist_disable(client: &GatewayClient) -> Result<()> {
    print_output(&client.post("/api/playlist/disable", json!({})).await?);
    Ok(())
}

pub async fn playlist_clear(client: &GatewayClient) -> Result<()> {
    print_output(&client.post("/api/playlist/clear", json!({})).await?);
    Ok(())
}

pub async fn service(client: &GatewayClient, verb: &str) -> Result<()> {
    print_output(&client.post(&format!("/api/service/{verb}"), json!({})).await?);
    Ok(())
}

pub async fn logs(client: &GatewayClient, lines: usize) -> Result<()> {
    let envelope = client.get(&format!("/api/logs?lines={lines}")).await?;
    // Log lines read better as plain text than as a JSON array.
    if let Some(lines) = envelope
        .pointer("/output/lines")
        .and_then(|v| v.as_array())
    {
        for line in lines {
            if let Some(s) = line.as_str() {
                println!("{s}");
            }
        }
    } else {
        print_output(&envelope);
    }
    Ok(())
}
