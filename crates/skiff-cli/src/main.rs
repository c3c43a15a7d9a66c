mod args;
mod client;
mod output;

use anyhow::Result;
use clap::Parser;
use reqwest::{Client, Response};
use serde_json::{json, Value};

use skiff_common::{Application, ClusterStatus, Model, ReplicaInfo};

use crate::args::{AppCommand, Args, Command, ModelCommand};
use crate::client::{admin_url, auth, error_message};
use crate::output::{
    print_application_detail, print_applications, print_cluster_status, print_model_detail,
    print_models, print_prediction, print_replicas, ApplicationDetail, ModelDetail,
};

/// Print a ✓ line on success or the server's error on failure.
async fn report(resp: Response, ok: String, action: &str) -> Result<()> {
    if resp.status().is_success() {
        println!("✓ {ok}");
    } else {
        eprintln!("✗ Failed to {action}: {}", error_message(&resp.text().await?));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = Client::new();
    let token = args.token;
    let base = args.url;

    match args.command {
        Command::App { subcommand } => match subcommand {
            AppCommand::Register {
                name,
                input_type,
                default_output,
                slo_micros,
            } => {
                let body = json!({
                    "name": name,
                    "input_type": input_type,
                    "default_output": default_output,
                    "slo_micros": slo_micros,
                });
                let resp = auth(client.post(admin_url(&base, "/applications")), token.as_ref())
                    .json(&body)
                    .send()
                    .await?;
                report(resp, format!("Application '{name}' registered"), "register application")
                    .await?;
            }
            AppCommand::List => {
                let resp = auth(client.get(admin_url(&base, "/applications")), token.as_ref())
                    .send()
                    .await?;
                if resp.status().is_success() {
                    let apps: Vec<Application> = resp.json().await?;
                    print_applications(&apps);
                } else {
                    eprintln!("✗ Failed to list applications: {}", error_message(&resp.text().await?));
                }
            }
            AppCommand::Get { name } => {
                let url = admin_url(&base, &format!("/applications/{name}"));
                let resp = auth(client.get(&url), token.as_ref()).send().await?;
                if resp.status().is_success() {
                    let detail: ApplicationDetail = resp.json().await?;
                    print_application_detail(&detail);
                } else {
                    eprintln!("✗ Failed to get application: {}", error_message(&resp.text().await?));
                }
            }
            AppCommand::Remove { name } => {
                let url = admin_url(&base, &format!("/applications/{name}"));
                let resp = auth(client.delete(&url), token.as_ref()).send().await?;
                report(resp, format!("Application '{name}' removed"), "remove application").await?;
            }
            AppCommand::Link { app, model } => {
                let url = admin_url(&base, &format!("/applications/{app}/link"));
                let resp = auth(client.put(&url), token.as_ref())
                    .json(&json!({ "model": model }))
                    .send()
                    .await?;
                report(resp, format!("Application '{app}' now routes to '{model}'"), "link").await?;
            }
            AppCommand::Unlink { app } => {
                let url = admin_url(&base, &format!("/applications/{app}/link"));
                let resp = auth(client.delete(&url), token.as_ref()).send().await?;
                report(resp, format!("Application '{app}' unlinked"), "unlink").await?;
            }
        },
        Command::Model { subcommand } => match subcommand {
            ModelCommand::Deploy {
                name,
                version,
                input_type,
                image,
                args,
                replicas,
            } => {
                let url = admin_url(&base, &format!("/models/{name}/versions"));
                let body = json!({
                    "version": version,
                    "input_type": input_type,
                    "artifact": { "image": image, "args": args },
                    "replicas": replicas,
                });
                let resp = auth(client.post(&url), token.as_ref())
                    .json(&body)
                    .send()
                    .await?;
                if resp.status().is_success() {
                    let model: Model = resp.json().await?;
                    println!(
                        "✓ Deployed {name}:{version} ({replicas} replicas), active version: {}",
                        model.active_version
                    );
                } else {
                    eprintln!("✗ Failed to deploy: {}", error_message(&resp.text().await?));
                }
            }
            ModelCommand::List => {
                let resp = auth(client.get(admin_url(&base, "/models")), token.as_ref())
                    .send()
                    .await?;
                if resp.status().is_success() {
                    let models: Vec<Model> = resp.json().await?;
                    print_models(&models);
                } else {
                    eprintln!("✗ Failed to list models: {}", error_message(&resp.text().await?));
                }
            }
            ModelCommand::Get { name } => {
                let url = admin_url(&base, &format!("/models/{name}"));
                let resp = auth(client.get(&url), token.as_ref()).send().await?;
                if resp.status().is_success() {
                    let detail: ModelDetail = resp.json().await?;
                    print_model_detail(&detail);
                } else {
                    eprintln!("✗ Failed to get model: {}", error_message(&resp.text().await?));
                }
            }
            ModelCommand::Remove { name } => {
                let url = admin_url(&base, &format!("/models/{name}"));
                let resp = auth(client.delete(&url), token.as_ref()).send().await?;
                report(resp, format!("Model '{name}' removed"), "remove model").await?;
            }
            ModelCommand::Activate { name, version } => {
                let url = admin_url(&base, &format!("/models/{name}/active"));
                let resp = auth(client.put(&url), token.as_ref())
                    .json(&json!({ "version": version }))
                    .send()
                    .await?;
                report(
                    resp,
                    format!("Model '{name}' now serves version {version}"),
                    "activate version",
                )
                .await?;
            }
            ModelCommand::Scale {
                name,
                version,
                replicas,
            } => {
                let url = admin_url(&base, &format!("/models/{name}/versions/{version}/replicas"));
                let resp = auth(client.put(&url), token.as_ref())
                    .json(&json!({ "replicas": replicas }))
                    .send()
                    .await?;
                report(
                    resp,
                    format!("{name}:{version} scaling to {replicas} replicas"),
                    "scale",
                )
                .await?;
            }
        },
        Command::Status => {
            let resp = auth(client.get(admin_url(&base, "/status")), token.as_ref())
                .send()
                .await?;
            if resp.status().is_success() {
                let status: ClusterStatus = resp.json().await?;
                print_cluster_status(&status);
            } else {
                eprintln!("✗ Failed to get status: {}", error_message(&resp.text().await?));
            }
        }
        Command::Replicas => {
            let resp = auth(client.get(admin_url(&base, "/replicas")), token.as_ref())
                .send()
                .await?;
            if resp.status().is_success() {
                let replicas: Vec<ReplicaInfo> = resp.json().await?;
                print_replicas(&replicas);
            } else {
                eprintln!("✗ Failed to list replicas: {}", error_message(&resp.text().await?));
            }
        }
        Command::Predict { app, input } => {
            let input: Value = serde_json::from_str(&input)
                .map_err(|e| anyhow::anyhow!("input is not valid JSON: {e}"))?;
            let url = format!("{}/{app}/predict", base.trim_end_matches('/'));
            let resp = client
                .post(&url)
                .json(&json!({ "input": input }))
                .send()
                .await?;
            let status = resp.status();
            let text = resp.text().await?;
            match serde_json::from_str::<Value>(&text) {
                Ok(body) if body.get("output").is_some() => print_prediction(&app, &body),
                _ => eprintln!("✗ Query failed ({status}): {}", error_message(&text)),
            }
        }
    }

    Ok(())
}
