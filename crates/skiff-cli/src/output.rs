use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::Value;

use skiff_common::{Application, ClusterStatus, Model, ReplicaInfo, ReplicaStatus, VersionHealth};

#[derive(Debug, Deserialize)]
pub struct ApplicationDetail {
    #[serde(flatten)]
    pub application: Application,
    pub linked_model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelDetail {
    #[serde(flatten)]
    pub model: Model,
    #[serde(default)]
    pub health: Vec<VersionHealth>,
}

fn fmt_time(ms: u64) -> String {
    DateTime::from_timestamp_millis(ms as i64)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn status_str(status: ReplicaStatus) -> &'static str {
    match status {
        ReplicaStatus::Ready => "READY",
        ReplicaStatus::Starting => "STARTING",
        ReplicaStatus::Unhealthy => "UNHEALTHY",
        ReplicaStatus::Draining => "DRAINING",
    }
}

pub fn print_applications(apps: &[Application]) {
    println!("\n=== Skiff Applications ===\n");
    if apps.is_empty() {
        println!("No applications registered.");
        return;
    }
    println!(
        "{:<25} {:<10} {:<12} {:<15} {:<20}",
        "Name", "Input", "SLO (us)", "Default", "Created"
    );
    println!("{:-<85}", "");
    for app in apps {
        println!(
            "{:<25} {:<10} {:<12} {:<15} {:<20}",
            app.name,
            app.input_type,
            app.slo_micros,
            app.default_output,
            fmt_time(app.created_at_ms)
        );
    }
    println!();
}

pub fn print_application_detail(detail: &ApplicationDetail) {
    let app = &detail.application;
    println!("\n=== Application: {} ===\n", app.name);
    println!("  Input type:     {}", app.input_type);
    println!("  Default output: {}", app.default_output);
    println!("  Latency SLO:    {}us", app.slo_micros);
    println!("  Created:        {}", fmt_time(app.created_at_ms));
    println!(
        "  Linked model:   {}",
        detail.linked_model.as_deref().unwrap_or("(none)")
    );
    println!();
}

pub fn print_models(models: &[Model]) {
    println!("\n=== Skiff Models ===\n");
    if models.is_empty() {
        println!("No models deployed.");
        return;
    }
    println!(
        "{:<25} {:<10} {:<10} {:<10} {:<8}",
        "Name", "Input", "Active", "Versions", "Pinned"
    );
    println!("{:-<70}", "");
    for m in models {
        println!(
            "{:<25} {:<10} {:<10} {:<10} {:<8}",
            m.name,
            m.input_type,
            m.active_version,
            m.versions.len(),
            if m.pinned { "yes" } else { "no" }
        );
    }
    println!();
}

pub fn print_model_detail(detail: &ModelDetail) {
    let m = &detail.model;
    println!("\n=== Model: {} ===\n", m.name);
    println!("  Input type:     {}", m.input_type);
    println!(
        "  Active version: {}{}",
        m.active_version,
        if m.pinned { " (pinned)" } else { "" }
    );

    println!("\n[Versions]");
    println!(
        "  {:<3} {:<10} {:<35} {:<8} {:<8} {:<20}",
        "", "Version", "Image", "Desired", "Ready", "Deployed"
    );
    for v in &m.versions {
        let health = detail.health.iter().find(|h| h.version == v.version);
        let marker = if v.version == m.active_version { "*" } else { "" };
        println!(
            "  {:<3} {:<10} {:<35} {:<8} {:<8} {:<20}",
            marker,
            v.version,
            v.artifact.image,
            v.replicas,
            health.map(|h| h.healthy).unwrap_or(0),
            fmt_time(v.created_at_ms)
        );
        if let Some(err) = health.and_then(|h| h.last_error.as_deref()) {
            println!("        last error: {err}");
        }
    }
    println!();
}

pub fn print_replicas(replicas: &[ReplicaInfo]) {
    println!("\n[Replicas]");
    if replicas.is_empty() {
        println!("  (No running replicas)");
        return;
    }
    println!(
        "  {:<20} {:<10} {:<8} {:<10} {:<9} {:<30}",
        "Model", "Version", "Replica", "Status", "Inflight", "Endpoint"
    );
    for r in replicas {
        println!(
            "  {:<20} {:<10} {:<8} {:<10} {:<9} {:<30}",
            r.model,
            r.version,
            r.replica_id,
            status_str(r.status),
            r.inflight,
            r.endpoint
        );
    }
    println!();
}

pub fn print_cluster_status(status: &ClusterStatus) {
    println!("\n=== Skiff Cluster Status ===");

    println!("\n[Applications]");
    if status.applications.is_empty() {
        println!("  (No applications registered)");
    } else {
        println!("  {:<25} {:<25}", "Application", "Model");
        for app in &status.applications {
            let model = status
                .links
                .iter()
                .find(|l| l.app == app.name)
                .map(|l| l.model.as_str())
                .unwrap_or("(unlinked)");
            println!("  {:<25} {:<25}", app.name, model);
        }
    }

    println!("\n[Versions]");
    if status.versions.is_empty() {
        println!("  (No versions scheduled)");
    } else {
        println!(
            "  {:<20} {:<10} {:<8} {:<8} {:<9}",
            "Model", "Version", "Desired", "Ready", "Draining"
        );
        for v in &status.versions {
            println!(
                "  {:<20} {:<10} {:<8} {:<8} {:<9}",
                v.model, v.version, v.desired, v.healthy, v.draining
            );
            if let Some(err) = &v.last_error {
                println!("    last error: {err}");
            }
        }
    }

    print_replicas(&status.replicas);
}

pub fn print_prediction(app: &str, body: &Value) {
    let output = body.get("output").cloned().unwrap_or(Value::Null);
    if body.get("default").and_then(Value::as_bool).unwrap_or(false) {
        let why = body
            .get("default_explanation")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        println!("{app}: {output} (default: {why})");
    } else {
        println!("{app}: {output}");
    }
}
