//! Demonstrates the priority queue: submits four postings at different
//! priorities and shows the order a worker will process them in.
//!
//! Run `pdoflow priority-stats` afterward to see the queue, or
//! `pdoflow pool --workers 2` to actually process it.

use pdoflow_core::{DbConfig, FunctionRegistry};
use pdoflow_postgres::submission::{post_work, JobSpec};
use std::sync::Arc;

fn register_process_task(registry: &FunctionRegistry) {
    registry.register(
        "demo.process_task",
        Arc::new(|args, _kwargs| {
            let task_id = args[0].as_i64().unwrap_or_default();
            let task_name = args[1].as_str().unwrap_or_default();
            println!("Starting {task_name} (ID: {task_id})");
            Ok(serde_json::json!(null))
        }),
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = DbConfig::resolve_connection_string()?;
    let pool = sqlx::PgPool::connect(&url).await?;

    let registry = FunctionRegistry::new();
    register_process_task(&registry);

    println!("Submitting jobs with different priorities...");
    println!("{}", "-".repeat(50));

    let urgent = vec![
        JobSpec::new(serde_json::json!([101, "URGENT: Server restart", 1.0])).with_priority(100),
        JobSpec::new(serde_json::json!([102, "URGENT: Database backup", 1.5])).with_priority(100),
    ];
    let posting1 = post_work(
        &pool,
        &registry,
        "demo",
        "process_task",
        "demo.process_task",
        urgent,
    )
    .await?;
    println!("Submitted urgent tasks (priority=100): {}", posting1.posting_id);

    let normal = vec![
        JobSpec::new(serde_json::json!([201, "Normal: Generate report", 2.0])),
        JobSpec::new(serde_json::json!([202, "Normal: Send emails", 1.0])),
        JobSpec::new(serde_json::json!([203, "Normal: Update cache", 1.5])),
    ];
    let posting2 = post_work(
        &pool,
        &registry,
        "demo",
        "process_task",
        "demo.process_task",
        normal,
    )
    .await?;
    println!("Submitted normal tasks (priority=0): {}", posting2.posting_id);

    let background = vec![
        JobSpec::new(serde_json::json!([301, "Background: Clean logs", 0.5])).with_priority(-50),
        JobSpec::new(serde_json::json!([302, "Background: Optimize images", 3.0])).with_priority(-50),
    ];
    let posting3 = post_work(
        &pool,
        &registry,
        "demo",
        "process_task",
        "demo.process_task",
        background,
    )
    .await?;
    println!("Submitted background tasks (priority=-50): {}", posting3.posting_id);

    let varied = vec![
        JobSpec::new(serde_json::json!([401, "Critical fix", 0.5])).with_priority(150),
        JobSpec::new(serde_json::json!([402, "Important update", 1.0])).with_priority(50),
        JobSpec::new(serde_json::json!([403, "Minor adjustment", 0.5])).with_priority(-25),
    ];
    let posting4 = post_work(
        &pool,
        &registry,
        "demo",
        "process_task",
        "demo.process_task",
        varied,
    )
    .await?;
    println!("Submitted varied priority tasks: {}", posting4.posting_id);

    println!("\nAll jobs submitted!");
    println!("Workers will process jobs in this order:");
    println!("1. Critical fix (priority=150)");
    println!("2. URGENT tasks (priority=100)");
    println!("3. Important update (priority=50)");
    println!("4. Normal tasks (priority=0)");
    println!("5. Minor adjustment (priority=-25)");
    println!("6. Background tasks (priority=-50)");
    println!("\nWithin same priority level, jobs are processed FIFO.");
    println!("\nRun 'pdoflow priority-stats' to see the queue status.");
    println!("Run 'pdoflow pool --workers 2' to start processing.");

    Ok(())
}
