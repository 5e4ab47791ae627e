//! Walkthrough Example
//!
//! Completes a small workflow, upgrades the tier and streams a report.
//! Uses the HTTP transport when `WAYPOINT_GENERATION_URL` is set and a
//! scripted in-process transport otherwise.
//!
//! Run with `RUST_LOG=debug cargo run --example walkthrough`.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing_subscriber::EnvFilter;
use waypoint_generate::{GenerationTransport, TransportError};
use waypoint_sdk::prelude::*;

fn catalog(tiers: &TierTable) -> anyhow::Result<StepCatalog> {
    let basic = tiers.resolve("basic")?;
    let professional = tiers.resolve("professional")?;

    Ok(StepCatalog::builder()
        .tiers(tiers.clone())
        .step(Step::new(1, "Business profile", &basic).weighted(10.0, 3.0, 2.0).required())
        .step(Step::new(2, "Market research", &basic).after([1]).weighted(6.0, 2.0, 1.0).required())
        .step(Step::new(3, "Module selection", &professional).after([1, 2]).weighted(8.0, 4.0, 3.0))
        .build()?)
}

async fn run<T: GenerationTransport>(pipeline: GenerationPipeline<T>) -> anyhow::Result<()> {
    let tiers = TierTable::standard();
    let catalog = Arc::new(catalog(&tiers)?);
    let profile = Profile::new()
        .with("name", "Ada Lovelace")
        .with("industry", "Logistics");

    let mut bench = Workbench::open(
        Arc::new(InMemoryProgressStore::new()),
        "ada",
        catalog,
        tiers.resolve("basic")?,
        profile,
        pipeline,
    )
    .await?;

    println!("Available: {:?}", bench.available_steps());

    for step in [1, 2] {
        let completion = bench
            .complete(StepId(step), serde_json::json!({ "notes": "done" }))
            .await?;
        println!("Completed step {} -> unlocked {:?}", step, completion.unlocked);
    }

    // Step 3 is tier-gated until the upgrade.
    println!("Step 3 before upgrade: {:?}", bench.status(StepId(3))?);
    bench.set_tier(tiers.resolve("professional")?).await?;
    println!("Step 3 after upgrade: {:?}", bench.status(StepId(3))?);

    let scores = bench.scores();
    println!(
        "Scores: total {} (opportunities {}, modules {}, complexity {})",
        scores.total, scores.scaled_opportunities, scores.modules, scores.complexity
    );

    let mut handle = bench.generate_report(GenerationOptions::default()).await?;
    while let Some(event) = handle.next().await {
        if let Some(line) = event.status_line() {
            println!("⏳ {}", line);
        }
        match event {
            GenerationEvent::Chunk { text, .. } => print!("{}", text),
            GenerationEvent::Retrying { reason, .. } => println!("⚠️  {}", reason),
            GenerationEvent::Succeeded(report) => {
                println!("\n✅ Report {} ({} chars, digest {})", report.id, report.char_count(), &report.digest[..12]);
            }
            GenerationEvent::Failed(err) if err.is_cancelled() => println!("\nCancelled"),
            GenerationEvent::Failed(err) => println!("\n❌ {}", err),
            GenerationEvent::Attempting { .. } => {}
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PipelineConfig::default().with_retry_delay(Duration::from_millis(300));

    if std::env::var(waypoint_sdk::config::URL_ENV).is_ok() {
        let transport = HttpTransport::from_env()?;
        println!("Using {}", transport.endpoint());
        run(GenerationPipeline::with_config(transport, config)).await
    } else {
        let transport = ScriptedTransport::new([
            ScriptedAttempt::refuse(TransportError::transient("service warming up")),
            ScriptedAttempt::succeed([
                "# Growth plan for Ada Lovelace\n",
                "\nLogistics operations are ready for the module rollout.\n",
            ]),
        ])
        .with_chunk_delay(Duration::from_millis(100));
        run(GenerationPipeline::with_config(transport, config)).await
    }
}
