//! `voxbot` - autonomous game agent over a simulated voxel world
//!
//! Wires the orchestration core to the built-in simulation and either a
//! scripted offline LLM or an OpenAI-compatible endpoint from the config.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ConfigCommand};
use voxbot_core::config::BotConfig;
use voxbot_core::game::{GameContext, SimGame, Vec3};
use voxbot_core::llm::{
    ActionRequest, HttpLlmClient, LlmClient, MainActionDecision, PlanDraft, ScriptedLlm,
};
use voxbot_core::planning::PlanningStore;
use voxbot_core::Agent;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            goal,
            ticks,
            scripted,
        } => run_agent(&goal, ticks, scripted).await,
        Commands::Status => show_status().await,
        Commands::Config {
            cmd: ConfigCommand::Init,
        } => init_config().await,
    }
}

async fn run_agent(goal: &str, ticks: u64, scripted: bool) -> Result<()> {
    let config = BotConfig::load_or_create()
        .await
        .context("failed to load configuration")?;

    let sim = Arc::new(SimGame::new());
    seed_demo_world(&sim);

    let llm: Arc<dyn LlmClient> = if scripted || config.llm.resolve_api_key().is_none() {
        info!("using the scripted offline LLM");
        Arc::new(demo_script())
    } else {
        Arc::new(HttpLlmClient::new(config.llm.clone())?)
    };

    let agent = Agent::new(config, Arc::clone(&sim) as Arc<dyn GameContext>, llm).await;
    agent.set_goal(goal);

    tokio::select! {
        result = agent.run_until_idle(ticks) => {
            let used = result?;
            let status = agent.status();
            println!("finished after {used} ticks in mode '{}'", status.mode);
            match status.goal {
                Some(goal) => println!("goal still open: {goal}"),
                None => println!("goal settled"),
            }
            println!("oak logs held: {}", sim.item_count("oak_log"));
            for line in agent.memory().recent(8) {
                println!("  {line}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\ninterrupted, saving state");
            agent.save().await;
        }
    }
    Ok(())
}

async fn show_status() -> Result<()> {
    let config = BotConfig::load_or_create()
        .await
        .context("failed to load configuration")?;
    let store = PlanningStore::from_config(&config);
    let state = store.load_state().await;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

async fn init_config() -> Result<()> {
    let path = BotConfig::default_path()?;
    if path.exists() {
        println!("config already exists at {}", path.display());
        return Ok(());
    }
    BotConfig::load_or_create()
        .await
        .context("failed to write starter config")?;
    println!("wrote starter config to {}", path.display());
    Ok(())
}

/// A small world worth acting in: trees to chop and one lurking zombie
fn seed_demo_world(sim: &SimGame) {
    sim.add_block("oak_log", Vec3::new(6.0, 64.0, 2.0));
    sim.add_block("oak_log", Vec3::new(7.0, 64.0, 3.0));
    sim.add_block("crafting_table", Vec3::new(1.0, 64.0, -2.0));
    sim.add_entity("zombie", Vec3::new(8.0, 64.0, 0.0), true, 20.0);
    sim.add_entity("sheep", Vec3::new(-5.0, 64.0, 4.0), false, 8.0);
}

/// Canned decisions so the demo runs without any endpoint
fn demo_script() -> ScriptedLlm {
    let llm = ScriptedLlm::new();
    llm.push_plan(PlanDraft {
        title: "gather wood".to_string(),
        description: "chop the nearby oaks".to_string(),
        tasks: vec![serde_json::json!({
            "title": "collect oak logs",
            "description": "chop four oak logs",
            "tracker": {"type": "inventory", "item": "oak_log", "count": 4}
        })],
    });
    for _ in 0..4 {
        llm.push_main_action(MainActionDecision {
            thinking: Some("oaks are close by".to_string()),
            action: ActionRequest {
                name: "collect".to_string(),
                params: serde_json::json!({"item": "oak_log", "count": 1}),
            },
        });
    }
    llm
}
