//! Terminal front end for a SocialStream simulation.
//!
//! Picks a scenario and two agents from the lookup service, starts a
//! simulation, and prints the conversation as it streams in.
//!
//! Run against the scripted server:
//!   cargo run -p socialstream-demo-sim-server
//!   cargo run -p socialstream-demo-chat -- --agent1 "Ava Lee" --agent2 "Chloe Nakamura"

mod terminal;

use anyhow::Context;
use clap::Parser;
use socialstream_relay::{
    ChatSession, ConnectionManager, LookupClient, RelayConfig, SessionState, run_render_loop,
};
use std::path::PathBuf;
use terminal::TerminalRenderer;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "socialstream-chat", about = "Watch a two-agent social simulation")]
struct Args {
    /// TOML config file.
    #[arg(long, env = "SOCIALSTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Simulation server base URL (ws:// or wss://).
    #[arg(long, env = "SOCIALSTREAM_SERVER_URL")]
    server_url: Option<String>,

    /// Lookup service base URL.
    #[arg(long, env = "SOCIALSTREAM_LOOKUP_URL")]
    lookup_url: Option<String>,

    #[arg(long, env = "SOCIALSTREAM_TOKEN")]
    token: Option<String>,

    /// Scenario codename.
    #[arg(long)]
    scenario: Option<String>,

    /// First agent, by full name.
    #[arg(long)]
    agent1: Option<String>,

    /// Second agent, by full name.
    #[arg(long)]
    agent2: Option<String>,

    #[arg(long)]
    model1: Option<String>,

    #[arg(long)]
    model2: Option<String>,

    /// Ask the server to finish after this many history entries.
    #[arg(long)]
    finish_after: Option<usize>,

    /// Print the catalog and exit.
    #[arg(long)]
    list: bool,
}

impl Args {
    fn config(&self) -> anyhow::Result<RelayConfig> {
        let mut config = RelayConfig::load_or_default(self.config.as_deref())?;
        if let Some(url) = &self.server_url {
            config.server_url = url.clone();
        }
        if let Some(url) = &self.lookup_url {
            config.lookup_url = url.clone();
        }
        if let Some(token) = &self.token {
            config.token = token.clone();
        }
        Ok(config)
    }

    fn apply_choices(&self, state: &mut SessionState) -> anyhow::Result<()> {
        if let Some(codename) = &self.scenario {
            state.choose_scenario(codename)?;
        }
        for (slot, name) in [&self.agent1, &self.agent2].into_iter().enumerate() {
            if let Some(name) = name {
                state.choose_agent(slot, name)?;
            }
        }
        for (slot, model) in [&self.model1, &self.model2].into_iter().enumerate() {
            if let Some(model) = model {
                state.choose_model(slot, model)?;
            }
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("socialstream_relay=warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.config()?;

    let lookup = LookupClient::new(&config.lookup_url, config.connect_timeout())?;
    let mut state = SessionState::load(&lookup)
        .with_context(|| format!("loading catalog from {}", config.lookup_url))?;

    if args.list {
        print_catalog(&state);
        return Ok(());
    }
    args.apply_choices(&mut state)?;

    if let Some(scenario) = state.scenario() {
        println!("Scenario: {} ({})", scenario.codename, scenario.summary());
    }
    let [first, second] = state.agent_names();
    let [model1, model2] = state.model_choices();
    println!("Agents: {first} ({model1}) and {second} ({model2})");

    let endpoint = config.endpoint_url()?;
    tracing::info!("Connecting to {}", endpoint);

    let mut session = ChatSession::new(state, ConnectionManager::from_config(&config), endpoint);
    session.start_simulation()?;

    let mut renderer = TerminalRenderer::new(args.finish_after);
    let frames = run_render_loop(&mut session, &mut renderer, config.poll_interval());
    tracing::debug!("Render loop finished after {} frames", frames);

    println!(
        "-- simulation over, {} messages --",
        session.state().history.len()
    );
    Ok(())
}

fn print_catalog(state: &SessionState) {
    println!("Scenarios:");
    for scenario in state.scenarios() {
        println!("  {:<20} {}", scenario.codename, scenario.summary());
    }
    println!("Agents:");
    for agent in state.agents() {
        println!("  {}", agent.full_name());
    }
    println!("Models:");
    for model in state.models() {
        println!("  {model}");
    }
}
