use anyhow::Context;
use clap::Parser;
use hitman::config::AgentArgs;
use hitman::referee::get_referee_from_stdin;
use hitman::{logging, mission, svg};
use std::fs;

/// Plays both phases against a world read from stdin: a JSON world, or
/// `random <width> <height> <guards> <civilians> <seed>`.
#[derive(Parser, Debug)]
struct Cli {
    #[clap(flatten)]
    agent: AgentArgs,
    /// Write the explored map and the exploration trail as SVG.
    #[clap(long)]
    svg: Option<String>,
    /// Write the explored knowledge grid as JSON.
    #[clap(long)]
    snapshot: Option<String>,
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let config = cli.agent.to_config();
    let mut referee = get_referee_from_stdin().context("Failed to read the world")?;
    let report = mission::run_mission(referee.as_mut(), &config).context("Mission aborted")?;

    if let Some(path) = &cli.svg {
        let picture = svg::render(&report.exploration.grid, &report.exploration.trail);
        fs::write(path, picture).with_context(|| format!("Cannot write {}", path))?;
    }
    if let Some(path) = &cli.snapshot {
        let json = report.exploration.grid.snapshot()?;
        fs::write(path, json).with_context(|| format!("Cannot write {}", path))?;
    }

    let summary = serde_json::json!({
        "phase1": report.exploration.summary,
        "phase2": report.objectives.summary,
        "strategy": report.objectives.strategy.as_ref().map(|s| &s.objectives),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    eprintln!("!log phase1_penalties {}", report.exploration.penalties);
    eprintln!("!log phase2_penalties {}", report.objectives.penalties);
    eprintln!("!log oracle_queries {}", report.exploration.oracle_queries);
    eprintln!("!log score {}", report.total_penalties());
    eprintln!("!log summary {}", report.summary_line());
    if report.success() {
        eprintln!("!log status AC");
    } else {
        eprintln!("!log status WA");
    }
    Ok(())
}
