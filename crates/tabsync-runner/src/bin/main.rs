use clap::Parser;
use std::path::PathBuf;
use tabsync_runner::{Params, Runner, Scenario};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "tabsync-runner")]
#[command(about = "Run browser scenarios with condition waits and new-tab checks")]
#[command(version)]
struct Cli {
    /// Scenario file to run
    scenario: PathBuf,

    /// Run in headless mode (overrides scenario)
    #[arg(long)]
    headless: bool,

    /// Set a parameter (can be used multiple times)
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate scenario without running
    #[arg(long)]
    check: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> tabsync_runner::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let params = Params::from_args(&cli.params)?;
    let mut scenario = Scenario::load_with_params(&cli.scenario, &params)?;

    if cli.check {
        print_summary(&scenario);
        return Ok(());
    }

    if cli.headless {
        scenario.browser.headless = true;
    }

    if !cli.json {
        println!("Running: {}", scenario.name);
    }

    let mut runner = Runner::launch(&scenario.browser).await?;
    let result = runner.run(&scenario).await;
    runner.close().await?;
    let report = result?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| tabsync_runner::Error::Config(format!("failed to encode report: {}", e)))?;
        println!("{}", json);
    } else {
        println!();
        match &report.outcome {
            tabsync::Outcome::Passed => println!("✓ Passed"),
            tabsync::Outcome::Skipped(reason) => println!("- Skipped: {}", reason),
            tabsync::Outcome::Failed(reason) => {
                println!("✗ Failed");
                println!("  Error: {}", reason);
            }
        }
        println!("  Steps: {}", report.steps_executed);
        println!("  Duration: {}ms", report.duration_ms);
        if report.retries > 0 {
            println!("  Retries: {}", report.retries);
        }
    }

    if !report.is_success() {
        std::process::exit(1);
    }

    Ok(())
}

fn print_summary(scenario: &Scenario) {
    println!("Scenario valid: {}", scenario.name);
    println!("  Target: {}", scenario.target.url);
    println!("  Steps: {}", scenario.steps.len());
    println!(
        "  Poll: {:?} every {:?}",
        scenario.sync.poll.timeout(),
        scenario.sync.poll.interval()
    );
    println!(
        "  New-window poll: {:?} every {:?}",
        scenario.sync.switch.timeout(),
        scenario.sync.switch.interval()
    );
    if !scenario.params.is_empty() {
        println!("  Parameters: {}", scenario.params.len());
        let mut names: Vec<_> = scenario.params.keys().collect();
        names.sort();
        for name in names {
            let def = &scenario.params[name];
            let req = if def.required { " (required)" } else { "" };
            let desc = def.description.as_deref().unwrap_or("");
            println!("    - {}{}: {}", name, req, desc);
        }
    }
    if let Some(ref success) = scenario.success {
        println!("  Success conditions: {}", success.conditions().count());
    }
    if let Some(retry) = scenario.on_failure.as_ref().and_then(|f| f.retry.as_ref()) {
        println!("  Retry attempts: {}", retry.attempts);
    }
}
