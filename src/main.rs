use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use digimagang::{Site, SiteConfig};
use serde::Serialize;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "digimagang")]
#[command(about = "Inspect and follow the Digimagang landing page content")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the snapshot of one domain, or of all of them
    Snapshot {
        /// programs, testimonials, requirements, commission or contact
        domain: Option<String>,
    },
    /// Print the admin dashboard numbers
    Summary,
    /// Keep change feeds running and log reconciliation
    Watch {
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to render snapshot")?;
    println!("{text}");
    Ok(())
}

fn print_snapshot(site: &Site, domain: &str) -> Result<()> {
    match domain {
        "programs" => print_json(&site.programs.snapshot()),
        "testimonials" => print_json(&site.testimonials.snapshot()),
        "requirements" => print_json(&site.requirements.snapshot()),
        "commission" => print_json(&site.commission.snapshot()),
        "contact" => print_json(&site.contact.snapshot()),
        other => bail!("Unknown domain '{other}'"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("digimagang=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let site = Site::from_config(&SiteConfig::from_env()).context("Invalid remote configuration")?;
    site.load_all().await;

    match cli.command {
        Command::Snapshot { domain: Some(domain) } => print_snapshot(&site, &domain)?,
        Command::Snapshot { domain: None } => {
            for domain in ["programs", "testimonials", "requirements", "commission", "contact"] {
                print_snapshot(&site, domain)?;
            }
        }
        Command::Summary => print_json(&site.summary())?,
        Command::Watch { seconds } => {
            info!(seconds, remote = site.is_remote(), "watching change feeds");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                _ = tokio::signal::ctrl_c() => info!("interrupted"),
            }
            print_json(&site.summary())?;
        }
    }

    site.dispose();
    Ok(())
}
