mod classify;
mod config;
mod github;
mod period;
mod report;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info, info_span};
use tracing_subscriber::EnvFilter;

use crate::classify::Scope;
use crate::github::{GitHubError, ReqwestTransport, SearchClient};
use crate::period::{parse_date, Period};
use crate::report::{OutputFormat, OutputOptions};

/// gh-analytics: classify an organization's merged pull requests by review
/// outcome, or its issues by bug label and resolution, over a date window.
#[derive(Parser, Debug)]
#[command(name = "gh-analytics", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merged PRs: approved cleanly vs. changes requested before approval
    Prs {
        /// Only PRs opened by this author
        #[arg(long)]
        author: Option<String>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Issues: bug vs. non-bug, opened vs. resolved in the window
    Issues {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// GitHub organization (e.g. rust-lang)
    #[arg(long)]
    org: String,

    /// Window start, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    from_date: NaiveDate,

    /// Window end, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    to_date: NaiveDate,

    /// GitHub token (alternative to the GITHUB_TOKEN env var)
    #[arg(long)]
    token: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,

    /// Export file (.json or .csv)
    #[arg(long)]
    export: Option<PathBuf>,

    /// Show detailed progress logs
    #[arg(short, long)]
    verbose: bool,

    /// Skip the per-item listings in table output
    #[arg(long)]
    no_details: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let (author, common) = match &cli.command {
        Command::Prs { author, common } => (author.clone(), common),
        Command::Issues { common } => (None, common),
    };

    let default_filter = if common.verbose { "gh_analytics=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let period = Period::new(common.from_date, common.to_date)?;
    let scope = Scope {
        organization: common.org.clone(),
        author,
        period,
    };
    let _main_span = info_span!("run", org = %scope.organization, period = %scope.period).entered();

    info!("loading configuration");
    let config = config::Config::load()?;
    let token = config
        .github_token(common.token.as_deref())
        .ok_or(GitHubError::MissingToken)?;
    debug!(api_url = %config.github.api_url, "resolved configuration");

    let transport = ReqwestTransport::new(&token)?;
    let mut client = SearchClient::new(Box::new(transport), &config.github.api_url, config.search);

    let result = match &cli.command {
        Command::Prs { .. } => {
            info!(author = ?scope.author, "analyzing merged pull requests");
            classify::analyze_pull_requests(&mut client, &scope).await?
        }
        Command::Issues { .. } => {
            info!("analyzing issues");
            classify::analyze_issues(&mut client, &scope).await?
        }
    };
    info!(total = result.total(), excluded = result.excluded(), "analysis complete");

    if result.total() == 0 {
        println!("No matching items found for {}.", scope.period);
        return Ok(());
    }

    let options = OutputOptions {
        format: common.output,
        export: common.export.clone(),
        show_details: !common.no_details,
    };
    report::output(&result, &options)?;
    info!(rate_limit_remaining = ?client.rate_limit().remaining(), "done");

    Ok(())
}
