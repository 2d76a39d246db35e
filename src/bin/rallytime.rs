use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rallytime", about = "Fill cycle/lead/queue time fields on Rally work items")]
struct Cli {
    /// Config file path (default: ~/.config/rallytime/rallytime.yml)
    #[arg(long)]
    config: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute metrics and write them back for every configured workspace
    Run {
        /// Backtrack window override in days (0 forces a full refresh)
        #[arg(long)]
        days: Option<u32>,
        /// Compute and report change-sets without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Reprocess every item regardless of the backtrack window
        #[arg(long)]
        full: bool,
    },
    /// Load the configuration and print what a run would use
    CheckConfig,
}

/// Progress reporter that writes per-item diagnostics to stderr.
struct StderrProgress;

impl rallytime::FillProgress for StderrProgress {
    fn on_item_start(&self, formatted_id: &str, index: usize, total: usize) {
        eprintln!("[{}/{}] {}:", index + 1, total, formatted_id);
    }

    fn on_item_metrics(&self, _formatted_id: &str, metrics: &rallytime::TimeMetrics) {
        eprintln!(
            "  c:{} l:{} q:{}",
            metrics.cycle_time, metrics.lead_time, metrics.queue_time
        );
    }

    fn on_item_update(&self, _formatted_id: &str, fields: &str, dry_run: bool) {
        if dry_run {
            eprintln!("  would update: {fields}");
        } else {
            eprintln!("  update: {fields}");
        }
    }

    fn on_item_no_update(&self, _formatted_id: &str) {
        eprintln!("  no update");
    }

    fn on_item_error(&self, formatted_id: &str, error: &rallytime::Error) {
        eprintln!("  error on {formatted_id}: {error}");
    }

    fn on_type_complete(&self, report: &rallytime::FillReport) {
        eprintln!(
            "{}/{}: {} processed, {} updated, {} failed",
            report.workspace,
            report.object_type,
            report.items_processed,
            report.items_updated,
            report.items_failed
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config_path = match &cli.config {
        Some(path) => std::path::PathBuf::from(path),
        None => rallytime::Config::default_path()?,
    };
    let config = rallytime::Config::load(&config_path)?;

    match cli.command {
        Commands::Run {
            days,
            dry_run,
            full,
        } => {
            let options = rallytime::FillOptions {
                days,
                dry_run,
                full,
            };
            let reports = rallytime::fill::run(&config, &options, &StderrProgress).await?;
            let mut failed = false;
            for report in &reports {
                print_report(report);
                failed |= report.status == rallytime::FillStatus::Failed;
            }
            if failed {
                anyhow::bail!("one or more batches failed");
            }
        }
        Commands::CheckConfig => {
            print_config(&config_path, &config);
        }
    }

    Ok(())
}

fn print_report(report: &rallytime::FillReport) {
    println!("Fill: {}/{}", report.workspace, report.object_type);
    println!("  Status:    {:?}", report.status);
    println!("  Processed: {} items", report.items_processed);
    println!("  Updated:   {} items", report.items_updated);
    println!("  Failed:    {} items", report.items_failed);
    if let Some(ref err) = report.error {
        println!("  Error:     {err}");
    }
}

fn print_config(path: &std::path::Path, config: &rallytime::Config) {
    println!("Config: {}", path.display());
    for (name, ws) in &config.workspaces {
        println!("{name}:");
        println!("  id:        {}", ws.id);
        println!("  user:      {}", ws.user);
        println!("  pass:      ********");
        println!("  objects:   {}", ws.objects.join(", "));
        println!("  dryrun:    {}", ws.dryrun);
        match ws.effective_window(None, false) {
            Some(days) => println!("  window:    {days} days"),
            None => println!("  window:    full refresh"),
        }
        println!(
            "  fields:    cycle={} lead={} queue={}",
            ws.fields.cycle_time, ws.fields.lead_time, ws.fields.queue_time
        );
        if ws.enable.is_empty() {
            println!("  enable:    (none - compute and log only)");
        } else {
            println!("  enable:    {}", ws.enable.join(", "));
        }
        if let Some(ref project) = ws.filters.project {
            println!("  project:   {project}");
        }
    }
}
