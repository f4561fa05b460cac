use crate::{
    app_state::AppState,
    migrator::NaturkartanMigrator,
    municipalities::Municipalities,
    prompt::{AutoConfirm, ConsolePrompter},
    qid_cache::QidCache,
    scraper::NaturkartanScraper,
    wikidata::Wikidata,
};
use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;

#[derive(Parser)]
#[command(arg_required_else_help = true)]
#[command(name = "naturkartan")]
#[command(about = "Naturkartan trail scraper and Wikidata ID migrator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// downloads the trail search index into the debug folder
    Download {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// writes the CSV report of hiking trails
    Export {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        // Download fresh pages instead of replaying the debug folder
        #[arg(short, long)]
        download: bool,

        // Ask the operator about every trail
        #[arg(short, long)]
        interactive: bool,

        // Scrape publisher and county from the trail pages
        #[arg(short, long)]
        publishers: bool,

        // Look up trails that already have an item
        #[arg(long)]
        check_wikidata: bool,

        // CSV file, overrides the configured one
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// lists all municipalities
    Municipalities {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        // Resolve the Wikidata item of each municipality
        #[arg(short, long)]
        qids: bool,
    },

    /// migrates path based Naturkartan IDs on Wikidata to numeric ones
    Migrate {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        // Log edits instead of making them
        #[arg(long)]
        dry_run: bool,

        // Record link rot without asking
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct ShellCommands;

impl ShellCommands {
    fn path2str(path: &Option<PathBuf>) -> String {
        path.to_owned()
            .and_then(|p| p.into_os_string().into_string().ok())
            .unwrap_or("config.json".to_string())
    }

    fn path2app(path: &Option<PathBuf>) -> Result<AppState> {
        let config_file = Self::path2str(path);
        let app = AppState::from_config_file(&config_file)?;
        app.init_logging();
        Ok(app)
    }

    pub async fn run(&self) -> Result<()> {
        let cli = Cli::parse();
        match &cli.command {
            Some(Commands::Download { config }) => {
                let app = Self::path2app(config)?;
                let mut scraper = NaturkartanScraper::new(&app, Municipalities::default())?;
                scraper.download_all_pages().await?;
            }
            Some(Commands::Export {
                config,
                download,
                interactive,
                publishers,
                check_wikidata,
                output,
            }) => {
                let app = Self::path2app(config)?;
                let mut municipalities = Municipalities::new(&app)?;
                municipalities.download_and_parse().await?;
                let mut scraper = NaturkartanScraper::new(&app, municipalities)?;
                if *download {
                    scraper.download_all_pages().await?;
                } else {
                    scraper.load_hits_from_debug_pages(&app.debug_folder)?;
                }
                scraper.parse_hits_into_trails();
                if *publishers {
                    scraper.fetch_publishers().await?;
                }
                if *check_wikidata {
                    let wikidata = Wikidata::new(&app);
                    scraper.lookup_trails_in_wikidata(&wikidata).await?;
                }
                if *interactive {
                    scraper.ask_user_for_information(&mut ConsolePrompter)?;
                }
                let filename = output.to_owned().unwrap_or_else(|| app.csv_file.to_owned());
                scraper.export_trails_to_csv(&filename)?;
            }
            Some(Commands::Municipalities { config, qids }) => {
                let app = Self::path2app(config)?;
                let mut municipalities = Municipalities::new(&app)?;
                municipalities.download_and_parse().await?;
                let wikidata = Wikidata::new(&app);
                let mut cache = QidCache::default();
                let mut sorted: Vec<_> = municipalities.iter().collect();
                sorted.sort_by_key(|m| m.id);
                for m in sorted {
                    let name = m.name_sv().unwrap_or_default();
                    if !*qids {
                        info!("{}\t{name}", m.id);
                        continue;
                    }
                    match m.qid(&wikidata, &mut cache).await {
                        Ok(qid) => info!("{}\t{name}\t{qid}", m.id),
                        Err(e) => error!("{}\t{name}\t{e}", m.id),
                    }
                }
            }
            Some(Commands::Migrate {
                config,
                dry_run,
                yes,
            }) => {
                let app = Self::path2app(config)?;
                let wikidata = Wikidata::new(&app);
                let report = if *yes {
                    let mut migrator = NaturkartanMigrator::new(&app, wikidata, AutoConfirm)?;
                    migrator.set_dry_run(*dry_run);
                    migrator.start().await?
                } else {
                    let mut migrator = NaturkartanMigrator::new(&app, wikidata, ConsolePrompter)?;
                    migrator.set_dry_run(*dry_run);
                    migrator.start().await?
                };
                info!("{report}");
            }
            None => return Err(anyhow!("Unrecognized command")),
        }
        Ok(())
    }
}
