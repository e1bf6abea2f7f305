use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cac::{self, ComponentType};
use crate::compass::CompassClient;
use crate::config::Config;
use crate::gitlab::GitlabClient;
use crate::metrics;
use crate::output::{self, Spinner};
use crate::platform::{JobReceiver, KeyValueStore, LocalQueue, LocalStore};
use crate::server;
use crate::services::{
    backfill, data_provider, groups, import, AppContext, ContextJobHandler, Settings,
};

#[derive(Parser)]
#[command(name = "compass-gitlab")]
#[command(author, version, about = "GitLab to Compass integration", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./compass-gitlab.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Overrides `gitlab.base-url`
    #[arg(long, global = true, env = "GITLAB_URL")]
    gitlab_url: Option<String>,

    /// Overrides `compass.api-token`
    #[arg(long, global = true, env = "COMPASS_API_TOKEN", hide_env_values = true)]
    compass_token: Option<String>,

    /// Print JSON instead of tables
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook receiver, resolver endpoints and job worker
    Serve {
        /// Overrides `server.bind`
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Check a compass.yml file
    Validate {
        file: PathBuf,

        /// Component type assumed when the file has no typeId
        #[arg(short = 't', long, default_value = "SERVICE")]
        default_type: String,
    },
    /// List connected groups
    Groups,
    /// List a connected group's projects and their import state
    Projects {
        #[arg(short, long)]
        group: u64,

        #[arg(short, long, default_value_t = 1)]
        page: u32,

        #[arg(short, long)]
        search: Option<String>,
    },
    /// Run the historical backfill now, or preview one project's data
    Backfill {
        /// Project URL to preview instead of backfilling every group
        #[arg(short = 'P', long)]
        project: Option<String>,
    },
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(url) = &self.gitlab_url {
            config.gitlab.base_url.clone_from(url);
        }
        if let Some(token) = &self.compass_token {
            config.compass.api_token = Some(token.clone());
        }
        Ok(config)
    }

    fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    async fn execute_validate(&self, file: &Path, default_type: &str) -> Result<()> {
        let default_type = ComponentType::from_type_id(default_type)
            .with_context(|| format!("Unknown component type: {default_type}"))?;
        let content = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;

        let errors = cac::load_config(&content, default_type).err().unwrap_or_default();
        if self.json {
            Self::print_json(&errors)?;
        } else {
            print!("{}", output::render_validation(&file.display().to_string(), &errors));
        }

        if !errors.is_empty() {
            bail!("{} is not a valid config file", file.display());
        }
        Ok(())
    }

    async fn execute_serve(&self, config: &Config, bind: Option<&str>) -> Result<()> {
        metrics::register_metrics()?;
        let (ctx, receiver) = build_context(config).await?;

        tokio::spawn(receiver.run(Arc::new(ContextJobHandler(Arc::clone(&ctx)))));
        if let Some(job_id) = backfill::schedule_backfill(&ctx).await? {
            info!("Backfill queued as {job_id}");
        }

        server::start_server(bind.unwrap_or(&config.server.bind), ctx).await
    }

    async fn execute_backfill(&self, config: &Config, project: Option<&str>) -> Result<()> {
        let (ctx, _receiver) = build_context(config).await?;

        if let Some(url) = project {
            let spinner = Spinner::start(format!("Collecting data for {url}"));
            let response = match data_provider::get_data_for_url(&ctx, url).await {
                Ok(response) => {
                    spinner.finish("Collected project data");
                    response
                }
                Err(e) => {
                    spinner.fail("Could not collect project data");
                    return Err(e.into());
                }
            };

            if self.json {
                return Self::print_json(&response);
            }
            let data = backfill::BackfillData {
                builds: response.events.builds,
                deployments: response.events.deployments,
                metrics: response.metrics,
            };
            print!("{}", output::render_backfill(url, &data));
            return Ok(());
        }

        let spinner = Spinner::start("Backfilling connected groups");
        match backfill::run_backfill_job(&ctx).await {
            Ok(true) => spinner.finish("Backfill complete"),
            Ok(false) => spinner.finish("Backfill already applied for this schema version"),
            Err(e) => {
                spinner.fail("Backfill failed");
                return Err(e.into());
            }
        }
        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        if let Commands::Validate { file, default_type } = &self.command {
            return self.execute_validate(file, default_type).await;
        }

        let config = self.load_config()?;
        match &self.command {
            Commands::Serve { bind } => self.execute_serve(&config, bind.as_deref()).await,
            Commands::Groups => {
                let (ctx, _receiver) = build_context(&config).await?;
                let groups = groups::get_connected_groups(&ctx).await?;
                if self.json {
                    Self::print_json(&groups)
                } else {
                    print!("{}", output::render_groups(&groups));
                    Ok(())
                }
            }
            Commands::Projects {
                group,
                page,
                search,
            } => {
                let (ctx, _receiver) = build_context(&config).await?;
                let spinner = Spinner::start(format!("Fetching projects of group {group}"));
                let projects = import::get_group_projects(&ctx, *group, *page, search.as_deref()).await;
                let projects = match projects {
                    Ok(projects) => {
                        spinner.finish(format!("Fetched {} projects", projects.projects.len()));
                        projects
                    }
                    Err(e) => {
                        spinner.fail("Could not fetch projects");
                        return Err(e.into());
                    }
                };
                if self.json {
                    Self::print_json(&projects)
                } else {
                    print!("{}", output::render_projects(&projects));
                    Ok(())
                }
            }
            Commands::Backfill { project } => self.execute_backfill(&config, project.as_deref()).await,
            Commands::Validate { .. } => Ok(()),
        }
    }
}

/// Wire the clients, store and queue together. The receiver must be run for
/// queued jobs to execute.
pub async fn build_context(config: &Config) -> Result<(Arc<AppContext>, JobReceiver)> {
    let gitlab = GitlabClient::new(&config.gitlab.base_url)?;
    let compass = CompassClient::new(&config.compass)?;

    let store: Arc<dyn KeyValueStore> = match config.storage_path()? {
        Some(path) => Arc::new(LocalStore::open(path).await?),
        None => Arc::new(LocalStore::in_memory()),
    };
    let (queue, receiver) = LocalQueue::new();

    let ctx = AppContext {
        gitlab,
        compass: Arc::new(compass),
        store,
        queue: Arc::new(queue),
        settings: Settings::from_config(config),
    };
    Ok((Arc::new(ctx), receiver))
}
