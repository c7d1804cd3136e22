use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::config::{load_config, ConnectionConfig};
use crate::config_paths::{connection_config_path, CONFIG_ENV_VAR};
use crate::error::{Error, Result};
use crate::s3::S3Store;
use crate::session::{self, bucket_list, render_buckets, LoginInput};
use crate::state::{BrowserState, NoticeLevel};
use crate::upload::pick_files;

#[derive(Parser, Debug)]
#[command(name = "thumbshelf")]
#[command(version, about = "Browse image folders stored in an S3-compatible bucket")]
pub struct Args {
    /// Connection record to use instead of the default location
    #[arg(long, global = true, env = CONFIG_ENV_VAR)]
    pub config: Option<PathBuf>,

    /// Bucket to open (default: the record's defaultBucket)
    #[arg(short, long, global = true)]
    pub bucket: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Check credentials against the endpoint and save them
    Login(LoginArgs),
    /// Forget the saved connection
    Logout,
    /// List the buckets visible to the saved connection
    Buckets,
    #[command(flatten)]
    Browse(BrowseCommand),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct LoginArgs {
    #[arg(long)]
    pub endpoint: String,
    #[arg(long)]
    pub port: String,
    #[arg(long)]
    pub ssl: bool,
    #[arg(long)]
    pub access_key: String,
    #[arg(long, env = "THUMBSHELF_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,
    #[arg(long)]
    pub default_bucket: Option<String>,
}

/// Commands that work inside one bucket.
#[derive(Subcommand, Debug, Clone)]
pub enum BrowseCommand {
    /// Show the folder tree
    Tree {
        /// Expand every folder
        #[arg(long)]
        all: bool,
        /// Folder to highlight
        folder: Option<String>,
    },
    /// List the thumbnails of a folder
    Ls {
        folder: String,
        /// Newest first
        #[arg(long)]
        desc: bool,
    },
    /// Show both halves of one image
    Preview { folder: String, name: String },
    /// Upload image files or directories into a folder
    Upload {
        folder: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Delete images (thumbnail and original) from a folder
    Rm {
        folder: String,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Create a folder
    Mkdir {
        /// Parent folder (default: bucket root)
        #[arg(long, default_value = "")]
        parent: String,
        name: String,
    },
    /// Delete a folder and everything in it
    Rmdir { folder: String },
    /// Reload tree and content
    Refresh { folder: Option<String> },
}

impl Args {
    fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => connection_config_path(),
        }
    }

    pub async fn execute(&self) -> Result<String> {
        let config_path = self.config_path()?;
        match &self.command {
            Command::Login(login) => login.execute(&config_path).await,
            Command::Logout => {
                session::logout(&config_path)?;
                Ok("logged out".to_string())
            }
            Command::Buckets => {
                let config = require_login(&config_path)?;
                let store = S3Store::new(&config)?;
                Ok(render_buckets(&bucket_list(&store).await?))
            }
            Command::Browse(command) => {
                let config = require_login(&config_path)?;
                let bucket = self
                    .bucket
                    .clone()
                    .or_else(|| config.default_bucket.clone())
                    .ok_or(Error::NoBucket)?;
                let store = Arc::new(S3Store::new(&config)?);
                let mut state = BrowserState::new(store, config, &bucket);
                state.open().await;
                let result = command.execute(&mut state).await;
                finish(&mut state, result)
            }
        }
    }
}

fn require_login(config_path: &Path) -> Result<ConnectionConfig> {
    load_config(config_path).ok_or(Error::NotLoggedIn)
}

impl LoginArgs {
    async fn execute(&self, config_path: &Path) -> Result<String> {
        let input = LoginInput {
            end_point: self.endpoint.clone(),
            port: self.port.clone(),
            use_ssl: self.ssl,
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            default_bucket: self.default_bucket.clone(),
        };
        let config = input.validate()?;
        let store = S3Store::new(&config).map_err(|err| Error::Login(err.to_string()))?;
        let buckets = session::login(&store, &config, config_path).await?;
        Ok(format!(
            "logged in as {}\n{}",
            config.identity(),
            render_buckets(&buckets)
        ))
    }
}

impl BrowseCommand {
    pub async fn execute(&self, state: &mut BrowserState) -> Result<String> {
        match self {
            BrowseCommand::Tree { all, folder } => {
                if let Some(folder) = folder {
                    state.activate_folder(folder).await;
                    state.expand_to(folder);
                }
                if *all {
                    let paths = state.navigator().tree().folder_paths();
                    for path in paths {
                        state.expand_to(&path);
                    }
                }
                Ok(state.navigator().render())
            }
            BrowseCommand::Ls { folder, desc } => {
                state.activate_folder(folder).await;
                if *desc {
                    state.toggle_sort();
                }
                Ok(state.view().render(true))
            }
            BrowseCommand::Preview { folder, name } => {
                state.activate_folder(folder).await;
                Ok(state.preview(name).await?.render())
            }
            BrowseCommand::Upload { folder, paths } => {
                state.activate_folder(folder).await;
                let files = pick_files(paths.clone()).await?;
                if files.is_empty() {
                    return Ok("no image files to upload".to_string());
                }
                state
                    .upload(&files, |progress| {
                        let status = match &progress.error {
                            None => "ok".to_string(),
                            Some(reason) => format!("failed: {reason}"),
                        };
                        eprintln!(
                            "[{}/{}] {} {status}",
                            progress.done, progress.total, progress.file_name
                        );
                    })
                    .await?;
                Ok(state.view().render(true))
            }
            BrowseCommand::Rm { folder, names } => {
                state.activate_folder(folder).await;
                for name in names {
                    if !state.selection().contains(name) {
                        state.toggle_item(name)?;
                    }
                }
                state.delete_selected().await?;
                Ok(state.view().render(true))
            }
            BrowseCommand::Mkdir { parent, name } => {
                if !parent.is_empty() {
                    state.activate_folder(parent).await;
                }
                state.create_folder(name).await?;
                Ok(state.render())
            }
            BrowseCommand::Rmdir { folder } => {
                state.delete_folder(folder).await?;
                Ok(state.render())
            }
            BrowseCommand::Refresh { folder } => {
                if let Some(folder) = folder {
                    state.activate_folder(folder).await;
                }
                state.refresh().await;
                Ok(state.render())
            }
        }
    }
}

/// Prepends informational notices to the output and sends error notices to
/// stderr. A failed command already carries its error, so its notices are
/// dropped.
fn finish(state: &mut BrowserState, result: Result<String>) -> Result<String> {
    let notices = state.take_notices();
    let output = result?;
    let mut lines = Vec::new();
    for notice in notices {
        match notice.level {
            NoticeLevel::Info => lines.push(notice.message),
            NoticeLevel::Error => eprintln!("warning: {}", notice.message),
        }
    }
    lines.push(output);
    Ok(lines.join("\n"))
}
