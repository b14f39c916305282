use anyhow::Result;
use clap::Parser;
use obslink::{
    commands,
    config::{Config, Overrides},
    runtime::RealRuntime,
    workflow::ProjectMetaBuilder,
};
use std::path::PathBuf;

/// obslink - inspect and set up linked build-service projects
///
/// Credentials are read from OBS_USER and OBS_PASSWORD, or from the config
/// file (~/.config/obslink/config.toml by default).
///
/// Examples:
///   obslink links openSUSE:Factory:Staging:A --recursive
///   obslink packages home:alice:branch --inherited
#[derive(Parser, Debug)]
#[command(author, version = env!("OBSLINK_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Build service API URL (defaults to https://api.opensuse.org; also via OBS_APIURL)
    #[arg(long = "api-url", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// User to authenticate as (also via OBS_USER)
    #[arg(long, short = 'u', value_name = "USER", global = true)]
    pub user: Option<String>,

    /// Config file to read instead of the default one
    #[arg(long, short = 'c', value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Show the projects a project links to
    Links(LinksArgs),

    /// Show the packages of a project
    Packages(PackagesArgs),

    /// Create a subproject inheriting the parent's meta
    Subproject(SubprojectArgs),

    /// Create or overwrite a project
    CreateProject(CreateProjectArgs),

    /// Delete a project and everything in it
    DeleteProject(DeleteProjectArgs),
}

#[derive(clap::Args, Debug)]
pub struct LinksArgs {
    #[arg(value_name = "PROJECT")]
    pub project: String,

    /// Follow links of linked projects as well
    #[arg(long, short = 'r')]
    pub recursive: bool,
}

#[derive(clap::Args, Debug)]
pub struct PackagesArgs {
    #[arg(value_name = "PROJECT")]
    pub project: String,

    /// Include packages inherited through project links
    #[arg(long, short = 'i')]
    pub inherited: bool,

    /// Print a JSON array instead of project/name lines
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct SubprojectArgs {
    #[arg(value_name = "PARENT")]
    pub parent: String,

    /// Name below the parent; the new project is PARENT:NAME
    #[arg(value_name = "NAME")]
    pub name: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct CreateProjectArgs {
    #[arg(value_name = "PROJECT")]
    pub name: String,

    /// Project to link to (repeatable)
    #[arg(long = "link", value_name = "PROJECT")]
    pub links: Vec<String>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Add a `standard` repository building for x86_64
    #[arg(long)]
    pub with_repo: bool,
}

#[derive(clap::Args, Debug)]
pub struct DeleteProjectArgs {
    #[arg(value_name = "PROJECT")]
    pub name: String,
}

impl CreateProjectArgs {
    fn into_meta(self) -> ProjectMetaBuilder {
        let meta = ProjectMetaBuilder::new(self.name)
            .title(self.title.unwrap_or_default())
            .description(self.description.unwrap_or_default())
            .with_repo(self.with_repo);
        self.links.into_iter().fold(meta, |meta, link| meta.link(link))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let overrides = Overrides {
        api_url: cli.api_url,
        user: cli.user,
        config_path: cli.config,
    };
    let client = Config::load(&RealRuntime, overrides)?.client()?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Links(args) => {
            commands::links(&client, &args.project, args.recursive, &mut out).await?
        }
        Commands::Packages(args) => {
            commands::packages(&client, &args.project, args.inherited, args.json, &mut out)
                .await?
        }
        Commands::Subproject(args) => {
            commands::subproject(
                &client,
                &args.parent,
                &args.name,
                args.title.as_deref(),
                args.description.as_deref(),
                &mut out,
            )
            .await?
        }
        Commands::CreateProject(args) => {
            commands::create_project(&client, &args.into_meta()).await?
        }
        Commands::DeleteProject(args) => commands::delete_project(&client, &args.name).await?,
    }
    Ok(())
}
