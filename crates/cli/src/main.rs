use std::env;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use milky_rag::config::{load_file_config, DEFAULT_CONFIG_PATH};
use milky_rag::{
    FileStoreAdmin, GeminiClient, GeminiFileSearch, IndexingService, QueryPipeline, RagConfig,
    RecordStore, UploadInput,
};

#[derive(Parser, Debug)]
#[command(name = "milky", version, about = "Manage and query a Gemini file search store")]
struct Cli {
    /// TOML config file; environment variables take precedence.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new file search store and print its resource name.
    CreateStore { display_name: String },
    /// List locally recorded uploads, newest first.
    List,
    /// List documents present in the remote store.
    ListRemote,
    /// Upload a file and wait until it is indexed.
    Upload {
        path: PathBuf,
        #[arg(long)]
        display_name: Option<String>,
    },
    /// Delete an upload locally and remotely.
    Delete { id: String },
    /// Ask a question against the store.
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::CreateStore { display_name } => {
            let client = GeminiClient::from_env()?;
            let store = client.create_store(&display_name).await?;
            info!(store = %store.name, "file search store created");
            println!("{}", store.name);
            println!("set FILE_SEARCH_STORE_NAME={} to use it", store.name);
        }
        Commands::List => {
            let config = load_config(cli.config.as_deref())?;
            let store = RecordStore::open(&config.index_file)?;
            print_json(&store.list_sorted())?;
        }
        Commands::ListRemote => {
            let config = load_config(cli.config.as_deref())?;
            let remote = remote(&config)?;
            print_json(&remote.list_documents().await?)?;
        }
        Commands::Upload { path, display_name } => {
            let config = load_config(cli.config.as_deref())?;
            let admin = admin(&config)?;
            let file = File::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned());
            let record = admin
                .upload_file_and_index(UploadInput {
                    reader: file,
                    filename,
                    display_name,
                })
                .await?;
            print_json(&record)?;
        }
        Commands::Delete { id } => {
            let config = load_config(cli.config.as_deref())?;
            admin(&config)?.delete_file(&id).await?;
            println!("deleted {id}");
        }
        Commands::Ask { question } => {
            let config = load_config(cli.config.as_deref())?;
            let pipeline = QueryPipeline::new(remote(&config)?)
                .with_system_prompt(config.system_prompt.clone());
            let answer = pipeline.ask(&question.join(" ")).await?;
            println!("{answer}");
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<RagConfig> {
    let explicit = path
        .map(Path::to_path_buf)
        .or_else(|| env::var_os("MILKY_CONFIG").map(PathBuf::from));
    let file = match explicit {
        Some(path) if !path.exists() => {
            return Err(anyhow!("config file {} does not exist", path.display()))
        }
        Some(path) => load_file_config(&path)?,
        None => load_file_config(Path::new(DEFAULT_CONFIG_PATH))?,
    };
    RagConfig::resolve(file, |name| env::var(name).ok())
}

fn remote(config: &RagConfig) -> Result<Arc<GeminiFileSearch>> {
    let client = GeminiClient::with_base_url(config.api_key.clone(), config.base_url.clone())?;
    Ok(Arc::new(GeminiFileSearch::new(
        client,
        config.store_name.clone(),
        config.model.clone(),
    )))
}

fn admin(config: &RagConfig) -> Result<FileStoreAdmin<Arc<dyn IndexingService>>> {
    let indexer: Arc<dyn IndexingService> = remote(config)?;
    let store = RecordStore::open(&config.index_file)?;
    Ok(FileStoreAdmin::open(
        store,
        indexer,
        config.upload_dir.clone(),
        config.poll_settings(),
    )?)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}
