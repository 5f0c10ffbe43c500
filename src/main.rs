use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use image::ImageFormat;
use phantom::payload::DEFAULT_MIME;
use phantom::{Carrier, Dispatcher, Operation, Payload, PhantomError, Storage, armor, stego};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

mod auth;

const DEFAULT_LOG_FILTER: &str = "phantom=warn";

/// Name used for a decrypted file whose recorded name is unusable.
const FALLBACK_FILE_NAME: &str = "phantom_decrypted";

#[derive(Debug, clap::Args)]
struct InputArgs {
    /// Text to process
    text: Option<String>,

    /// Read the text from a file instead
    #[arg(short, long, value_name = "PATH", conflicts_with = "text")]
    input: Option<PathBuf>,
}

impl InputArgs {
    fn read(&self) -> Result<String> {
        match (&self.text, &self.input) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => Storage::new(path).load_string(),
            (None, None) => bail!("nothing to process: pass TEXT or --input PATH"),
        }
    }
}

#[derive(Debug, clap::Args)]
struct OutputArgs {
    /// Write the result to a file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Overwrite existing output files
    #[arg(long, default_value_t = false)]
    force: bool,
}

impl OutputArgs {
    fn target(&self) -> Result<Option<Storage>> {
        self.output
            .as_deref()
            .map(|path| writable(path, self.force))
            .transpose()
    }
}

#[derive(Debug, Parser)]
#[command(name = "phantom")]
#[command(
    version,
    about = "Password-protected secure blocks, optionally hidden inside images."
)]
struct Cli {
    /// Log filter, e.g. `phantom=debug`
    #[arg(
        long,
        global = true,
        value_name = "FILTER",
        env = "PHANTOM_LOG",
        default_value = DEFAULT_LOG_FILTER
    )]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Encrypts text or a file into a secure block
    Encode {
        #[command(flatten)]
        input: InputArgs,

        /// Encrypt a file instead of text
        #[arg(long, value_name = "PATH", conflicts_with_all = ["text", "input"])]
        file: Option<PathBuf>,

        /// MIME type recorded alongside --file
        #[arg(long, default_value = DEFAULT_MIME, requires = "file")]
        mime: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Decrypts a secure block
    Decode {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Hides a message inside an image, encrypting it first unless --raw
    Hide {
        /// Image to hide the message in
        #[arg(long, value_name = "IMAGE")]
        carrier: PathBuf,

        #[command(flatten)]
        input: InputArgs,

        /// Hide the text as-is
        #[arg(long, default_value_t = false)]
        raw: bool,

        /// Where to write the resulting PNG
        #[arg(short, long, value_name = "PNG")]
        output: PathBuf,

        /// Overwrite the output image if it exists
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Extracts a hidden message, decrypting it if it is a secure block
    Reveal {
        /// Image holding the message
        #[arg(long, value_name = "IMAGE")]
        carrier: PathBuf,

        /// Print the hidden text without decrypting it
        #[arg(long, default_value_t = false)]
        raw: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Shows how much an image can hide
    Capacity {
        #[arg(long, value_name = "IMAGE")]
        carrier: PathBuf,
    },

    /// Runs JSON-lines jobs from stdin concurrently
    ///
    /// Each line is `{"operation":"encode"|"decode","payload":"..","password":".."}`.
    /// Results are printed as JSON lines in input order.
    Batch,
}

#[derive(Debug, Deserialize)]
struct BatchJob {
    operation: Operation,
    payload: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct BatchResult {
    index: usize,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl BatchResult {
    fn new(index: usize, outcome: Result<String, String>) -> Self {
        match outcome {
            Ok(result) => Self {
                index,
                success: true,
                result: Some(result),
                error: None,
            },
            Err(error) => Self {
                index,
                success: false,
                result: None,
                error: Some(error),
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Cli::parse();
    init_logging(&args.log);

    match run(args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(command: Commands) -> Result<()> {
    let dispatcher = Arc::new(Dispatcher::new()?);

    match command {
        Commands::Encode {
            input,
            file,
            mime,
            output,
        } => {
            let target = output.target()?;
            let plaintext = match file {
                Some(path) => {
                    let data = Storage::new(&path).load()?;
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
                    Payload::file(&name, &mime, data).to_plaintext()
                }
                None => input.read()?,
            };

            let password = auth::read_new_password()?;
            let block = dispatcher
                .dispatch(Operation::Encode, plaintext, password)
                .await?;

            match target {
                Some(storage) => {
                    storage.save(block.as_bytes())?;
                    println!("secure block written to {}", storage.path().display());
                }
                None => println!("{block}"),
            }
        }
        Commands::Decode { input, output } => {
            let target = output.target()?;
            let block = input.read()?;
            // Pasted blocks often come with text around them.
            if !block.contains(armor::BLOCK_MARKER) {
                return Err(PhantomError::Format("missing block header").into());
            }

            let password = auth::read_password()?;
            let plaintext = dispatcher
                .dispatch(Operation::Decode, block, password)
                .await?;

            write_payload(Payload::from_plaintext(plaintext), target, output.force)?;
        }
        Commands::Hide {
            carrier,
            input,
            raw,
            output,
            force,
        } => {
            let target = writable(&output, force)?;
            if !has_png_extension(&output) {
                warn!(path = %output.display(), "output is always PNG encoded");
            }

            let carrier = load_carrier(&carrier)?;
            let text = input.read()?;

            // Fail on capacity before asking for a password.
            let needed = if raw {
                text.len()
            } else {
                phantom::encoded_len(text.len())
            };
            if needed > carrier.capacity() {
                return Err(PhantomError::Capacity {
                    needed: (needed + stego::END_MARKER.len()) * 8,
                    available: carrier.capacity_bits(),
                }
                .into());
            }

            let secret = if raw {
                text
            } else {
                let password = auth::read_new_password()?;
                dispatcher
                    .dispatch(Operation::Encode, text, password)
                    .await?
            };

            let hidden = stego::embed(&secret, &carrier)?;
            target.save(&encode_png(hidden)?)?;
            println!(
                "hid {} bytes in {}",
                secret.len(),
                target.path().display()
            );
        }
        Commands::Reveal {
            carrier,
            raw,
            output,
        } => {
            let target = output.target()?;
            let carrier = load_carrier(&carrier)?;
            let secret = stego::extract(&carrier)?;

            let payload = if raw || !armor::is_block(&secret) {
                Payload::Text(secret)
            } else {
                debug!("hidden text is a secure block, decrypting");
                let password = auth::read_password()?;
                let plaintext = dispatcher
                    .dispatch(Operation::Decode, secret, password)
                    .await?;
                Payload::from_plaintext(plaintext)
            };

            write_payload(payload, target, output.force)?;
        }
        Commands::Capacity { carrier } => {
            let carrier = load_carrier(&carrier)?;
            let raw = carrier.capacity();
            let encrypted = (0..=raw)
                .rev()
                .find(|&len| phantom::encoded_len(len) <= raw)
                .unwrap_or(0);

            println!("dimensions:         {}x{}", carrier.width(), carrier.height());
            println!("raw capacity:       {raw} bytes");
            println!("encrypted capacity: {encrypted} bytes of plaintext");
        }
        Commands::Batch => run_batch(dispatcher).await?,
    }

    Ok(())
}

async fn run_batch(dispatcher: Arc<Dispatcher>) -> Result<()> {
    let mut results = Vec::new();
    let mut jobs = JoinSet::new();

    for (index, line) in io::stdin().lock().lines().enumerate() {
        let line = line.context("failed to read batch input")?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<BatchJob>(&line) {
            Ok(job) => {
                let dispatcher = Arc::clone(&dispatcher);
                jobs.spawn(async move {
                    let outcome = dispatcher
                        .dispatch(job.operation, job.payload, Zeroizing::new(job.password))
                        .await
                        .map_err(|e| e.to_string());
                    (index, outcome)
                });
            }
            Err(e) => results.push(BatchResult::new(index, Err(format!("invalid job: {e}")))),
        }
    }

    while let Some(joined) = jobs.join_next().await {
        let (index, outcome) = joined.context("batch job panicked")?;
        results.push(BatchResult::new(index, outcome));
    }
    results.sort_by_key(|r| r.index);

    let mut out = io::stdout().lock();
    for result in &results {
        serde_json::to_writer(&mut out, result)?;
        writeln!(out)?;
    }

    Ok(())
}

/// Opens `path` for writing, refusing to clobber an existing file unless forced.
fn writable(path: &Path, force: bool) -> Result<Storage> {
    let storage = Storage::new(path);
    if storage.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Ok(storage)
}

fn write_payload(payload: Payload, target: Option<Storage>, force: bool) -> Result<()> {
    match payload {
        Payload::Text(text) => match target {
            Some(storage) => {
                storage.save(text.as_bytes())?;
                println!("message written to {}", storage.path().display());
            }
            None => println!("{text}"),
        },
        Payload::File { name, mime, data } => {
            let storage = match target {
                Some(storage) => storage,
                None => writable(&file_output_path(&name), force)?,
            };
            storage.save(&data)?;
            println!(
                "file '{name}' ({mime}, {} bytes) written to {}",
                data.len(),
                storage.path().display()
            );
        }
    }
    Ok(())
}

/// Keeps only the final component of a recorded file name.
fn file_output_path(name: &str) -> PathBuf {
    Path::new(name)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(FALLBACK_FILE_NAME))
}

fn has_png_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

fn load_carrier(path: &Path) -> Result<Carrier> {
    let bytes = Storage::new(path).load()?;
    let image = image::load_from_memory(&bytes)
        .with_context(|| format!("failed to decode image {}", path.display()))?;

    Ok(Carrier::from_image(&image))
}

fn encode_png(carrier: Carrier) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    carrier
        .into_image()
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("failed to encode PNG")?;

    Ok(png)
}
