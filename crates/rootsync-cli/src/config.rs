use anyhow::{Context, bail};
use clap::{Args, Parser};
use rootsync::{COORDINATE_BATCH_SIZE, DEFAULT_WORKERS, IDENTITY_BATCH_SIZE};
use rootsync_cave::{CaveConfig, DEFAULT_DATASTACK, DEFAULT_SERVER_ADDRESS, resolve_token};
use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

/// Settings shared by both tools.
///
/// Every flag except `--input` and `--output` can also be set through the
/// environment (or a `.env` file in the working directory).
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Input file: one root ID per line, either bare or as `N → ID` /
    /// `N -> ID`.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file. Derived from the input file name when omitted.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// CAVE datastack name.
    ///
    /// Environment variable: `CAVE_DATASTACK`
    #[arg(short, long, env = "CAVE_DATASTACK", default_value_t = String::from(DEFAULT_DATASTACK))]
    pub datastack: String,

    /// Number of concurrent single-ID lookups.
    ///
    /// Each worker holds at most one request against the chunkedgraph at a
    /// time. Raising this speeds up the lookup stage until the server starts
    /// throttling.
    ///
    /// Environment variable: `ROOTSYNC_WORKERS`
    #[arg(short, long, env = "ROOTSYNC_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Global CAVE server that hosts the info service.
    ///
    /// Environment variable: `CAVE_SERVER_ADDRESS`
    #[arg(long, env = "CAVE_SERVER_ADDRESS", default_value_t = String::from(DEFAULT_SERVER_ADDRESS))]
    pub server_address: String,

    /// CAVE API token. Falls back to the secret file when unset.
    ///
    /// Environment variable: `CAVE_TOKEN`
    #[arg(long, env = "CAVE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// JSON file with a `token` field.
    /// [default: ~/.cloudvolume/secrets/cave-secret.json]
    ///
    /// Environment variable: `CAVE_SECRET_FILE`
    #[arg(long, env = "CAVE_SECRET_FILE")]
    pub secret_file: Option<PathBuf>,

    /// Per-request HTTP timeout in seconds.
    ///
    /// Environment variable: `ROOTSYNC_TIMEOUT_SECS`
    #[arg(long, env = "ROOTSYNC_TIMEOUT_SECS", default_value_t = 120)]
    pub timeout_secs: u64,
}

/// Checks root IDs against the current segmentation and reports which ones
/// were split or merged since they were recorded.
#[derive(Parser, Debug, Clone)]
#[command(name = "validate-ids", version)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Supervoxels per bulk root lookup.
    ///
    /// Environment variable: `ROOTSYNC_BATCH_SIZE`
    #[arg(long, env = "ROOTSYNC_BATCH_SIZE", default_value_t = IDENTITY_BATCH_SIZE)]
    pub batch_size: usize,
}

/// Looks up one voxel coordinate inside each segment, as a tab-separated table
/// ready to paste into a spreadsheet.
#[derive(Parser, Debug, Clone)]
#[command(name = "fetch-coords", version)]
pub struct CoordsArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Level-2 chunks per bulk coordinate fetch. The L2 cache times out on
    /// large requests, so keep this small.
    ///
    /// Environment variable: `ROOTSYNC_BATCH_SIZE`
    #[arg(long, env = "ROOTSYNC_BATCH_SIZE", default_value_t = COORDINATE_BATCH_SIZE)]
    pub batch_size: usize,
}

/// Validated settings common to both tools.
#[derive(Clone)]
pub struct RunConfig {
    pub input: PathBuf,
    pub datastack: String,
    pub workers: usize,
    pub batch_size: usize,
    pub server_address: String,
    pub token: Option<String>,
    pub secret_file: Option<PathBuf>,
    pub timeout: Duration,
}

// Keeps the token out of logs.
impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("input", &self.input)
            .field("datastack", &self.datastack)
            .field("workers", &self.workers)
            .field("batch_size", &self.batch_size)
            .field("server_address", &self.server_address)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("secret_file", &self.secret_file)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RunConfig {
    fn new(args: CommonArgs, batch_size: usize) -> anyhow::Result<Self> {
        if args.workers == 0 {
            bail!("ROOTSYNC_WORKERS must be greater than 0");
        }
        if batch_size == 0 {
            bail!("ROOTSYNC_BATCH_SIZE must be greater than 0");
        }
        if args.timeout_secs == 0 {
            bail!("ROOTSYNC_TIMEOUT_SECS must be greater than 0");
        }
        if args.datastack.trim().is_empty() {
            bail!("CAVE_DATASTACK must not be empty");
        }
        if !args.input.is_file() {
            bail!("input file {} does not exist", args.input.display());
        }

        Ok(Self {
            input: args.input,
            datastack: args.datastack.trim().to_string(),
            workers: args.workers,
            batch_size,
            server_address: args.server_address,
            token: args.token,
            secret_file: args.secret_file,
            timeout: Duration::from_secs(args.timeout_secs),
        })
    }

    /// Resolves the API token and builds the CAVE connection settings.
    ///
    /// # Errors
    ///
    /// Fails if no token is configured and the secret file cannot be used.
    pub fn cave_config(&self) -> anyhow::Result<CaveConfig> {
        let token = resolve_token(self.token.as_deref(), self.secret_file.as_deref())
            .context("no usable CAVE token")?;
        Ok(CaveConfig::new(self.datastack.clone(), token)
            .with_server_address(self.server_address.clone())
            .with_timeout(self.timeout))
    }
}

/// Settings for `validate-ids`.
#[derive(Debug, Clone)]
pub struct ValidateConfig {
    pub run: RunConfig,
    /// Full report, one line per input ID.
    pub report: PathBuf,
    /// Only the IDs that resolved, one per line.
    pub clean: PathBuf,
}

impl TryFrom<ValidateArgs> for ValidateConfig {
    type Error = anyhow::Error;

    fn try_from(args: ValidateArgs) -> Result<Self, Self::Error> {
        let report = args
            .common
            .output
            .clone()
            .unwrap_or_else(|| sibling(&args.common.input, "_updated.txt"));
        let clean = sibling(&report, "_clean.txt");
        let run = RunConfig::new(args.common, args.batch_size)?;

        Ok(Self { run, report, clean })
    }
}

/// Settings for `fetch-coords`.
#[derive(Debug, Clone)]
pub struct CoordsConfig {
    pub run: RunConfig,
    pub output: PathBuf,
}

impl TryFrom<CoordsArgs> for CoordsConfig {
    type Error = anyhow::Error;

    fn try_from(args: CoordsArgs) -> Result<Self, Self::Error> {
        let output = args
            .common
            .output
            .clone()
            .unwrap_or_else(|| sibling(&args.common.input, "_coords.tsv"));
        let run = RunConfig::new(args.common, args.batch_size)?;

        Ok(Self { run, output })
    }
}

/// `dir/stem.ext` -> `dir/stem{suffix}`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    path.with_file_name(format!("{stem}{suffix}"))
}
