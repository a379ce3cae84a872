use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cred",
    about = "Authority-signed credential ledger",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Directory holding the chain store
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Path to a cred.toml configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage local signing identities
    Identity(IdentityArgs),
    /// Create the chain with a genesis block (no-op if it exists)
    Init(InitArgs),
    /// Sign and append a block of credential ids
    Append(AppendArgs),
    /// List blocks, newest first
    Blocks(BlocksArgs),
    /// Verify every block and link back to genesis
    Validate,
    /// Show block and credential counts
    Stats,
    /// Find a credential and print its inclusion proof
    Prove(ProveArgs),
    /// Check a credential against a root and proof file, offline
    Verify(VerifyArgs),
}

#[derive(Args)]
pub struct IdentityArgs {
    #[command(subcommand)]
    pub action: IdentityAction,
}

#[derive(Subcommand)]
pub enum IdentityAction {
    /// Generate a new key pair under `name`
    Create { name: String },
    /// List stored identities
    List,
}

#[derive(Args)]
pub struct InitArgs {
    /// Keystore identity that signs the genesis block
    #[arg(long)]
    pub signer: Option<String>,
}

#[derive(Args)]
pub struct AppendArgs {
    /// Keystore identity that signs the block
    #[arg(long)]
    pub signer: Option<String>,
    /// Raw credential identifiers
    #[arg(required = true)]
    pub ids: Vec<String>,
}

#[derive(Args)]
pub struct BlocksArgs {
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args)]
pub struct ProveArgs {
    pub id: String,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub id: String,
    /// Hex Merkle root of the block
    #[arg(long)]
    pub root: String,
    /// JSON file holding the proof (as printed by `cred prove`)
    #[arg(long)]
    pub proof: PathBuf,
}
