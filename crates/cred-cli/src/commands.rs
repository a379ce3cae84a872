use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use cred_chain::{verify_credential, AuthorityRegistry, Block, Chain};
use cred_crypto::{KeyPairSigner, MerkleProof, Signer, SigningKey, VerifyingKey};
use cred_store::FileKvStore;
use cred_types::{time, Digest};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::cli::*;
use crate::config::CliConfig;
use crate::keystore::Keystore;

/// Env var holding a hex signing key, used when `--signer` is absent.
const SIGNER_KEY_ENV: &str = "CRED_SIGNER_KEY_HEX";

struct Session {
    config: CliConfig,
    format: OutputFormat,
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = CliConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    debug!(
        data_dir = %config.data_dir.display(),
        sync_mode = ?config.sync_mode,
        "resolved configuration"
    );
    let session = Session {
        config,
        format: cli.format,
    };

    match cli.command {
        Command::Identity(args) => match args.action {
            IdentityAction::Create { name } => cmd_identity_create(&session, &name),
            IdentityAction::List => cmd_identity_list(&session),
        },
        Command::Init(args) => cmd_init(&session, args),
        Command::Append(args) => cmd_append(&session, args),
        Command::Blocks(args) => cmd_blocks(&session, args),
        Command::Validate => cmd_validate(&session),
        Command::Stats => cmd_stats(&session),
        Command::Prove(args) => cmd_prove(&session, args),
        Command::Verify(args) => cmd_verify(args, session.format),
    }
}

/// What `cred prove` prints and `cred verify` reads back.
#[derive(Serialize, Deserialize)]
struct ProofBundle {
    credential_id: String,
    block_height: u64,
    block_hash: Digest,
    merkle_root: Digest,
    proof: MerkleProof,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProofFile {
    Bundle(ProofBundle),
    Bare(MerkleProof),
}

impl ProofFile {
    fn into_proof(self) -> MerkleProof {
        match self {
            Self::Bundle(bundle) => bundle.proof,
            Self::Bare(proof) => proof,
        }
    }
}

fn cmd_identity_create(session: &Session, name: &str) -> anyhow::Result<()> {
    let path = session.config.keystore_path();
    let mut keystore = Keystore::load(&path)?;
    let public = keystore.create(name)?;
    keystore.save()?;

    match session.format {
        OutputFormat::Json => print_json(&identity_json(name, &public))?,
        OutputFormat::Text => {
            println!("{} Created identity {}", "✓".green().bold(), name.bold());
            println!("  Public key: {}", public.to_hex().cyan());
            println!("  Address:    {}", public.address().as_str().yellow());
            println!("  Keystore:   {}", path.display());
        }
    }
    Ok(())
}

fn cmd_identity_list(session: &Session) -> anyhow::Result<()> {
    let keystore = Keystore::load(&session.config.keystore_path())?;
    let identities = keystore.identities()?;

    match session.format {
        OutputFormat::Json => {
            let entries: Vec<_> = identities
                .iter()
                .map(|(name, key)| identity_json(name, key))
                .collect();
            print_json(&entries)?;
        }
        OutputFormat::Text if keystore.is_empty() => println!("No identities."),
        OutputFormat::Text => {
            for (name, key) in &identities {
                println!(
                    "{}  {}  {}",
                    name.bold(),
                    key.address().as_str().yellow(),
                    key.to_hex().dimmed()
                );
            }
        }
    }
    Ok(())
}

fn cmd_init(session: &Session, args: InitArgs) -> anyhow::Result<()> {
    let keystore = Keystore::load(&session.config.keystore_path())?;
    let signer = resolve_signer(args.signer.as_deref(), &keystore)?;
    let registry = load_registry(&session.config, &keystore)?;
    let dir = session.config.chain_dir();

    let existed = FileKvStore::exists(&dir);
    let chain = Chain::initialize(&dir, session.config.store_config(), registry, &signer)
        .with_context(|| format!("initializing chain in {}", dir.display()))?;
    let tip = chain.tip_block()?;

    match session.format {
        OutputFormat::Json => print_json(&json!({
            "path": dir,
            "created": !existed,
            "height": tip.height,
            "tip": tip.hash,
        }))?,
        OutputFormat::Text => {
            let verb = if existed { "Loaded" } else { "Initialized" };
            println!(
                "{} {} credential chain in {}",
                "✓".green().bold(),
                verb,
                dir.display().to_string().bold()
            );
            println!("  Height: {}", tip.height);
            println!("  Tip:    {}", tip.hash.to_hex().cyan());
        }
    }
    Ok(())
}

fn cmd_append(session: &Session, args: AppendArgs) -> anyhow::Result<()> {
    let keystore = Keystore::load(&session.config.keystore_path())?;
    let signer = resolve_signer(args.signer.as_deref(), &keystore)?;
    let chain = open_chain(&session.config, &keystore)?;

    let block = chain
        .append(&args.ids[..], &signer)
        .context("appending block")?;

    match session.format {
        OutputFormat::Json => print_json(&block_json(&block, chain.registry()))?,
        OutputFormat::Text => {
            println!(
                "{} Appended block {} with {} credential(s)",
                "✓".green().bold(),
                format!("#{}", block.height).yellow().bold(),
                block.credential_count()
            );
            println!("  Hash:        {}", block.hash.to_hex().cyan());
            println!("  Merkle root: {}", block.merkle_root.to_hex());
        }
    }
    Ok(())
}

fn cmd_blocks(session: &Session, args: BlocksArgs) -> anyhow::Result<()> {
    let keystore = Keystore::load(&session.config.keystore_path())?;
    let chain = open_chain(&session.config, &keystore)?;
    let blocks = chain
        .iter()
        .take(args.limit)
        .collect::<Result<Vec<_>, _>>()
        .context("reading blocks")?;

    match session.format {
        OutputFormat::Json => {
            let entries: Vec<_> = blocks
                .iter()
                .map(|block| block_json(block, chain.registry()))
                .collect();
            print_json(&entries)?;
        }
        OutputFormat::Text => {
            for block in &blocks {
                println!(
                    "{}  {}  {}  {} credential(s)  by {}",
                    format!("#{}", block.height).yellow().bold(),
                    block.hash.short_hex().dimmed(),
                    time::format_timestamp(block.timestamp),
                    block.credential_count(),
                    signer_label(&block.signer, chain.registry()).green()
                );
            }
        }
    }
    Ok(())
}

fn cmd_validate(session: &Session) -> anyhow::Result<()> {
    let keystore = Keystore::load(&session.config.keystore_path())?;
    let chain = open_chain(&session.config, &keystore)?;
    let result = chain.validate();

    match (&result, session.format) {
        (Ok(()), OutputFormat::Json) => print_json(&json!({ "valid": true, "tip": chain.tip() }))?,
        (Ok(()), OutputFormat::Text) => {
            println!("{} Credential chain integrity verified", "✓".green().bold());
            println!("  Tip: {}", chain.tip().to_hex().cyan());
        }
        (Err(err), OutputFormat::Json) => print_json(&json!({
            "valid": false,
            "class": format!("{:?}", err.class()),
            "index": err.index(),
            "error": err.to_string(),
        }))?,
        (Err(err), OutputFormat::Text) => {
            println!("{} Chain validation failed", "✗".red().bold());
            if let Some(index) = err.index() {
                println!("  Block: #{index}");
            }
            println!("  Class: {:?}", err.class());
            println!("  Error: {err}");
        }
    }
    result.context("chain is invalid")
}

fn cmd_stats(session: &Session) -> anyhow::Result<()> {
    let keystore = Keystore::load(&session.config.keystore_path())?;
    let chain = open_chain(&session.config, &keystore)?;
    let stats = chain.stats()?;

    match session.format {
        OutputFormat::Json => print_json(&json!({
            "block_count": stats.block_count,
            "credential_count": stats.credential_count,
            "tip": chain.tip(),
        }))?,
        OutputFormat::Text => {
            println!("Blocks:      {}", stats.block_count.to_string().bold());
            println!("Credentials: {}", stats.credential_count.to_string().bold());
            println!("Tip:         {}", chain.tip().to_hex().cyan());
        }
    }
    Ok(())
}

fn cmd_prove(session: &Session, args: ProveArgs) -> anyhow::Result<()> {
    let keystore = Keystore::load(&session.config.keystore_path())?;
    let chain = open_chain(&session.config, &keystore)?;
    let (block, proof) = chain
        .find_credential(&args.id)?
        .ok_or_else(|| anyhow!("credential {:?} is not on the chain", args.id))?;

    let verified = block.verify_membership(&args.id, &proof);
    let bundle = ProofBundle {
        credential_id: args.id,
        block_height: block.height,
        block_hash: block.hash,
        merkle_root: block.merkle_root,
        proof,
    };

    match session.format {
        OutputFormat::Json => print_json(&bundle)?,
        OutputFormat::Text => {
            println!(
                "Credential {} found in block {}",
                bundle.credential_id.bold(),
                format!("#{}", bundle.block_height).yellow().bold()
            );
            println!("  Block hash:  {}", bundle.block_hash.to_hex());
            println!("  Merkle root: {}", bundle.merkle_root.to_hex().cyan());
            println!("  Proof:");
            println!("{}", serde_json::to_string_pretty(&bundle)?);
        }
    }
    if !verified {
        bail!("proof for {:?} does not verify against its block", bundle.credential_id);
    }
    Ok(())
}

fn cmd_verify(args: VerifyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let root = Digest::from_hex(&args.root).context("--root is not a 32-byte hex digest")?;
    let text = std::fs::read_to_string(&args.proof)
        .with_context(|| format!("reading proof {}", args.proof.display()))?;
    let proof = serde_json::from_str::<ProofFile>(&text)
        .with_context(|| format!("parsing proof {}", args.proof.display()))?
        .into_proof();

    let valid = verify_credential(&args.id, &proof, &root);
    match format {
        OutputFormat::Json => print_json(&json!({ "credential_id": args.id, "valid": valid }))?,
        OutputFormat::Text if valid => println!(
            "{} Credential {} is committed to by root {}",
            "✓".green().bold(),
            args.id.bold(),
            root.short_hex().cyan()
        ),
        OutputFormat::Text => println!(
            "{} Credential {} is not committed to by root {}",
            "✗".red().bold(),
            args.id.bold(),
            root.short_hex().cyan()
        ),
    }
    if !valid {
        bail!("credential proof does not verify");
    }
    Ok(())
}

fn resolve_signer(name: Option<&str>, keystore: &Keystore) -> anyhow::Result<KeyPairSigner> {
    if let Some(name) = name {
        return keystore.signer(name);
    }
    match std::env::var(SIGNER_KEY_ENV) {
        Ok(secret) => {
            let key = SigningKey::from_hex(&secret)
                .with_context(|| format!("{SIGNER_KEY_ENV} is not a valid signing key"))?;
            Ok(KeyPairSigner::new(key))
        }
        Err(_) => bail!("no signer: pass --signer <name> or set {SIGNER_KEY_ENV}"),
    }
}

/// Allow-list file if present, otherwise every keystore identity.
fn load_registry(config: &CliConfig, keystore: &Keystore) -> anyhow::Result<AuthorityRegistry> {
    let path = config.authorities_path();
    if path.is_file() {
        AuthorityRegistry::load(&path)
            .with_context(|| format!("loading allow-list {}", path.display()))
    } else {
        keystore.registry()
    }
}

fn open_chain(config: &CliConfig, keystore: &Keystore) -> anyhow::Result<Chain<FileKvStore>> {
    let registry = load_registry(config, keystore)?;
    let dir = config.chain_dir();
    Chain::open(&dir, config.store_config(), registry)
        .with_context(|| format!("opening chain in {} (run `cred init` first)", dir.display()))
}

fn signer_label(key: &VerifyingKey, registry: &AuthorityRegistry) -> String {
    registry
        .name_of(key)
        .map_or_else(|| key.address().to_string(), str::to_string)
}

fn identity_json(name: &str, key: &VerifyingKey) -> serde_json::Value {
    json!({
        "name": name,
        "public_key": key.to_hex(),
        "address": key.address(),
    })
}

fn block_json(block: &Block, registry: &AuthorityRegistry) -> serde_json::Value {
    json!({
        "height": block.height,
        "hash": block.hash,
        "prev_hash": block.prev_hash,
        "timestamp": block.timestamp,
        "merkle_root": block.merkle_root,
        "credential_hashes": block.credential_hashes,
        "signer": signer_label(&block.signer, registry),
        "signer_key": block.signer.to_hex(),
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
