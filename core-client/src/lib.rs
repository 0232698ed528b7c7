use alloy_primitives::Address;
use clap::{Parser, Subcommand};
use decryption_auth::authorization::{CacheLookup, DecryptionAuthorization};
use decryption_auth::challenge::ChallengeDeployments;
use decryption_auth::consts::DEFAULT_DURATION_DAYS;
use decryption_auth::decryptor::load_or_sign_for;
use decryption_auth::instance::{FhevmInstanceConfig, FhevmKeypair, LocalFhevmInstance};
use decryption_auth::signer::{DecryptionSigner, LocalWalletSigner};
use decryption_auth::storage::FileStringStorage;
use decryption_auth::storage_key::StorageKey;
use decryption_auth::validation::{parse_contract_addresses, parse_user_address};
use observability::conf::{Settings, TelemetryConfig};
use observability::telemetry::init_tracing;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use validator::{Validate, ValidationError};

/// Prefix of the environment variables overriding the configuration file,
/// e.g. `FHE_CLIENT__WALLET__PRIVATE_KEY`.
pub const ENV_PREFIX: &str = "FHE_CLIENT";

fn default_storage_path() -> String {
    "decryption-cache".to_string()
}

fn default_duration_days() -> u64 {
    DEFAULT_DURATION_DAYS
}

#[derive(Deserialize, Serialize, Clone, Validate, Debug)]
pub struct ClientConfig {
    /// Chain and decryption verifier the authorizations are built for.
    #[serde(default)]
    pub instance: FhevmInstanceConfig,
    #[serde(default)]
    #[validate(nested)]
    pub wallet: WalletConf,
    /// Directory holding one file per cached authorization.
    #[serde(default = "default_storage_path")]
    #[validate(length(min = 1))]
    pub storage_path: String,
    /// Validity of newly signed authorizations.
    #[serde(default = "default_duration_days")]
    #[validate(range(min = 1))]
    pub duration_days: u64,
    #[serde(default)]
    pub deployments: ChallengeDeployments,
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

/// Key material of the signing wallet, a hex private key or a BIP-39 mnemonic.
#[derive(Deserialize, Serialize, Clone, Validate, Default)]
#[validate(schema(function = validate_wallet_conf))]
pub struct WalletConf {
    pub private_key: Option<String>,
    pub mnemonic: Option<String>,
}

impl std::fmt::Debug for WalletConf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConf")
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn validate_wallet_conf(conf: &WalletConf) -> Result<(), ValidationError> {
    if conf.private_key.is_some() && conf.mnemonic.is_some() {
        return Err(ValidationError::new("Ambiguous wallet")
            .with_message("set either wallet.private_key or wallet.mnemonic, not both".into()));
    }
    Ok(())
}

impl WalletConf {
    pub fn signer(&self) -> anyhow::Result<LocalWalletSigner> {
        match (&self.private_key, &self.mnemonic) {
            (Some(key), None) => Ok(LocalWalletSigner::from_private_key(key)?),
            (None, Some(phrase)) => Ok(LocalWalletSigner::from_mnemonic(phrase)?),
            (None, None) => {
                anyhow::bail!("no wallet configured, set wallet.private_key or wallet.mnemonic")
            }
            (Some(_), Some(_)) => {
                anyhow::bail!("set either wallet.private_key or wallet.mnemonic, not both")
            }
        }
    }
}

impl ClientConfig {
    /// Load and validate the configuration.
    ///
    /// See [Settings::init_conf] for the order of the sources.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let conf: ClientConfig = match path {
            Some(path) => Settings::builder().path(path).env_prefix(ENV_PREFIX).build(),
            None => Settings::builder().env_prefix(ENV_PREFIX).build(),
        }
        .init_conf()?;
        conf.validate()?;
        Ok(conf)
    }

    pub fn instance(&self) -> LocalFhevmInstance {
        LocalFhevmInstance::new(self.instance.clone())
    }

    pub fn storage(&self) -> anyhow::Result<FileStringStorage> {
        FileStringStorage::new(Path::new(&self.storage_path))
    }
}

#[derive(Debug, Parser, Clone)]
pub struct SignParameters {
    /// Contracts the authorization covers, repeat for several
    #[clap(long = "contract", short = 'c', required = true)]
    pub contracts: Vec<String>,
    /// Public key to authorize instead of a freshly generated one
    #[clap(long, requires = "private_key")]
    pub public_key: Option<String>,
    /// Private key matching --public-key
    #[clap(long, requires = "public_key")]
    pub private_key: Option<String>,
}

#[derive(Debug, Parser, Clone)]
pub struct KeyParameters {
    /// Address of the authorizing wallet
    #[clap(long, short = 'u')]
    pub user: String,
    #[clap(long = "contract", short = 'c', required = true)]
    pub contracts: Vec<String>,
    /// Public key the entry was cached with, if any
    #[clap(long)]
    pub public_key: Option<String>,
}

#[derive(Debug, Parser, Clone)]
pub struct VerifyParameters {
    /// File holding a serialized authorization
    #[clap(long, short = 'i')]
    pub input: PathBuf,
}

#[derive(Debug, Parser, Clone)]
pub struct ChallengeAddressParameters {
    #[clap(long)]
    pub chain_id: u64,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CCCommand {
    /// Reuse or sign an authorization for the configured wallet
    Sign(SignParameters),
    /// Print the cache key of an authorization
    StorageKey(KeyParameters),
    /// Show the state of a cached authorization
    Inspect(KeyParameters),
    /// Check the signature of a serialized authorization
    Verify(VerifyParameters),
    /// Print the ChallengeFHE deployment of a chain
    ChallengeAddress(ChallengeAddressParameters),
}

#[derive(Debug, Parser, Validate)]
pub struct CmdConfig {
    /// Path to the configuration file
    #[clap(long, short = 'f')]
    #[validate(length(min = 1))]
    pub file_conf: Option<String>,
    /// The command to execute
    #[clap(subcommand)]
    pub command: CCCommand,
    /// Whether to print logs or not
    #[clap(long, short = 'l')]
    pub logs: bool,
}

/// What `sign` reports. The private key is never printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationSummary {
    pub storage_key: String,
    pub user_address: Address,
    pub contract_addresses: Vec<Address>,
    pub public_key: String,
    pub signature: String,
    pub start_timestamp: u64,
    pub duration_days: u64,
    pub expires_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Valid,
    Miss,
    Stale,
    Corrupt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectReport {
    pub storage_key: String,
    pub status: EntryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub user_address: Address,
    pub signature_valid: bool,
    pub currently_valid: bool,
    pub expires_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    Authorization(AuthorizationSummary),
    StorageKey {
        #[serde(rename = "storageKey")]
        storage_key: String,
    },
    Inspect(InspectReport),
    Verify(VerifyReport),
    ChallengeAddress {
        #[serde(rename = "chainId")]
        chain_id: u64,
        address: Option<Address>,
    },
}

/// Install logging as configured in the `telemetry` section.
///
/// A configuration that cannot be loaded falls back to the default telemetry
/// settings, the command itself reports the problem.
pub fn setup_logging(file_conf: Option<&str>) -> anyhow::Result<Option<WorkerGuard>> {
    let telemetry = ClientConfig::load(file_conf)
        .map(|conf| conf.telemetry)
        .unwrap_or_else(|_| TelemetryConfig::default());
    init_tracing(&telemetry)
}

/// Parse the optional caller key pair, both halves or none.
fn keypair_from(
    public_key: &Option<String>,
    private_key: &Option<String>,
) -> Option<FhevmKeypair> {
    match (public_key, private_key) {
        (Some(public_key), Some(private_key)) => Some(FhevmKeypair {
            public_key: public_key.clone(),
            private_key: private_key.clone(),
        }),
        _ => None,
    }
}

async fn sign(conf: &ClientConfig, params: &SignParameters) -> anyhow::Result<CommandOutput> {
    let contracts = parse_contract_addresses(&params.contracts)?;
    let instance = conf.instance();
    let signer = conf.wallet.signer()?;
    let mut store = conf.storage()?;
    let keypair = keypair_from(&params.public_key, &params.private_key);

    let auth = load_or_sign_for(
        &instance,
        &contracts,
        &signer,
        &mut store,
        keypair.as_ref(),
        conf.duration_days,
    )
    .await?
    .ok_or_else(|| {
        anyhow::anyhow!("no authorization available, the wallet refused or failed to sign")
    })?;

    let storage_key = StorageKey::for_address(
        &instance,
        auth.contract_addresses(),
        signer.get_address().await?,
        params.public_key.as_deref(),
    )?;
    Ok(CommandOutput::Authorization(AuthorizationSummary {
        storage_key: storage_key.to_string(),
        user_address: auth.user_address(),
        contract_addresses: auth.contract_addresses().to_vec(),
        public_key: auth.public_key().to_string(),
        signature: auth.signature().to_string(),
        start_timestamp: auth.start_timestamp(),
        duration_days: auth.duration_days(),
        expires_at: auth.expires_at(),
    }))
}

fn derive_key(
    conf: &ClientConfig,
    params: &KeyParameters,
) -> anyhow::Result<(StorageKey, Vec<Address>)> {
    let contracts = parse_contract_addresses(&params.contracts)?;
    let user = parse_user_address(&params.user)?;
    let key = StorageKey::for_address(
        &conf.instance(),
        &contracts,
        user,
        params.public_key.as_deref(),
    )?;
    Ok((key, contracts))
}

async fn inspect(conf: &ClientConfig, params: &KeyParameters) -> anyhow::Result<CommandOutput> {
    let (key, contracts) = derive_key(conf, params)?;
    let store = conf.storage()?;
    let lookup = DecryptionAuthorization::lookup(&store, &key, &contracts).await;
    let (status, expires_at) = match lookup {
        CacheLookup::Hit(auth) => (EntryStatus::Valid, Some(auth.expires_at())),
        CacheLookup::Miss => (EntryStatus::Miss, None),
        CacheLookup::Stale => (EntryStatus::Stale, None),
        CacheLookup::Corrupt => (EntryStatus::Corrupt, None),
    };
    Ok(CommandOutput::Inspect(InspectReport {
        storage_key: key.to_string(),
        status,
        expires_at,
    }))
}

async fn verify(params: &VerifyParameters) -> anyhow::Result<CommandOutput> {
    let raw = tokio::fs::read_to_string(&params.input).await?;
    let auth = DecryptionAuthorization::from_json(&raw)?;
    let res = auth.verify();
    Ok(CommandOutput::Verify(VerifyReport {
        user_address: auth.user_address(),
        signature_valid: res.is_ok(),
        currently_valid: auth.is_valid(),
        expires_at: auth.expires_at(),
        error: res.err().map(|e| e.to_string()),
    }))
}

/// execute a command based on the provided configuration
pub async fn execute_cmd(cmd_config: &CmdConfig) -> anyhow::Result<CommandOutput> {
    let command = &cmd_config.command;
    tracing::info!("Path to config: {:?}", &cmd_config.file_conf);
    tracing::info!("Starting command: {:?}", command);

    match command {
        CCCommand::Verify(params) => verify(params).await,
        CCCommand::ChallengeAddress(params) => {
            // the known deployments are usable without any configuration
            let deployments = match &cmd_config.file_conf {
                Some(path) => ClientConfig::load(Some(path))?.deployments,
                None => ChallengeDeployments::default(),
            };
            Ok(CommandOutput::ChallengeAddress {
                chain_id: params.chain_id,
                address: deployments.address_for(params.chain_id),
            })
        }
        CCCommand::Sign(params) => {
            let conf = ClientConfig::load(cmd_config.file_conf.as_deref())?;
            tracing::info!("Client config: {:?}", conf);
            sign(&conf, params).await
        }
        CCCommand::StorageKey(params) => {
            let conf = ClientConfig::load(cmd_config.file_conf.as_deref())?;
            let (key, _) = derive_key(&conf, params)?;
            Ok(CommandOutput::StorageKey {
                storage_key: key.to_string(),
            })
        }
        CCCommand::Inspect(params) => {
            let conf = ClientConfig::load(cmd_config.file_conf.as_deref())?;
            inspect(&conf, params).await
        }
    }
}
