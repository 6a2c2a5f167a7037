//! HA AutoGen - Home Assistant configuration generator CLI
//!
//! The `autogen` command turns natural-language requests into Home Assistant
//! automations and dashboards, checked against the live device inventory.
//!
//! ## Commands
//!
//! - `generate`: Generate, validate and repair a document, then release it
//! - `context`: Show the ranked and packed context for a request
//! - `validate`: Run the validation stages over an existing document
//! - `classify`: Report which sensitive domains a document touches
//! - `review`: Run the deterministic review rules over an existing document
//! - `snapshot`: Summarize the registry snapshot

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn, Level};

use autogen_core::fakes::ScriptedBackend;
use autogen_core::metrics::METRICS;
use autogen_core::obs::RequestSpan;
use autogen_core::telemetry::init_tracing;
use autogen_core::{AutogenConfig, DocumentKind, GenerationError, PromptRequest, RequestKind};
use autogen_llm::{build_backend, LlmConfig, ProviderKind};
use autogen_pipeline::stages::parse_document;
use autogen_pipeline::{
    Confirmation, GenerationPipeline, HandoffGate, HandoffRefusal, ReviewRules, ValidationPipeline,
};
use autogen_registry::{
    FixtureRegistryProvider, HomeAssistantRegistryProvider, RegistryProvider, RegistrySnapshot,
    SnapshotStore,
};

#[derive(Parser)]
#[command(name = "autogen")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "LLM-driven Home Assistant configuration generator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON reports
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "AUTOGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the registry exports
    #[arg(long, global = true, env = "AUTOGEN_FIXTURES", default_value = "fixtures")]
    fixtures: PathBuf,

    /// Home Assistant base URL; read the live registry instead of fixtures
    #[arg(long, global = true, env = "AUTOGEN_HA_URL", requires = "ha_token")]
    ha_url: Option<String>,

    /// Long-lived access token for --ha-url
    #[arg(long, global = true, env = "AUTOGEN_HA_TOKEN", hide_env_values = true)]
    ha_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a document from a request and release it for deployment
    Generate {
        #[command(flatten)]
        request: RequestArgs,

        #[command(flatten)]
        backend: BackendArgs,

        /// Confirm a document that touches sensitive domains
        #[arg(long)]
        confirm: bool,

        /// Name recorded on the confirmation
        #[arg(long, env = "USER", default_value = "operator")]
        confirmed_by: String,

        /// Write the released YAML here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the ranked, packed context and the prompt for a request
    Context {
        #[command(flatten)]
        request: RequestArgs,

        /// Model whose context window sizes the budget
        #[arg(long)]
        model: Option<String>,

        /// Print the assembled prompt as well
        #[arg(long)]
        prompt: bool,
    },

    /// Validate an existing document against the registry
    Validate {
        /// YAML document to validate
        file: PathBuf,

        /// Document kind: automation or dashboard
        #[arg(short, long, default_value = "automation")]
        kind: DocumentKind,
    },

    /// Run the deterministic review rules over an existing document
    Review {
        /// YAML document to review
        file: PathBuf,

        /// Document kind: automation or dashboard
        #[arg(short, long, default_value = "automation")]
        kind: DocumentKind,
    },

    /// Report the sensitive domains a document touches
    Classify {
        /// YAML document to classify
        file: PathBuf,

        /// Document kind: automation or dashboard
        #[arg(short, long, default_value = "automation")]
        kind: DocumentKind,
    },

    /// Summarize the registry snapshot
    Snapshot,
}

#[derive(Args)]
struct RequestArgs {
    /// Natural-language request
    #[arg(default_value = "")]
    text: String,

    /// Document kind: automation or dashboard
    #[arg(short, long, default_value = "automation")]
    kind: DocumentKind,

    /// Request mode: generate, review or modify
    #[arg(long, default_value = "generate")]
    mode: RequestKind,

    /// Existing document for review or modify requests
    #[arg(long)]
    existing: Option<PathBuf>,
}

impl RequestArgs {
    fn to_request(&self) -> Result<PromptRequest> {
        let request = PromptRequest::generate(self.kind, self.text.clone());
        match &self.existing {
            Some(path) => Ok(request.with_existing(self.mode, read_file(path)?)),
            None if self.mode.needs_existing_document() => {
                bail!("a {} request needs --existing <FILE>", self.mode)
            }
            None => Ok(request),
        }
    }
}

#[derive(Args)]
struct BackendArgs {
    /// Backend provider: ollama or openai_compat
    #[arg(long)]
    provider: Option<ProviderKind>,

    /// Backend base URL
    #[arg(long)]
    url: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// Bearer token for the backend
    #[arg(long)]
    api_key: Option<String>,
}

impl BackendArgs {
    /// Environment settings with command-line overrides applied.
    fn to_config(&self, config: &AutogenConfig) -> LlmConfig {
        let mut llm = LlmConfig::from_env().with_timeout(config.backend_timeout());
        if let Some(provider) = self.provider {
            llm.provider = provider;
        }
        if let Some(url) = &self.url {
            llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = &self.model {
            llm.model = model.clone();
        }
        if let Some(key) = &self.api_key {
            llm = llm.with_api_key(key);
        }
        llm
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;
    let registry = RegistrySource::from_cli(&cli);

    let result = match cli.command {
        Commands::Generate {
            request,
            backend,
            confirm,
            confirmed_by,
            output,
        } => {
            let confirmed_by = confirm.then_some(confirmed_by);
            cmd_generate(
                &config,
                &registry,
                &request,
                &backend,
                confirmed_by,
                output.as_deref(),
                cli.json,
            )
            .await
        }
        Commands::Context {
            request,
            model,
            prompt,
        } => cmd_context(&config, &registry, &request, model, prompt, cli.json).await,
        Commands::Validate { file, kind } => {
            cmd_validate(&registry, &file, kind, cli.json).await
        }
        Commands::Review { file, kind } => {
            cmd_review(&config, &registry, &file, kind, cli.json).await
        }
        Commands::Classify { file, kind } => cmd_classify(&config, &file, kind, cli.json),
        Commands::Snapshot => cmd_snapshot(&registry, cli.json).await,
    };

    METRICS.flush();
    result
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<AutogenConfig> {
    match path {
        Some(path) => AutogenConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(AutogenConfig::default()),
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Where the registry inventory is read from.
#[derive(Clone)]
enum RegistrySource {
    Fixtures(PathBuf),
    HomeAssistant { url: String, token: String },
}

impl RegistrySource {
    fn from_cli(cli: &Cli) -> Self {
        match (&cli.ha_url, &cli.ha_token) {
            (Some(url), Some(token)) => RegistrySource::HomeAssistant {
                url: url.clone(),
                token: token.clone(),
            },
            _ => RegistrySource::Fixtures(cli.fixtures.clone()),
        }
    }

    fn provider(&self) -> Result<Arc<dyn RegistryProvider>> {
        Ok(match self {
            RegistrySource::Fixtures(dir) => Arc::new(FixtureRegistryProvider::new(dir)),
            RegistrySource::HomeAssistant { url, token } => Arc::new(
                HomeAssistantRegistryProvider::new(url.as_str(), token)
                    .context("Failed to configure Home Assistant registry")?,
            ),
        })
    }

    fn describe(&self) -> String {
        match self {
            RegistrySource::Fixtures(dir) => dir.display().to_string(),
            RegistrySource::HomeAssistant { url, .. } => url.clone(),
        }
    }
}

/// Snapshot store over the configured registry, refreshed once.
async fn open_store(registry: &RegistrySource) -> Result<Arc<SnapshotStore>> {
    let store = Arc::new(SnapshotStore::new(registry.provider()?));
    store
        .refresh()
        .await
        .with_context(|| format!("Failed to load registry from {}", registry.describe()))?;
    Ok(store)
}

async fn load_snapshot(registry: &RegistrySource) -> Result<Arc<RegistrySnapshot>> {
    let store = open_store(registry).await?;
    Ok(store.pin().await?)
}

/// User-facing error for a failed request. The detailed text may quote
/// backend or provider output, so it only goes to the debug log.
fn generation_failure(request_id: &str, error: &GenerationError) -> anyhow::Error {
    debug!(request_id = %request_id, kind = error.kind(), detail = %error, "generation failed");
    anyhow::anyhow!("{} [{}, request {request_id}]", error.user_message(), error.kind())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_generate(
    config: &AutogenConfig,
    registry: &RegistrySource,
    args: &RequestArgs,
    backend_args: &BackendArgs,
    confirmed_by: Option<String>,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let request = args.to_request()?;
    let store = open_store(registry).await?;
    let backend = build_backend(backend_args.to_config(config))
        .context("Failed to configure generation backend")?;
    let pipeline = GenerationPipeline::new(config.clone(), store, backend);

    let report = pipeline.generate(&request).await;
    if let Some(log) = &report.log {
        info!(
            request_id = %report.request_id,
            attempts = log.attempts_used,
            state = ?log.final_state,
            "generation finished"
        );
    }

    for finding in &report.review {
        warn!(category = finding.category.as_str(), "{finding}");
    }

    let report_id = report.request_id.clone();
    let document = match report.into_result() {
        Ok(document) => document,
        Err(e) => return Err(generation_failure(&report_id, &e)),
    };
    for finding in &document.findings {
        warn!(stage = %finding.stage, "{finding}");
    }

    let confirmation = confirmed_by.map(|by| Confirmation::for_document(&document, by));
    let released = match HandoffGate::release(document, confirmation) {
        Ok(released) => released,
        Err(HandoffRefusal::ConfirmationRequired { domains }) => bail!(
            "The document controls {} and was not released. Re-run with --confirm to approve it.",
            domains.join(", ")
        ),
        Err(refusal) => bail!("Document was not released: {refusal}"),
    };

    if json {
        return print_json(&released);
    }
    let text = &released.document.text;
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "Wrote {} to {} (digest {})",
                released.document.kind,
                path.display(),
                released.document.digest.short()
            );
        }
        None => print!("{text}"),
    }
    Ok(())
}

async fn cmd_context(
    config: &AutogenConfig,
    registry: &RegistrySource,
    args: &RequestArgs,
    model: Option<String>,
    show_prompt: bool,
    json: bool,
) -> Result<()> {
    let request = args.to_request()?;
    let model = model.unwrap_or_else(|| LlmConfig::from_env().model);
    let store = open_store(registry).await?;
    let snapshot = store.pin().await?;

    // Nothing is generated here; the backend only names the model.
    let backend = Arc::new(ScriptedBackend::new(model.clone()));
    let pipeline = GenerationPipeline::new(config.clone(), store, backend);
    let context = pipeline.prepare(&request, &snapshot);
    let prompt = pipeline
        .assembler(request.document_kind)
        .assemble(&context.packed, &request, None);

    if json {
        return print_json(&serde_json::json!({
            "model": model,
            "context": context,
            "prompt": show_prompt.then_some(&prompt),
        }));
    }

    println!("Snapshot:   v{}", context.snapshot_version);
    println!(
        "Budget:     {} of {} tokens for context (model {})",
        context.plan.ceiling, context.plan.context_window, model
    );
    println!(
        "Packed:     {} full, {} summarized, {} dropped (~{} tokens)",
        context.packed.full_detail_items.len(),
        context.packed.summary_items.len(),
        context.packed.dropped.count,
        context.packed.estimated_size
    );
    if context.inventory_fallback {
        println!("Note:       request matched nothing; using the whole inventory");
    }
    println!();
    for candidate in context.candidates.iter().take(10) {
        println!("  {:>7.2}  {}", candidate.score, candidate.item.id());
    }
    if show_prompt {
        println!();
        println!("{}", prompt.text());
    }
    Ok(())
}

async fn cmd_validate(registry: &RegistrySource, file: &Path, kind: DocumentKind, json: bool) -> Result<()> {
    let text = read_file(file)?;
    let snapshot = load_snapshot(registry).await?;
    let _span = RequestSpan::enter(&format!("validate:{}", file.display()));
    let report = ValidationPipeline::new(kind).validate(&text, &snapshot);

    if json {
        print_json(&report)?;
    } else if report.findings.is_empty() {
        println!("{} is valid (snapshot v{})", file.display(), report.snapshot_version);
    } else {
        println!(
            "{}: {} blocking, {} advisory",
            file.display(),
            report.blocking_count(),
            report.advisory_count()
        );
        for finding in &report.findings {
            println!("  {finding}");
        }
    }

    if let Some(stage) = report.blocked_at {
        bail!("{} failed {stage} validation", file.display());
    }
    Ok(())
}

async fn cmd_review(
    config: &AutogenConfig,
    registry: &RegistrySource,
    file: &Path,
    kind: DocumentKind,
    json: bool,
) -> Result<()> {
    let text = read_file(file)?;
    let snapshot = load_snapshot(registry).await?;
    let _span = RequestSpan::enter(&format!("review:{}", file.display()));
    let doc = parse_document(&text).map_err(|f| anyhow::anyhow!("{f}"))?;
    let findings = ReviewRules::new(config.sensitive_policy()).review(&doc, kind, &snapshot);

    if json {
        return print_json(&findings);
    }
    if findings.is_empty() {
        println!("{}: no review findings", file.display());
        return Ok(());
    }
    println!("{}: {} review finding(s)", file.display(), findings.len());
    for finding in &findings {
        println!("  {finding}");
        println!("      {}", finding.description.replace('\n', "\n      "));
    }
    Ok(())
}

fn cmd_classify(config: &AutogenConfig, file: &Path, kind: DocumentKind, json: bool) -> Result<()> {
    let text = read_file(file)?;
    let _span = RequestSpan::enter(&format!("classify:{}", file.display()));
    let doc = parse_document(&text).map_err(|f| anyhow::anyhow!("{f}"))?;
    let report = config.sensitive_policy().inspect(&doc, kind);

    if json {
        return print_json(&report);
    }
    if report.sensitive {
        println!("Sensitive: {}", report.domains.join(", "));
        for reference in &report.refs {
            println!("  {reference}");
        }
    } else {
        println!("Not sensitive");
    }
    Ok(())
}

async fn cmd_snapshot(registry: &RegistrySource, json: bool) -> Result<()> {
    let snapshot = load_snapshot(registry).await?;
    let summary = snapshot.summary();
    if json {
        return print_json(&summary);
    }
    println!("Snapshot v{} ({})", summary.version, summary.digest);
    println!("Fetched:    {}", summary.fetched_at);
    println!(
        "Entities:   {} ({} active)",
        summary.entities, summary.active_entities
    );
    println!("Areas:      {}", summary.areas);
    println!("Devices:    {}", summary.devices);
    println!("Services:   {}", summary.services);
    println!("Automations: {}", summary.automations);
    println!("Views:      {}", summary.dashboard_views);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn fixtures(dir: &Path) -> RegistrySource {
        RegistrySource::Fixtures(dir.to_path_buf())
    }

    fn write_fixtures(dir: &Path) {
        std::fs::write(
            dir.join("entity_registry.json"),
            r#"[{"entity_id": "light.kitchen", "area_id": "kitchen"},
                {"entity_id": "lock.front_door"}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("area_registry.json"),
            r#"[{"area_id": "kitchen", "name": "Kitchen"}]"#,
        )
        .unwrap();
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_arguments_parse() {
        let cli = Cli::try_parse_from([
            "autogen",
            "--fixtures",
            "/tmp/ha",
            "generate",
            "turn on the kitchen light at sunset",
            "--kind",
            "automation",
            "--confirm",
        ])
        .unwrap();
        assert_eq!(cli.fixtures, PathBuf::from("/tmp/ha"));
        match cli.command {
            Commands::Generate {
                request, confirm, ..
            } => {
                assert!(confirm);
                assert_eq!(request.kind, DocumentKind::Automation);
                assert_eq!(request.mode, RequestKind::Generate);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_review_requires_existing_document() {
        let args = RequestArgs {
            text: String::new(),
            kind: DocumentKind::Automation,
            mode: RequestKind::Review,
            existing: None,
        };
        assert!(args.to_request().is_err());
    }

    #[test]
    fn test_backend_overrides_apply() {
        let args = BackendArgs {
            provider: Some(ProviderKind::OpenaiCompat),
            url: Some("http://llm.local/".to_string()),
            model: Some("gpt-4o-mini".to_string()),
            api_key: None,
        };
        let llm = args.to_config(&AutogenConfig::default());
        assert_eq!(llm.provider, ProviderKind::OpenaiCompat);
        assert_eq!(llm.base_url, "http://llm.local");
        assert_eq!(llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_backend_failure_hides_response_body() {
        let body = "model llama3 crashed: CUDA out of memory at layer 31";
        let error = GenerationError::Backend(autogen_core::BackendError::Status {
            status: 500,
            message: body.to_string(),
        });
        let shown = generation_failure("req-1", &error).to_string();
        assert!(!shown.contains("CUDA"), "{shown}");
        assert!(shown.starts_with(&error.user_message()));
        assert!(shown.contains("backend_error"));
    }

    #[test]
    fn test_unavailable_registry_hides_provider_text() {
        let error = GenerationError::SnapshotUnavailable(
            "failed to read /srv/ha/.storage/core.entity_registry: permission denied".to_string(),
        );
        let shown = generation_failure("req-2", &error).to_string();
        assert!(!shown.contains("/srv/ha"), "{shown}");
        assert!(!shown.contains("permission denied"));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
        assert_eq!(load_config(None).unwrap(), AutogenConfig::default());
    }

    #[tokio::test]
    async fn test_snapshot_loads_from_fixture_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let snapshot = load_snapshot(&fixtures(dir.path())).await.unwrap();
        let summary = snapshot.summary();
        assert_eq!(summary.entities, 2);
        assert_eq!(summary.areas, 1);
    }

    #[test]
    fn test_review_arguments_parse() {
        let cli = Cli::try_parse_from(["autogen", "review", "lovelace.yaml", "-k", "dashboard"]).unwrap();
        match cli.command {
            Commands::Review { file, kind } => {
                assert_eq!(file, PathBuf::from("lovelace.yaml"));
                assert_eq!(kind, DocumentKind::Dashboard);
            }
            _ => panic!("expected review"),
        }
    }

    #[tokio::test]
    async fn test_review_runs_on_file_and_rejects_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let doc = dir.path().join("lock.yaml");
        std::fs::write(
            &doc,
            "alias: Lock\ntrigger:\n  - platform: time\n    at: '23:00'\naction:\n  - service: lock.lock\n    target:\n      entity_id: lock.front_door\n",
        )
        .unwrap();
        cmd_review(&AutogenConfig::default(), &fixtures(dir.path()), &doc, DocumentKind::Automation, true)
            .await
            .unwrap();

        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, "trigger: [unclosed\n").unwrap();
        assert!(
            cmd_review(&AutogenConfig::default(), &fixtures(dir.path()), &broken, DocumentKind::Automation, false)
                .await
                .is_err()
        );
    }

    #[test]
    fn test_ha_flags_select_live_registry() {
        let cli = Cli::try_parse_from([
            "autogen",
            "--ha-url",
            "http://homeassistant.local:8123",
            "--ha-token",
            "abc123",
            "snapshot",
        ])
        .unwrap();
        match RegistrySource::from_cli(&cli) {
            RegistrySource::HomeAssistant { url, token } => {
                assert_eq!(url, "http://homeassistant.local:8123");
                assert_eq!(token, "abc123");
            }
            RegistrySource::Fixtures(_) => panic!("expected home assistant"),
        }

        let cli = Cli::try_parse_from(["autogen", "snapshot"]).unwrap();
        assert!(matches!(RegistrySource::from_cli(&cli), RegistrySource::Fixtures(_)));
    }

    #[tokio::test]
    async fn test_unreachable_home_assistant_names_url_not_token() {
        let registry = RegistrySource::HomeAssistant {
            url: "http://127.0.0.1:9".to_string(),
            token: "abc123".to_string(),
        };
        let err = cmd_snapshot(&registry, false).await.unwrap_err();
        let shown = format!("{err:#}");
        assert!(shown.contains("http://127.0.0.1:9"), "{shown}");
        assert!(!shown.contains("abc123"));
    }

    #[tokio::test]
    async fn test_validate_fails_on_blocking_document() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let doc = dir.path().join("broken.yaml");
        std::fs::write(&doc, "alias: Broken\naction: []\n").unwrap();
        let err = cmd_validate(&fixtures(dir.path()), &doc, DocumentKind::Automation, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("schema"));
    }

    #[test]
    fn test_classify_sensitive_lock() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("lock.yaml");
        std::fs::write(
            &doc,
            "alias: Lock up\ntrigger: {platform: time, at: '23:00:00'}\naction:\n  - service: lock.lock\n    target: {entity_id: lock.front_door}\n",
        )
        .unwrap();
        cmd_classify(&AutogenConfig::default(), &doc, DocumentKind::Automation, true).unwrap();
    }
}
