mod collectors;
mod config;
mod entropy;
mod evaluator;

use clap::Parser;
use collectors::system::collect_gauges;
use config::Config;
use entropy::{derive_with_rng, EntropyState};
use evaluator::{SyncResult, SyncStatus};
use rand::Rng;
use reqwest::Client;
use sysinfo::{System, SystemExt};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "entropy-sync")]
#[command(version)]
struct Cli {
    /// Path to a YAML config; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    /// Exit with code 1 when the classifier result is ERROR.
    #[arg(long)]
    strict_exit: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let credential = match resolve_credential(&cfg) {
        Ok(credential) => credential,
        Err(err) => {
            error!(error = %err, "no classifier credential");
            std::process::exit(1);
        }
    };

    info!(
        endpoint = %cfg.classifier.endpoint_url,
        model = %cfg.classifier.model,
        "starting entropy sync cycle"
    );

    let mut system = System::new_all();
    let mut rng = rand::rng();

    println!("Scanning local + remote entropy states...\n");
    let local = sample_device(&mut system, &mut rng, &cfg.disk_mount).await;
    // The second sample starts strictly after the first completes.
    let remote = sample_device(&mut system, &mut rng, &cfg.disk_mount).await;

    print!("{}", render_state("LOCAL", &local));
    print!("{}", render_state("REMOTE", &remote));

    let client = Client::builder()
        .user_agent(concat!("entropy-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new());

    println!("Asking classifier to evaluate sync level...\n");
    let result = evaluator::evaluate(&client, &cfg.classifier, &credential, &local, &remote).await;

    println!("{}", render_result(&result));

    if cli.strict_exit && result.sync_status == SyncStatus::Error {
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn sample_device<R: Rng>(
    system: &mut System,
    rng: &mut R,
    disk_mount: &str,
) -> EntropyState {
    match collect_gauges(system, disk_mount).await {
        Ok(gauges) => derive_with_rng(&gauges, rng),
        Err(err) => {
            // Sampling is a prerequisite for everything downstream; there
            // is no degraded mode for a missing gauge.
            error!(error = %err, "telemetry read failed");
            std::process::exit(1);
        }
    }
}

fn render_state(label: &str, state: &EntropyState) -> String {
    format!(
        "{label} device:\n  \
         cpu_percent: {:.2}\n  \
         mem_percent: {:.2}\n  \
         disk_percent: {:.2}\n  \
         net_bytes: {}\n  \
         rand: {:.6}\n  \
         entropy_hash: {}\n  \
         color_index: {}\n\n",
        state.cpu_percent,
        state.mem_percent,
        state.disk_percent,
        state.net_bytes,
        state.rand,
        state.entropy_hash,
        state.color_index,
    )
}

fn render_result(result: &SyncResult) -> String {
    let body = serde_json::to_string_pretty(result)
        .unwrap_or_else(|err| format!("{{\"sync_status\": \"ERROR\", \"recommendation\": \"failed to render result: {err}\"}}"));
    format!("Sync result:\n{body}")
}

fn resolve_credential(cfg: &Config) -> Result<String, String> {
    if let Ok(value) = std::env::var(&cfg.classifier.api_key_env) {
        if !value.trim().is_empty() {
            return Ok(value);
        }
    }
    if let Some(value) = &cfg.classifier.api_key {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
    Err(format!(
        "set '{}' in the environment or classifier.api_key in config",
        cfg.classifier.api_key_env
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::RawGauges;
    use crate::entropy::derive_state;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    #[test]
    fn state_dump_lists_every_field() {
        let state = derive_state(
            &RawGauges {
                cpu_percent: 10.0,
                mem_percent: 20.0,
                disk_percent: 30.0,
                net_bytes: 1000,
            },
            0.5,
        );
        let text = render_state("LOCAL", &state);
        assert!(text.starts_with("LOCAL device:"));
        assert!(text.contains("cpu_percent: 10.00"));
        assert!(text.contains("mem_percent: 20.00"));
        assert!(text.contains("disk_percent: 30.00"));
        assert!(text.contains("net_bytes: 1000"));
        assert!(text.contains("rand: 0.500000"));
        assert!(text.contains("entropy_hash: c6AVPR3n5t5iSfzC6+7HNIb0VhsgSe11PV4nitjnQSk="));
        assert!(text.contains("color_index: 15"));
    }

    #[test]
    fn result_renders_as_two_space_indented_json() {
        let result = SyncResult {
            sync_status: SyncStatus::Yellow,
            recommendation: "acceptable drift".to_string(),
        };
        let text = render_result(&result);
        assert!(text.contains("  \"sync_status\": \"YELLOW\""));
        assert!(text.contains("  \"recommendation\": \"acceptable drift\""));
    }

    #[test]
    fn credential_prefers_environment_over_config() {
        let mut cfg = Config::default();
        cfg.classifier.api_key_env = "ENTROPY_SYNC_TEST_CREDENTIAL".to_string();
        cfg.classifier.api_key = Some("from-file".to_string());

        std::env::set_var("ENTROPY_SYNC_TEST_CREDENTIAL", "from-env");
        assert_eq!(resolve_credential(&cfg).as_deref(), Ok("from-env"));
        std::env::remove_var("ENTROPY_SYNC_TEST_CREDENTIAL");
        assert_eq!(resolve_credential(&cfg).as_deref(), Ok("from-file"));

        cfg.classifier.api_key = None;
        assert!(resolve_credential(&cfg).is_err());
    }

    #[tokio::test]
    async fn full_cycle_report_carries_grey_verdict() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                Json(json!({
                    "choices": [{ "message": {
                        "role": "assistant",
                        "content": "{\"sync_status\":\"GREY\",\"recommendation\":\"rotate provisioning keys now\"}"
                    }}]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock endpoint");
        let addr = listener.local_addr().expect("mock endpoint addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock endpoint");
        });

        let mut cfg = Config::default();
        cfg.classifier.endpoint_url = format!("http://{addr}/v1/chat/completions");
        cfg.classifier.timeout_secs = 5;

        let local = derive_state(
            &RawGauges {
                cpu_percent: 5.0,
                mem_percent: 40.0,
                disk_percent: 70.0,
                net_bytes: 10_000,
            },
            0.111111,
        );
        let remote = derive_state(
            &RawGauges {
                cpu_percent: 95.0,
                mem_percent: 90.0,
                disk_percent: 10.0,
                net_bytes: 999_999_999,
            },
            0.999999,
        );

        let client = Client::new();
        let result =
            evaluator::evaluate(&client, &cfg.classifier, "test-key", &local, &remote).await;
        let report = format!(
            "{}{}{}",
            render_state("LOCAL", &local),
            render_state("REMOTE", &remote),
            render_result(&result)
        );

        assert!(report.contains("\"sync_status\": \"GREY\""));
        assert!(report.contains("rotate provisioning keys now"));
    }
}
