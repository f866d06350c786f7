use std::{path::PathBuf, process};

use structopt::StructOpt;
use tokio::signal;
use tracing_subscriber::*;

use silo_coordinator::{
    engine::{AggregationEngine, GlobalModel},
    registry::{ModelRegistry, RegistryError},
    settings::Settings,
    storage::FsStore,
};
use silo_core::{ckks::CkksConfig, model::WeightLayout, privacy::PrivacyContext};

#[macro_use]
extern crate tracing;

#[derive(Debug, StructOpt)]
#[structopt(name = "Coordinator")]
struct Opt {
    /// Path of the configuration file
    #[structopt(short, parse(from_os_str))]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    let settings = Settings::new(opt.config_path).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });
    let Settings {
        log: log_settings,
        model: model_settings,
        cipher: cipher_settings,
        registry: registry_settings,
    } = settings;

    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(log_settings.filter)
        .with_ansi(true)
        .init();

    silo_core::init_crypto().expect("failed to initialize the crypto layer");

    let layout = WeightLayout::new(model_settings.layout.clone());
    let context = PrivacyContext::new(CkksConfig::from(cipher_settings), layout.clone())
        .expect("failed to initialize the privacy context");
    info!(
        "privacy context ready (decode tolerance {:.3e} per update)",
        context.config().tolerance(1)
    );

    let mut registry = ModelRegistry::new(FsStore::new(registry_settings.path));
    let mut engine = AggregationEngine::new(model_settings.name.clone(), layout.clone());

    // pick up where the last coordinator instance left off, if it released anything
    match registry.load(&model_settings.name, None).await {
        Ok((weights, metadata)) => {
            info!(
                "restoring global model {} v{} from the registry",
                metadata.name, metadata.version
            );
            let global = GlobalModel {
                name: metadata.name,
                version: Some(metadata.version),
                weights,
                metadata: metadata.extra,
            };
            engine = AggregationEngine::with_model(layout.clone(), global)
                .expect("the persisted release does not fit the configured layout");
        }
        Err(RegistryError::ReleaseNotFound { .. }) => {
            info!("no persisted release found, starting from a zeroed global model");
        }
        Err(err) => {
            eprintln!("failed to restore the global model: {}", err);
            process::exit(1);
        }
    }

    info!(
        "coordinator ready: global model {} with {} parameters",
        engine.global().name,
        layout.total_len()
    );

    if let Err(err) = signal::ctrl_c().await {
        warn!("cannot listen for shutdown signal: {}", err);
    }
    warn!("shutting down");
}
