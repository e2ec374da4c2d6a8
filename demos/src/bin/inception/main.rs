mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Command};
use inception_rs::backend::MetaTensor;
use inception_rs::metrics::{softmax, top_k};
use inception_rs::models::StagePlan;
use inception_rs::session::{Session, SessionConfig};
use inception_rs::shape::Layout;
use inception_rs::tensor::Tensor;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Command::Summary {
            batch,
            height,
            width,
            channel_last,
            params,
        } => summary(config, [batch, height, width], channel_last, params),
        Command::Init { out } => init(config, &out),
        Command::Predict {
            checkpoint,
            batch,
            top_k,
        } => predict(config, &checkpoint, batch, top_k),
    }
}

fn load_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::from_json_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(num_classes) = cli.num_classes {
        config.model.num_classes = num_classes;
    }
    if cli.batch_norm {
        config.model.batch_norm = true;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn summary(config: SessionConfig, [batch, height, width]: [usize; 3], channel_last: bool, list_params: bool) -> Result<()> {
    let num_classes = config.model.num_classes;
    let mut session = Session::meta(config)?;

    let (input, layout) = if channel_last {
        (MetaTensor::new([batch, height, width, 3]), Layout::ChannelLast)
    } else {
        (MetaTensor::new([batch, 3, height, width]), Layout::ChannelFirst)
    };
    let logits = session.classify(&input, layout).context("failed to build the network")?;

    let plan = StagePlan::new([height, width], num_classes)?;
    println!("stage      output");
    for stage in plan.stages() {
        let dims: Vec<String> = std::iter::once(batch)
            .chain(stage.shape.iter().copied())
            .map(|d| d.to_string())
            .collect();
        println!("{:<10} [{}]", stage.name, dims.join(", "));
    }
    println!("logits     {:?}", logits.shape());

    let mut ops: BTreeMap<&str, usize> = BTreeMap::new();
    for record in session.backend().trace() {
        *ops.entry(record.op).or_default() += 1;
    }
    println!();
    for (op, count) in &ops {
        println!("{op:<16} {count}");
    }

    let store = session.store();
    if list_params {
        println!();
        for p in store.iter() {
            println!("{:<64} {:?}", p.name(), p.shape());
        }
    }
    println!();
    println!("parameters: {} tensors, {} values", store.len(), store.num_elements());
    println!("trainable:  {} values", store.num_trainable_elements());

    session.close();
    Ok(())
}

/// Deterministic stand-in for a decoded image batch, in `[0, 1)`.
fn synthetic_batch(batch: usize) -> Result<Tensor<f32, 4>> {
    let shape = [batch, 3, 299, 299];
    let size: usize = shape.iter().product();
    let data = (0..size).map(|i| (i % 256) as f32 / 256.0).collect();
    Ok(Tensor::new(data, shape)?)
}

fn init(config: SessionConfig, out: &Path) -> Result<()> {
    let mut session = Session::cpu(config)?;
    session
        .classify(&synthetic_batch(1)?, Layout::ChannelFirst)
        .context("failed to build the network")?;
    let path = session
        .save(out)
        .with_context(|| format!("failed to save checkpoint to {}", out.display()))?;
    info!(path = %path.display(), "initialized");
    println!("{}", path.display());
    session.close();
    Ok(())
}

fn predict(config: SessionConfig, checkpoint: &Path, batch: usize, k: usize) -> Result<()> {
    if batch == 0 {
        bail!("batch must be positive");
    }
    let mut session = Session::cpu(config)?;
    let report = session
        .restore(checkpoint)
        .with_context(|| format!("failed to load checkpoint from {}", checkpoint.display()))?;
    info!(staged = report.staged, "checkpoint staged");

    let logits = session
        .classify(&synthetic_batch(batch)?, Layout::ChannelFirst)
        .context("failed to run the network")?;
    let probs = softmax(&logits)?;
    let [_, classes] = *probs.shape();

    for (i, row) in probs.data().chunks(classes).enumerate() {
        let best: Vec<String> = top_k(row, k)
            .into_iter()
            .map(|c| format!("{c}:{:.4}", row[c]))
            .collect();
        println!("image {i}: {}", best.join(" "));
    }
    session.close();
    Ok(())
}
