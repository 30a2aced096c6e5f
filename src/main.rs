use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use vio_bootstrap::config::InitConfig;
use vio_bootstrap::filter::FilterSetup;
use vio_bootstrap::imu::ImuReplayBuffer;
use vio_bootstrap::init::Initializer;
use vio_bootstrap::io::{AslDataset, SensorStream, VecStream};
use vio_bootstrap::sync::{Sample, Synchronizer};

/// Compute the initial IMU state of an ASL dataset and replay the rest of it
/// in filter propagation batches.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// YAML run configuration
    config: PathBuf,

    /// Override the dataset root from the config
    #[arg(long)]
    data_set_path: Option<PathBuf>,

    /// Override the calibration window start (ns)
    #[arg(long)]
    start: Option<u64>,

    /// Override the calibration window end (ns)
    #[arg(long)]
    end: Option<u64>,

    /// Use the ground-truth-assisted initialization
    #[arg(long)]
    with_gt: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut config = InitConfig::load(&args.config)?;
    if let Some(path) = args.data_set_path {
        config.data_set_path = path;
    }
    if let Some(start) = args.start {
        config.stand_still_start = start;
    }
    if let Some(end) = args.end {
        config.stand_still_end = end;
    }
    config.init_states_with_gt |= args.with_gt;
    config.validate()?;

    info!("Accessing dataset at {}", config.data_set_path.display());
    let load_gt = config.init_states_with_gt || config.ground_truth_path().exists();
    let dataset = AslDataset::load(
        &config.data_set_path,
        load_gt.then_some(config.gt_rel_path.as_path()),
    )?;

    let ground_truth = dataset
        .ground_truth
        .unwrap_or_else(|| VecStream::empty("gt0"));
    info!(
        "Synchronizing {} ({:.4}s), {} ({:.4}s), {} ({} poses)",
        dataset.imu.name(),
        dataset.imu.current_dt(),
        dataset.cam0.name(),
        dataset.cam0.current_dt(),
        ground_truth.name(),
        ground_truth.len()
    );
    let mut sync = Synchronizer::new(dataset.imu, dataset.cam0, ground_truth);

    let mut initializer = Initializer::new(config.initializer()?);
    let initialization = initializer
        .run(&mut sync)
        .context("Initialization failed")?;

    let setup = FilterSetup::new(
        &dataset.camera,
        &config.noise,
        &config.filter,
        initialization.state,
    );
    info!(
        "Filter setup: f = ({:.3}, {:.3}), c = ({:.3}, {:.3}), u_var' {:.3e}, max GN cost {:.3e}, {} max camera states",
        setup.camera.f_u,
        setup.camera.f_v,
        setup.camera.c_u,
        setup.camera.c_v,
        setup.noise.u_var_prime,
        setup.params.max_gn_cost_norm,
        setup.params.max_cam_states
    );

    let mut replay = ImuReplayBuffer::from_residual(initialization.residual_imu);
    let mut frames = 0usize;
    let mut propagated = 0usize;
    for sample in sync.by_ref().flat_map(|slot| slot.into_samples()) {
        match sample {
            Sample::Inertial(entry) => replay.push(entry),
            Sample::Image { timestamp_ns, .. } => {
                let batch = replay.drain_for_frame(timestamp_ns);
                let span: f64 = batch.iter().map(|r| r.dt).sum();
                debug!(
                    "Frame {}: {} IMU readings over {:.4}s",
                    timestamp_ns,
                    batch.len(),
                    span
                );
                frames += 1;
                propagated += batch.len();
            }
            Sample::Pose { .. } => {}
        }
    }

    info!(
        "Replayed {} frames with {} IMU readings after initialization",
        frames, propagated
    );
    Ok(())
}
