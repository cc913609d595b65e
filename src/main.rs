use clap::{Parser, Subcommand};
use field_registration::logging::{init_logging, LoggingConfig};
use field_registration::visualization::{print_estimate, print_outcome};
use field_registration::*;
use glam::DVec2;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fieldreg")]
#[command(about = "Register overlapping images placed on a shared world canvas")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the target image of a scene onto its reference and report the new pose
    Register {
        /// Scene file naming both images, their outlines and an optional ROI
        #[arg(short, long)]
        scene: PathBuf,

        /// Output file for the outcome (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the ROI of the re-posed target as a PNG
        #[arg(short, long)]
        preview: Option<PathBuf>,
    },

    /// Estimate rotation, scale and shift between two image files
    Estimate {
        /// Path to the reference image
        #[arg(short, long)]
        reference: PathBuf,

        /// Path to the target image
        #[arg(short = 'T', long)]
        target: PathBuf,

        /// Output file for the estimate (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write the effective configuration (defaults unless --config is given)
    InitConfig {
        /// Destination; `.json` selects JSON, anything else TOML
        #[arg(short, long, default_value = "fieldreg.toml")]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config_or_default(cli.config.as_deref());

    let logging = verbosity_logging(&config.logging, cli.verbose);
    let _log_guard = init_logging(&logging)?;

    match cli.command {
        Commands::Register { scene, output, preview } => {
            handle_register(config, scene, output, preview)?;
        }
        Commands::Estimate { reference, target, output } => {
            handle_estimate(config, reference, target, output)?;
        }
        Commands::InitConfig { output } => {
            handle_init_config(&config, output)?;
        }
    }

    Ok(())
}

/// `-v`, `-vv` and `-vvv` force every component to info, debug and trace.
fn verbosity_logging(base: &LoggingConfig, verbose: u8) -> LoggingConfig {
    let level = match verbose {
        0 => return base.clone(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    LoggingConfig {
        global_level: level.to_string(),
        estimator_level: level.to_string(),
        pipeline_level: level.to_string(),
        service_level: level.to_string(),
        ..base.clone()
    }
}

fn handle_register(
    config: Config,
    scene_path: PathBuf,
    output: Option<PathBuf>,
    preview: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("Loading scene {}...", scene_path.display());
    let scene = Scene::load(&scene_path)?;
    let (reference, mut target) = scene.load_images()?;

    println!(
        "Reference '{}': {}x{}, Target '{}': {}x{}",
        reference.name(),
        reference.shape().1,
        reference.shape().0,
        target.name(),
        target.shape().1,
        target.shape().0
    );

    let service = RegistrationService::new(config)?;
    let before = target.pose();
    let outcome = service.register(&reference, &target, scene.roi)?;
    print_outcome(target.name(), &before, &outcome);

    if let Some(output_path) = output {
        let json = serde_json::to_string_pretty(&outcome)?;
        std::fs::write(&output_path, json)?;
        println!("Outcome saved to {}", output_path.display());
    }

    if let Some(preview_path) = preview {
        if outcome.apply_to(&mut target) {
            let frame = FrameExtractor::default().extract(&target, &outcome.roi)?;
            save_frame(frame.view(), &preview_path)?;
            println!("Aligned preview saved to {}", preview_path.display());
        } else {
            println!("No preview written: registration did not converge");
        }
    }

    Ok(())
}

fn handle_estimate(
    config: Config,
    reference_path: PathBuf,
    target_path: PathBuf,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("Loading images...");
    let reference = to_grayscale(&load_rgb(&reference_path)?);
    let target = to_grayscale(&load_rgb(&target_path)?);

    let min_size = config.estimator.min_frame_size;
    validate_frame_size(reference.view(), min_size)?;
    validate_frame_size(target.view(), min_size)?;

    println!(
        "Reference: {}x{}, Target: {}x{}",
        reference.ncols(),
        reference.nrows(),
        target.ncols(),
        target.nrows()
    );

    let reference = SubFrame::new(reference, DVec2::ZERO, DVec2::ONE);
    let target = ShapeMatcher.match_shape(reference.shape(), SubFrame::new(target, DVec2::ZERO, DVec2::ONE));

    let estimator = PhaseCorrelationEstimator::new(config.estimator.clone());
    let estimate = estimator.estimate(
        reference.view(),
        target.view(),
        &config.registration.bounds(),
        config.registration.iterations,
    )?;
    print_estimate(&estimate);

    if let Some(output_path) = output {
        let json = serde_json::to_string_pretty(&estimate)?;
        std::fs::write(&output_path, json)?;
        println!("Estimate saved to {}", output_path.display());
    }

    Ok(())
}

fn handle_init_config(config: &Config, output: PathBuf) -> anyhow::Result<()> {
    let format = ConfigFormat::from_path(&output);
    config.save_to_file(&output, format)?;
    println!("Configuration written to {}", output.display());
    Ok(())
}
