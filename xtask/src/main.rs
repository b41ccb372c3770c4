use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const LAMBDA_CRATE: &str = "s3_relay_lambda";
const COPY_LAMBDA_BIN: &str = "copy_lambda";
/// Where the copy lambda expects its routing table, relative to the task root.
const BUNDLED_ROUTING_PATH: &str = "config/target.json";

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the S3 copy relay workspace: CI, lambda packaging, trigger setup"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run CI checks
    Ci {
        #[arg(value_enum, default_value_t = CiJob::All)]
        job: CiJob,
    },
    /// Build the copy lambda and zip it with its routing table
    LambdaPackage {
        /// Target triple of the Lambda runtime
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        /// Routing table bundled as `config/target.json`
        #[arg(long, default_value = BUNDLED_ROUTING_PATH)]
        routing_config: PathBuf,
        /// Output archive
        #[arg(long, default_value = "dist/copy_lambda.zip")]
        output: PathBuf,
    },
    /// Run `setup_s3_trigger` with the given arguments
    SetupTrigger {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// fmt --check and clippy with warnings denied
    Lint,
    /// Tests for both crates
    Test,
    All,
}

fn cargo<I, S>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    eprintln!("+ cargo {}", args.join(" "));
    let status = Command::new("cargo")
        .args(&args)
        .status()
        .map_err(|error| format!("failed to spawn cargo: {error}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("cargo exited with {status}"))
    }
}

fn lint() -> Result<(), String> {
    cargo(["fmt", "--all", "--", "--check"])?;
    cargo(["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])
}

fn test() -> Result<(), String> {
    cargo(["test", "-p", "s3_relay_core"])?;
    cargo(["test", "-p", LAMBDA_CRATE])
}

fn package_copy_lambda(target: &str, routing_config: &Path, output: &Path) -> Result<(), String> {
    // Fail before the slow release build.
    let routing = fs::read(routing_config).map_err(|error| {
        format!("cannot read routing config {}: {error}", routing_config.display())
    })?;

    cargo([
        "build",
        "--release",
        "-p",
        LAMBDA_CRATE,
        "--bin",
        COPY_LAMBDA_BIN,
        "--target",
        target,
    ])?;

    let binary_path = Path::new("target")
        .join(target)
        .join("release")
        .join(COPY_LAMBDA_BIN);
    let binary = fs::read(&binary_path)
        .map_err(|error| format!("cannot read {}: {error}", binary_path.display()))?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .map_err(|error| format!("cannot create {}: {error}", parent.display()))?;
    }
    write_archive(output, &binary, &routing)
        .map_err(|error| format!("cannot write {}: {error}", output.display()))?;

    eprintln!("packaged {}", output.display());
    Ok(())
}

fn write_archive(output: &Path, binary: &[u8], routing: &[u8]) -> zip::result::ZipResult<()> {
    let mut zip = ZipWriter::new(fs::File::create(output)?);
    let entry = |mode: u32| {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(mode)
    };

    zip.start_file("bootstrap", entry(0o755))?;
    zip.write_all(binary)?;
    zip.start_file(BUNDLED_ROUTING_PATH, entry(0o644))?;
    zip.write_all(routing)?;
    zip.finish()?;
    Ok(())
}

fn main() -> ExitCode {
    let result = match Cli::parse().command {
        Commands::Ci { job: CiJob::Lint } => lint(),
        Commands::Ci { job: CiJob::Test } => test(),
        Commands::Ci { job: CiJob::All } => lint().and_then(|()| test()),
        Commands::LambdaPackage {
            target,
            routing_config,
            output,
        } => package_copy_lambda(&target, &routing_config, &output),
        Commands::SetupTrigger { args } => cargo(
            ["run", "-p", LAMBDA_CRATE, "--bin", "setup_s3_trigger", "--"]
                .map(String::from)
                .into_iter()
                .chain(args),
        ),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("xtask: {message}");
            ExitCode::FAILURE
        }
    }
}
