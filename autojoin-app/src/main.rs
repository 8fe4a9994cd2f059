use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use autojoin_config::{AppConfig, ConfigError};
use autojoin_core::drawing::Drawing;
use autojoin_engine::{JoinOptions, JoinReport, plan_drawing};
use autojoin_io::{DocumentLoader, DocumentSaver, DxfFacade, warn_on_version};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod output_path;

use output_path::default_output_path;

/// 把 DXF 中首尾相接的线段合并为多段线，并按零件分层。
#[derive(Debug, Parser)]
#[command(name = "dxf-autojoin", version, about)]
struct Args {
    /// 输入 DXF 文件
    input: PathBuf,
    /// 输出 DXF 文件，缺省为 `<输入主干>-auto-bound.<扩展名>`
    output: Option<PathBuf>,
    /// 端点重合容差，覆盖配置文件中的值
    #[arg(long)]
    tolerance: Option<f64>,
    /// 配置文件路径
    #[arg(long)]
    config: Option<PathBuf>,
    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let (config, config_error) = load_configuration(args.config.as_deref());
    init_logging(&config, args.verbose);
    if let Some(err) = config_error {
        match &err {
            ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                warn!(path = %path.display(), error = %err, "加载配置失败，使用内建默认值");
            }
            ConfigError::Invalid(_) | ConfigError::Context { .. } => {
                warn!(error = %err, "加载配置失败，使用内建默认值");
            }
        }
    }

    match run(&args, &config) {
        Ok((output, report)) => {
            println!("Done.");
            println!("Wrote: {}", output.display());
            print_summary(&report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "处理失败，未写出任何文件");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, config: &AppConfig) -> anyhow::Result<(PathBuf, JoinReport)> {
    let tolerance = args.tolerance.unwrap_or(config.join.tolerance);
    let options = JoinOptions::new(tolerance)?
        .with_arc_sample_step_degrees(config.join.arc_sample_step_degrees)?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input, &config.join.output_suffix));
    if output == args.input {
        bail!("输出路径与输入相同：{}", output.display());
    }

    info!(
        input = %args.input.display(),
        output = %output.display(),
        tolerance,
        "开始自动连接"
    );

    let facade = DxfFacade::new();
    let source = facade
        .load(&args.input)
        .with_context(|| format!("读取 {} 失败", args.input.display()))?;
    if warn_on_version(source.header()) {
        eprintln!(
            "Warning: input is not a 2018 (AC1032) DXF. \
             Please use the 2018 format if you want units to work properly after import."
        );
    }

    let plan = plan_drawing(&source, &options).context("自动连接失败")?;
    let mut drawing = source.carry_over();
    plan.emit(&mut drawing).unwrap_or_else(|never| match never {});
    save(&facade, &drawing, &output)?;

    Ok((output, plan.report().clone()))
}

fn save(facade: &DxfFacade, drawing: &Drawing, output: &Path) -> anyhow::Result<()> {
    facade
        .save(drawing, output)
        .with_context(|| format!("写出 {} 失败", output.display()))
}

fn print_summary(report: &JoinReport) {
    println!(
        "Parts: {} (closed {}, open {}, with arcs {}, branching {}, degenerate {})",
        report.cluster_count(),
        report.closed_simple,
        report.open_simple,
        report.mixed_with_arcs,
        report.branching,
        report.degenerate
    );
    println!("Merged polylines: {}", report.merged_polylines);
    println!("Contained: {}", report.contained);
    println!("Individual circles: {}", report.individual_circles);
    if !report.diagnostics.is_empty() {
        println!("Warnings: {}", report.diagnostics.len());
    }
}

/// 加载失败时退回默认配置，错误留待日志初始化后输出。
fn load_configuration(override_path: Option<&Path>) -> (AppConfig, Option<ConfigError>) {
    match AppConfig::discover_with(override_path) {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err)),
    }
}

fn init_logging(config: &AppConfig, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
