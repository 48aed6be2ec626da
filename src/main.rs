use anyhow::Result;
use log::{debug, error, info};
use qjs_harness::catalog;
use qjs_harness::config::cli_args::CliArgs;
use qjs_harness::config::harness_config::HarnessConfig;
use qjs_harness::executable::{ensure_executables, NativeDirResolver};
use qjs_harness::fixture::FixtureSync;
use qjs_harness::log_broadcaster::{ConsolePrinter, LogBroadcaster, LogObserver};
use qjs_harness::markdown_report::generate_markdown_report;
use qjs_harness::orchestrator::{RunState, TestOrchestrator};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    let args = CliArgs::parse_args();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.get_log_level()),
    )
    .init();

    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> Result<ExitCode> {
    if args.list {
        for (phase, cases) in catalog::catalog() {
            println!("[{phase}]");
            for case in cases {
                println!("  {}", case.display_name());
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let settings = HarnessConfig::load(args)?.resolve(args)?;
    debug!("Settings: {settings:?}");

    let log = Arc::new(LogBroadcaster::new());
    let console: Arc<dyn LogObserver> = Arc::new(ConsolePrinter);
    log.register_observer(&console);

    let resolver = Arc::new(NativeDirResolver::new(settings.native_dir.clone()));
    let fixtures = FixtureSync::new(
        settings.assets_dir.clone(),
        settings.data_dir.clone(),
        settings.cache_dir.clone(),
    );

    let prepare_resolver = resolver.clone();
    let executables = settings.executables.clone();
    let prepare_fixtures = fixtures.clone();
    let orchestrator = TestOrchestrator::new(log.clone(), resolver, fixtures.fixture_dir())
        .with_prepare(Box::new(move |log: &LogBroadcaster| -> Result<()> {
            prepare_fixtures.ensure(log)?;
            ensure_executables(prepare_resolver.as_ref(), &executables)
        }));

    let handle = orchestrator.start()?;
    let outcome = handle.join()?;
    info!(
        "{} tests executed, {} failed",
        outcome.summary.executed_count(),
        outcome.summary.failed().len()
    );

    if let Some(report) = &settings.report {
        generate_markdown_report(report, &outcome)?;
    }

    Ok(match outcome.state {
        RunState::Done => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}
