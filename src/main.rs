use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use convoy::{
    init_telemetry, load_config, AuditTrail, Catalog, Cli, Console, Interrupt, Result,
    ServiceContext, Session, SharedLogger,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    init_telemetry(&cfg, cli.verbose);
    tracing::debug!(version = VERSION, data_dir = %cfg.data_dir.display(), "convoy starting");

    // One Ctrl-C handler for the whole process; trackers share the token.
    let interrupt = Interrupt::process()?;
    let audit = Arc::new(AuditTrail::new(cfg.data_dir.join("audit.log"))?);
    let logger: SharedLogger = audit.clone();

    let mut ctx = ServiceContext::new(&cfg.data_dir, interrupt);
    ctx.launch_grace = cfg.launch_grace();
    ctx.stop_timeout = cfg.stop_timeout();
    ctx.logger = Some(logger);
    ctx.console = Console::stdout();

    let catalog = Catalog::build(&cfg, &ctx)?;
    let session = Session::new(&catalog, &audit, &ctx.console);
    cli.command.run(&session)
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
