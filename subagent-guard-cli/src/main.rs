use clap::Parser;
use subagent_guard_cli::{
    run_dispatch, run_validate, validate_dispatch_args, Cli, CommandOutput, Commands,
    EXIT_REJECTED, EXIT_RUNTIME_ERROR,
};
use tracing::info;

fn init_logging(debug: bool) {
    // Logs go to stderr so stdout stays parseable with --json
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn finish(result: anyhow::Result<CommandOutput>) -> ! {
    match result {
        Ok(output) => {
            println!("{}", output.text);
            std::process::exit(output.exit_code);
        }
        Err(e) => {
            eprintln!("Runtime Error: {}", e);
            std::process::exit(EXIT_RUNTIME_ERROR);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate(args) => {
            init_logging(args.debug);
            if args.debug {
                info!("Starting subagent-guard validate");
                info!("Operation: {}", args.operation);
                info!("Parameters: {}", args.params.len());
            }

            finish(run_validate(&args));
        }
        Commands::Dispatch(args) => {
            init_logging(args.debug);

            // Argument errors exit before any dispatcher exists
            if let Err(e) = validate_dispatch_args(&args) {
                eprintln!("Error: {}", e);
                std::process::exit(EXIT_REJECTED);
            }

            if args.debug {
                info!("Starting subagent-guard dispatch");
                info!("Subagent type: {:?}", args.subagent_type);
                info!("Task timeout: {}s", args.task_timeout);
            }

            finish(run_dispatch(&args).await);
        }
    }
}
