mod app;
mod cli;
mod completions;
mod config;
mod doctor;
mod git;
mod gitignore;
mod lifecycle;
mod metadata;
mod os;
mod outcome;
mod ports;
mod snapshot;
mod ui;

use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();

    let cli = match <cli::Cli as clap::Parser>::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    if let Err(err) = run(cli) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("WORKTREE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn print_json(value: &impl serde::Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("json serialization should work")
    );
}

fn run(cli: cli::Cli) -> Result<(), app::AppError> {
    use cli::Commands;

    match cli.command {
        Commands::Completions(args) => {
            completions::run_completions_command(args.shell);
        }
        Commands::Doctor(args) => {
            let repo_root = app::resolve_repo_root(&cli.repo_root)?;
            let report = doctor::run_doctor(&repo_root)?;
            if args.json {
                print_json(&report);
            } else {
                for check in &report.checks {
                    println!(
                        "{} [{}] {}",
                        check.name,
                        serde_json::to_string(&check.status)
                            .expect("status serialization should work")
                            .trim_matches('"'),
                        check.detail
                    );
                }
            }
            if report.failure_count() > 0 {
                return Err(app::AppError::InvalidArgument(format!(
                    "doctor found {} failing check(s)",
                    report.failure_count()
                )));
            }
        }
        Commands::Create(args) => {
            let manager = app::open_manager(&cli.repo_root, cli.config.overrides())?;
            let options = lifecycle::CreateOptions {
                start_server: args.start_server,
                branch_prefix: args.branch_prefix,
                port: args.port,
            };
            let outcome = manager.create(args.issue, &args.slug, &options)?;
            ui::print_warnings(&outcome.warnings);
            if args.json {
                print_json(&outcome);
            } else {
                ui::print_created(&outcome.value);
            }
        }
        Commands::Delete(args) => {
            let manager = app::open_manager(&cli.repo_root, cli.config.overrides())?;
            let outcome = manager.delete(args.issue, args.force)?;
            ui::print_warnings(&outcome.warnings);
            if args.json {
                print_json(&outcome);
            } else {
                ui::print_deleted(&outcome.value);
            }
        }
        Commands::List(args) => {
            let manager = app::open_manager(&cli.repo_root, cli.config.overrides())?;
            let records = manager.list()?;
            if args.json {
                print_json(&records);
            } else {
                ui::print_worktree_list(&records, manager.config().main_port);
            }
        }
        Commands::Info(args) => {
            let manager = app::open_manager(&cli.repo_root, cli.config.overrides())?;
            let record = manager.info(args.issue)?;
            if args.json {
                print_json(&record);
            } else {
                ui::print_worktree_info(&record);
            }
        }
    }

    Ok(())
}
