mod activation;
mod app;
mod audit;
mod cli;
mod completions;
mod config;
mod detect;
mod doctor;
mod domain;
mod git;
mod interactive;
mod logging;
#[cfg(test)]
mod main_tests;
mod project_id;
mod registry;
mod resolver;
mod safeguard;
#[cfg(test)]
mod test_support;
mod ui;
mod validator;

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use app::{App, AppError, NewProject};
use audit::AuditEventKind;
use cli::{CheckArgs, Commands, ContextArgs, ResolveArgs};
use detect::DetectionContext;
use interactive::SelectionOutcome;
use registry::ProjectPatch;
use resolver::{ResolutionResult, ResolutionStatus};
use validator::{BlockKind, OperationDescriptor, OperationKind, ValidationOutcome};

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    println!("{rendered}");
    Ok(())
}

fn run() -> Result<(), AppError> {
    use clap::Parser;

    let cli = cli::Cli::parse();
    logging::init(cli.verbose);

    let user_home = std::env::var_os("HOME").map(PathBuf::from);
    let home = resolve_home(cli.home.clone(), user_home.clone());
    if let Commands::Completions(args) = &cli.command {
        return completions::run_completions_command(
            args.shell.as_deref(),
            args.install,
            home.as_deref().ok(),
            user_home.as_deref(),
        );
    }

    let home = home?;
    std::fs::create_dir_all(&home)?;
    let app = App::open(home)?;
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Add(args) => {
            let record = app.add_project(NewProject {
                id: args.id,
                name: args.name,
                root: absolutize(&cwd, &args.root),
                aliases: args.aliases,
                description: args.description,
                tags: args.tags,
                git_remote: args.remote,
                detect_remote: !args.no_detect_remote,
                markers: args.markers,
            })?;
            if args.json {
                print_json(&record)?;
            } else {
                println!("added {} {}", record.id, record.root.display());
            }
        }
        Commands::Update(args) => {
            let patch = ProjectPatch {
                name: args.name,
                root: args.root.map(|root| absolutize(&cwd, &root)),
                add_aliases: args.add_aliases,
                remove_aliases: args.remove_aliases,
                description: args.description,
                add_tags: args.add_tags,
                remove_tags: args.remove_tags,
                git_remote: if args.clear_remote {
                    Some(None)
                } else {
                    args.remote.map(Some)
                },
                markers: (!args.markers.is_empty()).then_some(args.markers),
            };
            if !patch.has_changes() {
                return Err(AppError::InvalidArgument(
                    "update requires at least one change".to_string(),
                ));
            }
            let record = app.update_project(&args.project, patch)?;
            if args.json {
                print_json(&record)?;
            } else {
                println!("updated {} {}", record.id, record.name);
            }
        }
        Commands::Rm(args) => {
            let removed = app.remove_project(&args.project)?;
            println!("removed {}", removed.id);
        }
        Commands::Ls(args) => {
            let projects = app.list_projects()?;
            if args.json {
                print_json(&projects)?;
            } else {
                let active = app.active_project()?.map(|record| record.id);
                ui::print_project_list(
                    &projects,
                    active.as_deref(),
                    ui::ProjectListOptions {
                        include_paths: args.paths,
                        include_descriptions: args.long,
                    },
                );
            }
        }
        Commands::Show(args) => {
            let record = app.require_project(&args.project)?;
            if args.json {
                print_json(&record)?;
            } else {
                let active = app.active_project()?.map(|active| active.id);
                ui::print_project_show(&record, active.as_deref() == Some(record.id.as_str()));
            }
        }
        Commands::Active(args) => {
            if args.clear {
                app.clear_active_project()?;
                println!("active project cleared");
            } else {
                let active = app.active_project()?;
                if args.json {
                    print_json(&active)?;
                } else {
                    ui::print_active(active.as_ref());
                }
            }
        }
        Commands::Switch(args) => {
            let record = app.switch_project(&args.project)?;
            println!("switched to {} {}", record.id, record.root.display());
        }
        Commands::Resolve(args) => run_resolve(&app, &cwd, args)?,
        Commands::Check(args) => run_check(&app, &cwd, args)?,
        Commands::Audit(args) => {
            let kind = match args.kind.as_deref() {
                Some(raw) => Some(AuditEventKind::parse(raw).ok_or_else(|| {
                    AppError::InvalidArgument(format!("unknown audit event type '{raw}'"))
                })?),
                None => None,
            };
            let events = app.recent_audit(args.limit, kind)?;
            if args.json {
                print_json(&events)?;
            } else {
                ui::print_audit(&events);
            }
        }
        Commands::Doctor(args) => {
            let report = app.doctor();
            if args.json {
                print_json(&report)?;
            } else {
                ui::print_doctor(&report);
            }
            if report.failure_count() > 0 {
                return Err(AppError::InvalidArgument(format!(
                    "doctor found {} failing check(s)",
                    report.failure_count()
                )));
            }
        }
        Commands::Discover(args) => {
            let found = app.discover(&absolutize(&cwd, &args.base), args.depth, args.apply)?;
            if args.json {
                print_json(&found)?;
            } else {
                ui::print_discovered(&found, args.apply);
            }
        }
        Commands::ShouldCheck(args) => {
            let score = app.should_check(&args.text.join(" "));
            if args.json {
                print_json(&score)?;
            } else {
                println!(
                    "{} {:.2}",
                    if score.should_check { "check" } else { "skip" },
                    score.score
                );
            }
        }
        Commands::Completions(_) => {
            unreachable!("completions are handled before the app opens")
        }
    }
    Ok(())
}

fn run_resolve(app: &App, cwd: &Path, args: ResolveArgs) -> Result<(), AppError> {
    let context = detection_context(app, cwd, &args.context)?;
    let mut result = app.resolve(&context)?;

    if args.interactive && needs_selection(&result) {
        let learn = args.learn.then(|| learn_text(&context, &result)).flatten();
        let mut input = io::stdin().lock();
        let mut output = io::stderr();
        match app.select_interactively(&mut input, &mut output, &result, learn.as_deref())? {
            SelectionOutcome::Resolved {
                result: chosen,
                learned_alias,
            } => {
                if let Some(alias) = learned_alias {
                    eprintln!("learned alias '{alias}'");
                }
                result = chosen;
            }
            SelectionOutcome::CreateNew => {
                eprintln!("register it with `pcx add <name> --root <dir>`");
            }
            SelectionOutcome::Cancelled(unchanged) => result = unchanged,
        }
    }

    if args.json {
        print_json(&result)?;
    } else {
        ui::print_resolution(&result);
    }
    if args.require {
        app.require_resolved(&result)?;
    }
    Ok(())
}

fn run_check(app: &App, cwd: &Path, args: CheckArgs) -> Result<(), AppError> {
    let kind = OperationKind::parse(&args.kind).ok_or_else(|| {
        AppError::InvalidArgument(format!(
            "unknown operation kind '{}' (read, write, generate, destructive)",
            args.kind
        ))
    })?;
    let mut operation = OperationDescriptor::new(kind).with_confirmations(args.confirm);
    if let Some(project) = args.project {
        operation = operation.claiming(project);
    }

    let context = detection_context(app, cwd, &args.context)?;
    let (mut result, mut outcome) = app.check(&context, &operation)?;
    let interactive = args.interactive && io::stdin().is_terminal();

    if interactive && needs_selection(&result) {
        let mut input = io::stdin().lock();
        if let SelectionOutcome::Resolved { result: chosen, .. } =
            app.select_interactively(&mut input, &mut io::stderr(), &result, None)?
        {
            result = chosen;
            outcome = app.validate(&result, &operation)?;
        }
    }
    if interactive {
        if let Some(block) = outcome.block.clone() {
            if matches!(block.kind, BlockKind::Mismatch(_)) {
                let mut input = io::stdin().lock();
                let given =
                    app.confirm_override_interactively(&mut input, &mut io::stderr(), &block)?;
                if given > 0 {
                    operation = operation.with_confirmations(given);
                    outcome = app.validate(&result, &operation)?;
                }
            }
        }
    }

    if args.json {
        print_json(&serde_json::json!({
            "resolution": result,
            "validation": outcome,
        }))?;
    } else {
        ui::print_resolution(&result);
        ui::print_validation(&outcome);
    }
    match block_error(&outcome) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn detection_context(
    app: &App,
    cwd: &Path,
    args: &ContextArgs,
) -> Result<DetectionContext, AppError> {
    let document = match args.document.as_deref() {
        Some(path) => Some(std::fs::read_to_string(absolutize(cwd, path))?),
        None => None,
    };
    let dir = args
        .cwd
        .as_deref()
        .map(|dir| absolutize(cwd, dir))
        .unwrap_or_else(|| cwd.to_path_buf());
    Ok(app.build_context(
        Some(dir),
        args.mention.clone(),
        document,
        args.expected.clone(),
    ))
}

fn needs_selection(result: &ResolutionResult) -> bool {
    result.status == ResolutionStatus::Ambiguous && !result.contenders.is_empty()
}

/// Text worth remembering as an alias once the user picked a project.
fn learn_text(context: &DetectionContext, result: &ResolutionResult) -> Option<String> {
    context
        .mention
        .clone()
        .or_else(|| result.expected.as_ref().map(|expected| expected.label.clone()))
        .filter(|text| !text.trim().is_empty())
}

fn block_error(outcome: &ValidationOutcome) -> Option<AppError> {
    let block = outcome.block.as_ref()?;
    Some(match &block.kind {
        BlockKind::Mismatch(mismatch) => AppError::Mismatch(mismatch.clone()),
        BlockKind::Ambiguous(ambiguous) => AppError::Ambiguous(ambiguous.clone()),
        BlockKind::UnknownProject => AppError::NoProject,
    })
}

fn resolve_home(explicit: Option<PathBuf>, user_home: Option<PathBuf>) -> Result<PathBuf, AppError> {
    if let Some(home) = explicit {
        return Ok(home);
    }
    user_home
        .map(|home| home.join(".projctx"))
        .ok_or_else(|| {
            AppError::InvalidArgument("HOME is not set; pass --home or PROJCTX_HOME".to_string())
        })
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
